//! Merged tool catalog and the name → session routing table.

use std::collections::HashMap;
use std::sync::Arc;

use tb_domain::config::DuplicateToolPolicy;
use tb_domain::tool::ToolDefinition;

use crate::error::McpError;
use crate::session::McpSession;

/// A tool name declared by more than one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCollision {
    pub tool: String,
    /// Server that declared the name first and lost it.
    pub shadowed: String,
    /// Server that now owns the name.
    pub owner: String,
}

/// Immutable map from tool name to the session that serves it.
#[derive(Debug, Clone, Default)]
pub struct ToolRouter {
    routes: HashMap<String, Arc<McpSession>>,
}

impl ToolRouter {
    pub fn route(&self, tool: &str) -> Option<&Arc<McpSession>> {
        self.routes.get(tool)
    }

    /// Name of the server owning `tool`.
    pub fn server_for(&self, tool: &str) -> Option<&str> {
        self.routes.get(tool).map(|s| s.name())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl PartialEq for ToolRouter {
    fn eq(&self, other: &Self) -> bool {
        self.routes.len() == other.routes.len()
            && self.routes.iter().all(|(name, session)| {
                other
                    .routes
                    .get(name)
                    .is_some_and(|o| Arc::ptr_eq(session, o))
            })
    }
}

/// Tools of every connected session, flattened for the model.
///
/// Each name appears once, at the position where it was first declared,
/// described by the session that owns it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
    owners: Vec<String>,
    router: ToolRouter,
    collisions: Vec<ToolCollision>,
}

impl ToolCatalog {
    /// Merge the tools of `sessions`, in the given (connection) order.
    pub fn build(
        sessions: &[Arc<McpSession>],
        policy: DuplicateToolPolicy,
    ) -> Result<Self, McpError> {
        let mut catalog = ToolCatalog::default();
        let mut position: HashMap<String, usize> = HashMap::new();

        for session in sessions {
            for tool in session.tools() {
                let definition = tool.to_definition();
                match position.get(&tool.name) {
                    Some(&idx) => {
                        let shadowed = catalog.owners[idx].clone();
                        if policy == DuplicateToolPolicy::Error {
                            return Err(McpError::DuplicateTool {
                                tool: tool.name.clone(),
                                first: shadowed,
                                second: session.name().to_string(),
                            });
                        }
                        tracing::warn!(
                            tool = %tool.name,
                            shadowed = %shadowed,
                            owner = %session.name(),
                            "tool declared by more than one server; last one wins"
                        );
                        catalog.definitions[idx] = definition;
                        catalog.owners[idx] = session.name().to_string();
                        catalog.collisions.push(ToolCollision {
                            tool: tool.name.clone(),
                            shadowed,
                            owner: session.name().to_string(),
                        });
                    }
                    None => {
                        position.insert(tool.name.clone(), catalog.definitions.len());
                        catalog.definitions.push(definition);
                        catalog.owners.push(session.name().to_string());
                    }
                }
                catalog
                    .router
                    .routes
                    .insert(tool.name.clone(), Arc::clone(session));
            }
        }

        tracing::debug!(
            tools = catalog.definitions.len(),
            collisions = catalog.collisions.len(),
            "tool catalog built"
        );
        Ok(catalog)
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// `(owning server, definition)` pairs in catalog order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ToolDefinition)> {
        self.owners
            .iter()
            .map(String::as_str)
            .zip(self.definitions.iter())
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    pub fn collisions(&self) -> &[ToolCollision] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    async fn session(name: &str, tools: &[&str]) -> Arc<McpSession> {
        let tools: Vec<_> = tools
            .iter()
            .map(|t| json!({"name": t, "description": format!("{t} from {name}")}))
            .collect();
        let transport = ScriptedTransport::new(name).with_tools(json!(tools));
        Arc::new(McpSession::establish(name, Box::new(transport)).await.unwrap())
    }

    #[tokio::test]
    async fn unique_tools_route_to_their_session() {
        let a = session("a", &["calculator", "weather"]).await;
        let b = session("b", &["time"]).await;
        let catalog = ToolCatalog::build(&[a.clone(), b.clone()], DuplicateToolPolicy::LastWins).unwrap();

        let names: Vec<_> = catalog.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["calculator", "weather", "time"]);
        assert!(Arc::ptr_eq(catalog.router().route("weather").unwrap(), &a));
        assert!(Arc::ptr_eq(catalog.router().route("time").unwrap(), &b));
        assert!(catalog.router().route("missing").is_none());
        assert!(catalog.collisions().is_empty());
    }

    #[tokio::test]
    async fn later_session_wins_collision() {
        let first = session("clock-a", &["time", "date"]).await;
        let second = session("clock-b", &["time"]).await;
        let catalog =
            ToolCatalog::build(&[first, second.clone()], DuplicateToolPolicy::LastWins).unwrap();

        assert_eq!(catalog.router().server_for("time"), Some("clock-b"));
        assert_eq!(catalog.router().server_for("date"), Some("clock-a"));
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.definitions()[0].description, "time from clock-b");
        assert_eq!(
            catalog.collisions(),
            &[ToolCollision {
                tool: "time".into(),
                shadowed: "clock-a".into(),
                owner: "clock-b".into(),
            }]
        );
        let owners: Vec<_> = catalog.entries().map(|(owner, _)| owner).collect();
        assert_eq!(owners, vec!["clock-b", "clock-a"]);
    }

    #[tokio::test]
    async fn strict_policy_rejects_collision() {
        let first = session("clock-a", &["time"]).await;
        let second = session("clock-b", &["time"]).await;
        let err = ToolCatalog::build(&[first, second], DuplicateToolPolicy::Error).unwrap_err();
        assert!(matches!(
            err,
            McpError::DuplicateTool { ref tool, ref first, ref second }
                if tool == "time" && first == "clock-a" && second == "clock-b"
        ));
    }

    #[tokio::test]
    async fn building_twice_is_identical() {
        let sessions = vec![
            session("a", &["x", "y"]).await,
            session("b", &["y", "z"]).await,
        ];
        let once = ToolCatalog::build(&sessions, DuplicateToolPolicy::LastWins).unwrap();
        let twice = ToolCatalog::build(&sessions, DuplicateToolPolicy::LastWins).unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn definitions_project_to_function_schema() {
        let s = session("a", &["calculator"]).await;
        let catalog = ToolCatalog::build(&[s], DuplicateToolPolicy::LastWins).unwrap();
        let schema = catalog.definitions()[0].to_function_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "calculator");
        assert_eq!(schema["function"]["parameters"]["type"], "object");
    }
}
