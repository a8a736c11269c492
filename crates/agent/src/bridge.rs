//! `ToolBridge`: connect, process queries, clean up.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tb_domain::config::Config;
use tb_mcp_client::{ConnectReport, McpManager, McpSession, ToolCatalog};
use tb_providers::{LlmProvider, OpenAiCompatProvider};

use crate::error::AgentError;
use crate::orchestrator::{LoopSettings, Orchestrator, QueryOutcome};

/// Connected MCP sessions, their merged catalog and the model provider.
///
/// Call [`cleanup`](Self::cleanup) on every exit path; it releases each
/// session once, in reverse connection order.
pub struct ToolBridge {
    manager: McpManager,
    catalog: ToolCatalog,
    provider: Arc<dyn LlmProvider>,
    settings: LoopSettings,
    report: ConnectReport,
}

impl ToolBridge {
    /// Connect with the OpenAI-compatible provider described by `[llm]`.
    pub async fn from_config(config: &Config) -> Result<Self, AgentError> {
        let provider = OpenAiCompatProvider::from_config(&config.llm)?;
        Self::connect(config, Arc::new(provider)).await
    }

    /// Connect every configured server and build the catalog.
    ///
    /// Fails with [`AgentError::NoSessions`] only when servers were
    /// configured and none connected. Partial failures are available from
    /// [`report`](Self::report).
    pub async fn connect(config: &Config, provider: Arc<dyn LlmProvider>) -> Result<Self, AgentError> {
        let (manager, report) = McpManager::connect_all(&config.mcp).await;
        if report.all_failed() {
            let mut manager = manager;
            manager.shutdown().await;
            return Err(AgentError::NoSessions {
                configured: report.configured(),
            });
        }
        let mut bridge = Self::assemble(manager, provider, LoopSettings::from(&config.agent)).await?;
        bridge.report = report;
        Ok(bridge)
    }

    /// Build a bridge over sessions established elsewhere.
    pub async fn from_sessions(
        sessions: Vec<McpSession>,
        config: &Config,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self, AgentError> {
        let mut manager = McpManager::new(&config.mcp);
        let mut report = ConnectReport::default();
        for session in sessions {
            report.connected.push(session.name().to_string());
            manager.adopt(session);
        }
        let mut bridge = Self::assemble(manager, provider, LoopSettings::from(&config.agent)).await?;
        bridge.report = report;
        Ok(bridge)
    }

    async fn assemble(
        mut manager: McpManager,
        provider: Arc<dyn LlmProvider>,
        settings: LoopSettings,
    ) -> Result<Self, AgentError> {
        let catalog = match manager.catalog() {
            Ok(catalog) => catalog,
            Err(e) => {
                manager.shutdown().await;
                return Err(e.into());
            }
        };
        tracing::info!(
            sessions = manager.sessions().len(),
            tools = catalog.len(),
            "tool bridge ready"
        );
        Ok(Self {
            manager,
            catalog,
            provider,
            settings,
            report: ConnectReport::default(),
        })
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn report(&self) -> &ConnectReport {
        &self.report
    }

    pub fn sessions(&self) -> &[Arc<McpSession>] {
        self.manager.sessions()
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut LoopSettings {
        &mut self.settings
    }

    pub async fn process_query(&self, query: &str) -> Result<QueryOutcome, AgentError> {
        self.process_query_with_cancel(query, &CancellationToken::new()).await
    }

    /// Like [`process_query`](Self::process_query), aborting with
    /// [`AgentError::Cancelled`] once `cancel` fires.
    pub async fn process_query_with_cancel(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome, AgentError> {
        Orchestrator::new(self.provider.as_ref(), &self.catalog, &self.settings)
            .run(query, cancel)
            .await
    }

    /// Release every session, newest first. Safe to call more than once.
    pub async fn cleanup(&mut self) -> usize {
        self.manager.shutdown().await
    }
}
