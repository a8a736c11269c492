//! `toolbridge run <query>`: connect, answer one query, clean up.

use tokio_util::sync::CancellationToken;

use tb_domain::config::Config;

use crate::bridge::ToolBridge;
use crate::error::AgentError;

/// Per-invocation overrides from the command line.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    pub stream: bool,
    pub model: Option<String>,
    pub max_rounds: Option<usize>,
    pub json: bool,
}

pub async fn run(config: Config, query: String, opts: RunOptions) -> anyhow::Result<()> {
    let mut bridge = ToolBridge::from_config(&config).await?;
    report_partial_connect(&bridge);

    {
        let settings = bridge.settings_mut();
        settings.stream |= opts.stream;
        if opts.model.is_some() {
            settings.model = opts.model.clone();
        }
        if let Some(max) = opts.max_rounds {
            settings.max_rounds = max;
        }
    }

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let outcome = bridge.process_query_with_cancel(&query, &cancel).await;
    watcher.abort();

    let released = bridge.cleanup().await;
    tracing::debug!(released, "sessions released");

    match outcome {
        Ok(outcome) if opts.json => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Ok(outcome) => {
            println!("{}", outcome.answer);
            Ok(())
        }
        Err(AgentError::Cancelled) => {
            eprintln!("Cancelled.");
            Err(AgentError::Cancelled.into())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn report_partial_connect(bridge: &ToolBridge) {
    for failure in &bridge.report().failed {
        eprintln!("warning: server '{}' unavailable: {}", failure.server, failure.error);
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("ctrl-c received, cancelling query");
        cancel.cancel();
    }
}
