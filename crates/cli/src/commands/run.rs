//! `toolwright run`: answer a single request.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use toolwright_agent::{Agent, RunFailure, RunOutcome};
use toolwright_config::{AppConfig, ConfigError};

pub async fn run(
    message: &str,
    no_reflect: bool,
    config_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &config_path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;

    if matches!(config.require_api_key(), Err(ConfigError::MissingCredential)) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set TOOLWRIGHT_API_KEY (or OPENAI_API_KEY), or add api_key to:");
        eprintln!(
            "    {}",
            config_path.unwrap_or_else(AppConfig::config_path).display()
        );
        eprintln!();
        return Err(ConfigError::MissingCredential.into());
    }
    if no_reflect {
        config.reflection.enabled = false;
    }

    let gateway = toolwright_providers::build_from_config(&config)?;
    let tools = Arc::new(toolwright_tools::default_registry()?);
    let agent = Agent::from_config(Arc::new(gateway), tools, &config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    match agent.run_with_cancel(message, cancel).await {
        Ok(outcome) => {
            println!("{}", render_outcome(&outcome));
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", render_failure(&failure));
            std::process::exit(1);
        }
    }
}

fn render_outcome(outcome: &RunOutcome) -> String {
    if outcome.is_forced() {
        format!("{}\n\n[{}]", outcome.answer, outcome.acceptance)
    } else {
        outcome.answer.clone()
    }
}

fn render_failure(failure: &RunFailure) -> String {
    let report = serde_json::json!({
        "run_id": failure.run_id,
        "stage": failure.stage,
        "kind": failure.reason.kind(),
        "limit": failure.reason.is_limit(),
        "message": failure.reason.to_string(),
        "last_draft": failure.last_draft,
    });
    serde_json::to_string_pretty(&report).unwrap_or_else(|_| failure.to_string())
}
