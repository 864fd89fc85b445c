//! Query guard binary: validates candidate SQL read from stdin.

use anyhow::Result;
use gst_sql_guard::{AssistantConfig, SqlValidator, transport};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = AssistantConfig::from_env()?;
    info!(
        "Model rate limit: {} requests/minute, database target {}",
        config.rate_limit.max_requests_per_minute,
        config.database.target()
    );
    if config.model.is_none() {
        warn!("No model API key configured; running as a standalone query guard");
    }

    let validator = SqlValidator::new();
    let stats = transport::serve(
        &validator,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    info!(
        "Shutdown complete: {} accepted, {} rejected",
        stats.accepted, stats.rejected
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gst_sql_guard=info,warn"));

    // stdout carries verdicts, so logs go to stderr
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .init();
}
