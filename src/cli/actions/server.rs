use crate::{api, api::config::GatewayConfig, cli::telemetry};
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub config: GatewayConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the session store cannot be opened or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(config = ?args.config, "Starting gateway");

    let result = api::new(args.port, args.dsn, args.config).await;

    telemetry::shutdown_tracer();

    result
}
