use crate::cli::{
    actions::Action,
    commands::{self, logging},
    dispatch, telemetry,
};
use anyhow::Result;

/// Parse arguments, initialize telemetry and build the action to run.
///
/// Telemetry comes up before dispatch so configuration warnings are logged.
///
/// # Errors
///
/// Returns an error if telemetry initialization or action dispatch fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();
    telemetry::init(logging::level(&matches))?;
    dispatch::handler(&matches)
}
