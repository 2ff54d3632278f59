//! Map parsed arguments to an action, assembling the immutable gateway
//! configuration on the way.

use crate::{
    api::config::GatewayConfig,
    cli::{
        actions::{server::Args, Action},
        commands::{gateway, session, ARG_DSN, ARG_PORT},
    },
    session::CookieSigner,
};
use anyhow::Result;
use tracing::warn;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if an argument is invalid or no session secret can be generated.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty());

    let gateway_opts = gateway::Options::parse(matches)?;
    let session_opts = session::Options::parse(matches)?;

    let secret = if let Some(secret) = session_opts.secret {
        secret
    } else {
        warn!("No session secret configured, using a random one; sessions will not survive a restart");
        CookieSigner::ephemeral_secret()?
    };

    let config = GatewayConfig::new(gateway_opts.mode, secret)
        .with_trust_proxy(gateway_opts.trust_proxy)
        .with_allow_set(gateway_opts.allow_set)
        .with_secure_cookie(session_opts.cookie_secure)
        .with_rolling(session_opts.rolling)
        .with_max_age_seconds(session_opts.max_age_seconds)
        .with_store_timeout(session_opts.store_timeout)
        .with_prune_interval(session_opts.prune_interval);

    Ok(Action::Server(Args { port, dsn, config }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::RuntimeMode;

    const VARS: [&str; 12] = [
        "BULLETIN_PORT",
        "BULLETIN_DSN",
        "BULLETIN_ENV",
        "BULLETIN_TRUST_PROXY",
        "BULLETIN_CORS_ORIGINS",
        "BULLETIN_SESSION_SECRET",
        "BULLETIN_COOKIE_SECURE",
        "BULLETIN_SESSION_ROLLING",
        "BULLETIN_SESSION_MAX_AGE_SECONDS",
        "BULLETIN_STORE_TIMEOUT_MS",
        "BULLETIN_SESSION_PRUNE_SECONDS",
        "BULLETIN_LOG_LEVEL",
    ];

    fn handle(args: &[&str]) -> Result<Action> {
        let matches = crate::cli::commands::new().get_matches_from(args);
        handler(&matches)
    }

    #[test]
    fn builds_server_action_with_defaults() {
        temp_env::with_vars_unset(VARS, || {
            let Ok(Action::Server(args)) = handle(&["bulletin"]) else {
                panic!("expected a server action");
            };
            assert_eq!(args.port, 8080);
            assert!(args.dsn.is_none());
            assert_eq!(args.config.mode(), RuntimeMode::Development);
            assert!(!args.config.cookie_policy().secure);
        });
    }

    #[test]
    fn production_with_secure_cookie_trusts_proxy() {
        temp_env::with_vars_unset(VARS, || {
            let Ok(Action::Server(args)) = handle(&[
                "bulletin",
                "--env",
                "production",
                "--cookie-secure",
                "--session-secret",
                "keyboard cat",
                "--dsn",
                "postgres://localhost/bulletin",
            ]) else {
                panic!("expected a server action");
            };
            assert_eq!(args.dsn.as_deref(), Some("postgres://localhost/bulletin"));
            assert!(args.config.is_production());
            assert!(args.config.cookie_policy().secure);
            assert!(args.config.trust_proxy());
        });
    }

    #[test]
    fn invalid_origin_fails() {
        temp_env::with_vars_unset(VARS, || {
            let result = handle(&["bulletin", "--cors-origins", "not an origin"]);
            assert!(result.is_err());
        });
    }
}
