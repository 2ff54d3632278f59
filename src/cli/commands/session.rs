use anyhow::{anyhow, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

use crate::session::MAX_AGE_LIMIT_SECONDS;

pub const ARG_SESSION_SECRET: &str = "session-secret";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_SESSION_ROLLING: &str = "session-rolling";
pub const ARG_SESSION_MAX_AGE_SECONDS: &str = "session-max-age-seconds";
pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";
pub const ARG_SESSION_PRUNE_SECONDS: &str = "session-prune-seconds";

#[derive(Debug)]
pub struct Options {
    pub secret: Option<SecretString>,
    pub cookie_secure: bool,
    pub rolling: bool,
    pub max_age_seconds: i64,
    pub store_timeout: Duration,
    pub prune_interval: Duration,
}

impl Options {
    /// Parse session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is missing from the matches.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_u64 = |id: &str| -> Result<u64> {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        let max_age_seconds = matches
            .get_one::<i64>(ARG_SESSION_MAX_AGE_SECONDS)
            .copied()
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_SESSION_MAX_AGE_SECONDS}"))?;

        Ok(Self {
            secret: matches
                .get_one::<String>(ARG_SESSION_SECRET)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.clone())),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            rolling: matches.get_flag(ARG_SESSION_ROLLING),
            max_age_seconds,
            store_timeout: Duration::from_millis(read_u64(ARG_STORE_TIMEOUT_MS)?),
            prune_interval: Duration::from_secs(read_u64(ARG_SESSION_PRUNE_SECONDS)?),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long("session-secret")
                .help("Secret used to sign session cookies (random per process when unset)")
                .env("BULLETIN_SESSION_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long("cookie-secure")
                .help("Mark the session cookie Secure (production only)")
                .env("BULLETIN_COOKIE_SECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_SESSION_ROLLING)
                .long("session-rolling")
                .help("Refresh the session expiry on every request")
                .env("BULLETIN_SESSION_ROLLING")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_SESSION_MAX_AGE_SECONDS)
                .long("session-max-age-seconds")
                .help("Session cookie and record lifetime in seconds")
                .env("BULLETIN_SESSION_MAX_AGE_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_AGE_LIMIT_SECONDS)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long("store-timeout-ms")
                .help("Session store operation timeout in milliseconds")
                .env("BULLETIN_STORE_TIMEOUT_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_PRUNE_SECONDS)
                .long("session-prune-seconds")
                .help("Interval between expired session sweeps in seconds")
                .env("BULLETIN_SESSION_PRUNE_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const VARS: [&str; 6] = [
        "BULLETIN_SESSION_SECRET",
        "BULLETIN_COOKIE_SECURE",
        "BULLETIN_SESSION_ROLLING",
        "BULLETIN_SESSION_MAX_AGE_SECONDS",
        "BULLETIN_STORE_TIMEOUT_MS",
        "BULLETIN_SESSION_PRUNE_SECONDS",
    ];

    fn parse(args: &[&str]) -> Result<Options> {
        let matches = with_args(Command::new("bulletin")).try_get_matches_from(args)?;
        Options::parse(&matches)
    }

    fn rejected(args: &[&str]) -> bool {
        with_args(Command::new("bulletin"))
            .try_get_matches_from(args)
            .is_err_and(|err| err.kind() == clap::error::ErrorKind::ValueValidation)
    }

    #[test]
    fn defaults() {
        temp_env::with_vars_unset(VARS, || {
            let options = parse(&["bulletin"]).unwrap();
            assert!(options.secret.is_none());
            assert!(!options.cookie_secure);
            assert!(!options.rolling);
            assert_eq!(options.max_age_seconds, 604_800);
            assert_eq!(options.store_timeout, Duration::from_millis(5000));
            assert_eq!(options.prune_interval, Duration::from_secs(900));
        });
    }

    #[test]
    fn reads_env() {
        temp_env::with_vars(
            [
                ("BULLETIN_SESSION_SECRET", Some("keyboard cat")),
                ("BULLETIN_COOKIE_SECURE", Some("1")),
                ("BULLETIN_SESSION_ROLLING", Some("yes")),
                ("BULLETIN_SESSION_MAX_AGE_SECONDS", Some("3600")),
                ("BULLETIN_STORE_TIMEOUT_MS", Some("250")),
                ("BULLETIN_SESSION_PRUNE_SECONDS", Some("60")),
            ],
            || {
                let options = parse(&["bulletin"]).unwrap();
                assert_eq!(
                    options.secret.as_ref().map(ExposeSecret::expose_secret),
                    Some("keyboard cat")
                );
                assert!(options.cookie_secure);
                assert!(options.rolling);
                assert_eq!(options.max_age_seconds, 3600);
                assert_eq!(options.store_timeout, Duration::from_millis(250));
                assert_eq!(options.prune_interval, Duration::from_secs(60));
            },
        );
    }

    #[test]
    fn blank_secret_is_treated_as_unset() {
        temp_env::with_vars_unset(VARS, || {
            let options = parse(&["bulletin", "--session-secret", "  "]).unwrap();
            assert!(options.secret.is_none());
        });
    }

    #[test]
    fn zero_durations_are_rejected() {
        temp_env::with_vars_unset(VARS, || {
            assert!(rejected(&["bulletin", "--store-timeout-ms", "0"]));
            assert!(rejected(&["bulletin", "--session-prune-seconds", "0"]));
            assert!(rejected(&["bulletin", "--session-max-age-seconds", "0"]));
        });
    }

    #[test]
    fn max_age_outside_range_is_rejected() {
        temp_env::with_vars_unset(VARS, || {
            assert!(rejected(&["bulletin", "--session-max-age-seconds=-60"]));
            assert!(rejected(&[
                "bulletin",
                "--session-max-age-seconds",
                "9223372036854775807"
            ]));
            let options = parse(&["bulletin", "--session-max-age-seconds", "315360000"]).unwrap();
            assert_eq!(options.max_age_seconds, MAX_AGE_LIMIT_SECONDS);
        });
    }

    #[test]
    fn zero_from_env_is_rejected() {
        temp_env::with_vars(
            [
                ("BULLETIN_SESSION_PRUNE_SECONDS", Some("0")),
                ("BULLETIN_SESSION_SECRET", None),
            ],
            || assert!(rejected(&["bulletin"])),
        );
    }
}
