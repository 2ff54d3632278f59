use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};

use crate::api::{config::RuntimeMode, origin::AllowSet};

pub const ARG_ENV: &str = "env";
pub const ARG_TRUST_PROXY: &str = "trust-proxy";
pub const ARG_CORS_ORIGINS: &str = "cors-origins";

#[derive(Debug)]
pub struct Options {
    pub mode: RuntimeMode,
    pub trust_proxy: bool,
    pub allow_set: AllowSet,
}

impl Options {
    /// Parse runtime mode, proxy trust and the origin allow-set.
    ///
    /// # Errors
    /// Returns an error if the mode is unknown or an origin is malformed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let mode = matches
            .get_one::<String>(ARG_ENV)
            .map_or(Ok(RuntimeMode::default()), |mode| mode.parse())
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let allow_set = match matches.get_one::<String>(ARG_CORS_ORIGINS) {
            Some(extra) => AllowSet::with_extra(extra)
                .with_context(|| format!("invalid --{ARG_CORS_ORIGINS}"))?,
            None => AllowSet::baseline(),
        };

        Ok(Self {
            mode,
            trust_proxy: matches.get_flag(ARG_TRUST_PROXY),
            allow_set,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENV)
                .long("env")
                .help("Runtime mode: development or production")
                .env("BULLETIN_ENV")
                .default_value("development"),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY)
                .long("trust-proxy")
                .help("Trust X-Forwarded-* headers from one reverse-proxy hop")
                .env("BULLETIN_TRUST_PROXY")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_CORS_ORIGINS)
                .long("cors-origins")
                .help("Comma-separated origins allowed in addition to the built-in ones")
                .env("BULLETIN_CORS_ORIGINS"),
        )
}
