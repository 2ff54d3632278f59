use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names accepted from `BULLETIN_LOG_LEVEL`, with the `-v` count each one stands for.
const LEVEL_NAMES: [(&str, u8); 5] = [
    ("error", 0),
    ("warn", 1),
    ("info", 2),
    ("debug", 3),
    ("trace", 4),
];

const MAX_VERBOSITY: u8 = 5;

fn parse_verbosity(raw: &str) -> Result<u8, String> {
    let raw = raw.trim();
    if let Ok(count) = raw.parse::<u8>() {
        return if count <= MAX_VERBOSITY {
            Ok(count)
        } else {
            Err(format!("verbosity must be at most {MAX_VERBOSITY}"))
        };
    }

    LEVEL_NAMES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw))
        .map(|(_, count)| *count)
        .ok_or_else(|| {
            format!("unknown log level '{raw}', expected one of: error, warn, info, debug, trace")
        })
}

#[must_use]
pub fn verbosity_parser() -> ValueParser {
    ValueParser::from(parse_verbosity)
}

/// Tracing level selected on the command line. `None` leaves the default filter in place.
#[must_use]
pub fn level(matches: &ArgMatches) -> Option<Level> {
    match matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0) {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Raise log verbosity, repeatable: -v WARN, -vv INFO, -vvv DEBUG, -vvvv TRACE")
            .long_help(
                "Raise log verbosity. Without it only errors are logged. BULLETIN_LOG_LEVEL takes a level name (error, warn, info, debug, trace) or a count from 0 to 5.",
            )
            .env("BULLETIN_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(verbosity_parser()),
    )
}
