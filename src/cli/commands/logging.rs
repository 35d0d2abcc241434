//! Log output and trace export arguments.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, builder::PossibleValuesParser};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_LEVEL: &str = "log-level";
pub const ARG_LOG_FORMAT: &str = "log-format";
pub const ARG_OTLP_ENDPOINT: &str = "otlp-endpoint";
pub const ARG_OTLP_HEADER: &str = "otlp-header";
pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_INSTANCE_ID: &str = "instance-id";

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` keeps the crate at ERROR.
    pub level: Option<Level>,
    pub format: LogFormat,
    pub otlp_endpoint: Option<String>,
    pub otlp_headers: Vec<(String, String)>,
    pub environment: String,
    pub instance_id: Option<String>,
}

impl Options {
    /// Parse logging and OTLP arguments. `-v` wins over `--log-level`.
    ///
    /// # Errors
    /// Returns an error if an OTLP header is not `key=value`.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let level = match matches.get_count(ARG_VERBOSITY) {
            0 => matches
                .get_one::<String>(ARG_LOG_LEVEL)
                .map(String::as_str)
                .and_then(level_from_name),
            count => Some(level_from_count(count)),
        };

        let format = match matches.get_one::<String>(ARG_LOG_FORMAT).map(String::as_str) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let otlp_headers = matches
            .get_many::<String>(ARG_OTLP_HEADER)
            .into_iter()
            .flatten()
            .filter(|pair| !pair.trim().is_empty())
            .map(|pair| {
                let (key, value) = pair
                    .split_once('=')
                    .with_context(|| format!("--{ARG_OTLP_HEADER} expects key=value, got {pair:?}"))?;
                Ok((key.trim().to_ascii_lowercase(), value.trim().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            level,
            format,
            otlp_endpoint: get_non_empty(ARG_OTLP_ENDPOINT),
            otlp_headers,
            environment: get_non_empty(ARG_ENVIRONMENT).unwrap_or_else(|| "development".to_string()),
            instance_id: get_non_empty(ARG_INSTANCE_ID),
        })
    }
}

const fn level_from_count(count: u8) -> Level {
    match count {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn level_from_name(name: &str) -> Option<Level> {
    match name.to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Increase verbosity: -v WARN, -vv INFO, -vvv DEBUG, -vvvv TRACE")
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long(ARG_LOG_LEVEL)
                .help("Log level for najeekai when no -v is given")
                .env("NAJEEKAI_LOG_LEVEL")
                .ignore_case(true)
                .value_parser(PossibleValuesParser::new(LEVELS)),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long(ARG_LOG_FORMAT)
                .help("Log output format")
                .env("NAJEEKAI_LOG_FORMAT")
                .default_value("pretty")
                .value_parser(PossibleValuesParser::new(["pretty", "json"])),
        )
        .arg(
            Arg::new(ARG_OTLP_ENDPOINT)
                .long(ARG_OTLP_ENDPOINT)
                .help("OTLP/gRPC collector for trace export, e.g. https://otel.najeekai.dev:4317")
                .env("NAJEEKAI_OTLP_ENDPOINT"),
        )
        .arg(
            Arg::new(ARG_OTLP_HEADER)
                .long(ARG_OTLP_HEADER)
                .help("Metadata sent with every export (key=value, repeatable; `-bin` keys take base64)")
                .env("NAJEEKAI_OTLP_HEADERS")
                .hide_env_values(true)
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment reported with traces")
                .env("NAJEEKAI_ENVIRONMENT")
                .default_value("development"),
        )
        .arg(
            Arg::new(ARG_INSTANCE_ID)
                .long(ARG_INSTANCE_ID)
                .help("Service instance id reported with traces (default: random ULID)")
                .env("NAJEEKAI_INSTANCE_ID"),
        )
}
