use anyhow::{Result, bail};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ISSUER_URL: &str = "issuer-url";
pub const ARG_ISSUER_API_KEY: &str = "issuer-api-key";
pub const ARG_ISSUER_TIMEOUT_SECONDS: &str = "issuer-timeout-seconds";
pub const ARG_ISSUER_MAX_ATTEMPTS: &str = "issuer-max-attempts";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
}

impl Options {
    /// Parse passcode issuer arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the timeout or attempt count is zero.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        // Helper to filter empty strings which clap might pass through if env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let timeout_seconds = matches
            .get_one::<u64>(ARG_ISSUER_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(10);
        let max_attempts = matches
            .get_one::<u32>(ARG_ISSUER_MAX_ATTEMPTS)
            .copied()
            .unwrap_or(3);
        if timeout_seconds == 0 {
            bail!("--{ARG_ISSUER_TIMEOUT_SECONDS} must be greater than zero");
        }
        if max_attempts == 0 {
            bail!("--{ARG_ISSUER_MAX_ATTEMPTS} must be greater than zero");
        }

        Ok(Self {
            url: get_non_empty(ARG_ISSUER_URL),
            api_key: get_non_empty(ARG_ISSUER_API_KEY).map(SecretString::from),
            timeout_seconds,
            max_attempts,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ISSUER_URL)
                .long(ARG_ISSUER_URL)
                .help("Base URL of the passcode issuer (sendOtp/verifyOtp)")
                .long_help(
                    "Base URL of the passcode issuer exposing `sendOtp` and `verifyOtp`.\n\nWhen omitted, passcodes are generated in-process, stored in the database and delivered through the log sender.",
                )
                .env("NAJEEKAI_ISSUER_URL"),
        )
        .arg(
            Arg::new(ARG_ISSUER_API_KEY)
                .long(ARG_ISSUER_API_KEY)
                .help("Bearer token sent to the passcode issuer")
                .env("NAJEEKAI_ISSUER_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ISSUER_TIMEOUT_SECONDS)
                .long(ARG_ISSUER_TIMEOUT_SECONDS)
                .help("Timeout for each issuer and store call")
                .env("NAJEEKAI_ISSUER_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ISSUER_MAX_ATTEMPTS)
                .long(ARG_ISSUER_MAX_ATTEMPTS)
                .help("Attempts per issuer or store call before giving up")
                .env("NAJEEKAI_ISSUER_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
}
