use anyhow::{Result, bail};
use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_RESEND_COUNTDOWN_SECONDS: &str = "resend-countdown-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_CONTEXT_TTL_SECONDS: &str = "context-ttl-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub otp_ttl_seconds: i64,
    pub resend_countdown_seconds: u64,
    pub session_ttl_seconds: i64,
    pub context_ttl_seconds: u64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a TTL is not positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .unwrap_or_else(|| "https://najeekai.dev".to_string());
        let otp_ttl_seconds = matches
            .get_one::<i64>(ARG_OTP_TTL_SECONDS)
            .copied()
            .unwrap_or(600);
        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .unwrap_or(604_800);

        if otp_ttl_seconds <= 0 {
            bail!("--{ARG_OTP_TTL_SECONDS} must be greater than zero");
        }
        if session_ttl_seconds <= 0 {
            bail!("--{ARG_SESSION_TTL_SECONDS} must be greater than zero");
        }

        Ok(Self {
            frontend_base_url,
            otp_ttl_seconds,
            resend_countdown_seconds: matches
                .get_one::<u64>(ARG_RESEND_COUNTDOWN_SECONDS)
                .copied()
                .unwrap_or(600),
            session_ttl_seconds,
            context_ttl_seconds: matches
                .get_one::<u64>(ARG_CONTEXT_TTL_SECONDS)
                .copied()
                .unwrap_or(86_400),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used for CORS and secure cookies")
                .env("NAJEEKAI_FRONTEND_BASE_URL")
                .default_value("https://najeekai.dev"),
        )
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("Passcode validity in seconds")
                .env("NAJEEKAI_OTP_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESEND_COUNTDOWN_SECONDS)
                .long(ARG_RESEND_COUNTDOWN_SECONDS)
                .help("Countdown before a passcode can be resent")
                .env("NAJEEKAI_RESEND_COUNTDOWN_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("NAJEEKAI_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_CONTEXT_TTL_SECONDS)
                .long(ARG_CONTEXT_TTL_SECONDS)
                .help("Idle time before a browser context is evicted")
                .env("NAJEEKAI_CONTEXT_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
}
