//! Command-line argument dispatch.
//!
//! Parses validated CLI arguments and maps them to the action to run, such as
//! starting the API server with its full configuration.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth, issuer};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let issuer_opts = issuer::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        otp_ttl_seconds: auth_opts.otp_ttl_seconds,
        resend_countdown_seconds: auth_opts.resend_countdown_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        context_ttl_seconds: auth_opts.context_ttl_seconds,
        issuer_url: issuer_opts.url,
        issuer_api_key: issuer_opts.api_key,
        issuer_timeout_seconds: issuer_opts.timeout_seconds,
        issuer_max_attempts: issuer_opts.max_attempts,
    }))
}
