use crate::{
    api::{self, AuthConfig, IssuerOptions},
    identity::RetryPolicy,
};
use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub otp_ttl_seconds: i64,
    pub resend_countdown_seconds: u64,
    pub session_ttl_seconds: i64,
    pub context_ttl_seconds: u64,
    pub issuer_url: Option<String>,
    pub issuer_api_key: Option<SecretString>,
    pub issuer_timeout_seconds: u64,
    pub issuer_max_attempts: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_resend_countdown_seconds(args.resend_countdown_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_context_ttl_seconds(args.context_ttl_seconds);

    let timeout = Duration::from_secs(args.issuer_timeout_seconds);
    let retry = RetryPolicy::new()
        .with_max_attempts(args.issuer_max_attempts)
        .with_timeout(timeout);

    let issuer = IssuerOptions {
        url: args.issuer_url,
        api_key: args.issuer_api_key,
        timeout,
    };

    debug!(?auth_config, ?retry, "starting server");

    api::new(args.port, args.dsn, auth_config, issuer, retry).await
}
