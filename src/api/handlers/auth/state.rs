//! Auth state and configuration shared by the auth handlers.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;

use super::context::BrowserContexts;
use crate::identity::{
    Clock, PasscodeIssuer, PasscodeService, RESEND_COUNTDOWN_SECONDS, RetryPolicy,
    SessionManager, VerificationController,
    passcode::PASSCODE_TTL_SECONDS,
    rate_limit::RateLimiter,
    session::SESSION_TTL_SECONDS,
    storage::ContextStorage,
    store::{IdentityStore, PasscodeStore},
};

const DEFAULT_CONTEXT_TTL_SECONDS: u64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    otp_ttl_seconds: i64,
    resend_countdown_seconds: u64,
    session_ttl_seconds: i64,
    context_ttl_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            otp_ttl_seconds: PASSCODE_TTL_SECONDS,
            resend_countdown_seconds: RESEND_COUNTDOWN_SECONDS,
            session_ttl_seconds: SESSION_TTL_SECONDS,
            context_ttl_seconds: DEFAULT_CONTEXT_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_countdown_seconds(mut self, seconds: u64) -> Self {
        self.resend_countdown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_context_ttl_seconds(mut self, seconds: u64) -> Self {
        self.context_ttl_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn resend_countdown_seconds(&self) -> u64 {
        self.resend_countdown_seconds
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn context_ttl_seconds(&self) -> u64 {
        self.context_ttl_seconds
    }

    pub(super) fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Stores and issuer the auth handlers run against.
pub struct AuthBackends {
    pub identities: Arc<dyn IdentityStore>,
    pub passcodes: Arc<dyn PasscodeStore>,
    pub issuer: Arc<dyn PasscodeIssuer>,
}

pub struct AuthState {
    config: AuthConfig,
    identities: Arc<dyn IdentityStore>,
    passcodes: PasscodeService,
    verification: VerificationController,
    clock: Arc<dyn Clock>,
    contexts: BrowserContexts,
    rate_limiter: Arc<dyn RateLimiter>,
    retry: RetryPolicy,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        backends: AuthBackends,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let passcodes = PasscodeService::new(
            backends.issuer.clone(),
            backends.passcodes.clone(),
            clock.clone(),
        )
        .with_retry(retry)
        .with_ttl(ChronoDuration::seconds(config.otp_ttl_seconds()));
        let verification = VerificationController::new(
            backends.identities.clone(),
            backends.passcodes,
            backends.issuer,
            clock.clone(),
        )
        .with_retry(retry);
        let contexts = BrowserContexts::new(Duration::from_secs(config.context_ttl_seconds()));

        Self {
            config,
            identities: backends.identities,
            passcodes,
            verification,
            clock,
            contexts,
            rate_limiter,
            retry,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn identities(&self) -> &Arc<dyn IdentityStore> {
        &self.identities
    }

    pub(super) fn passcodes(&self) -> &PasscodeService {
        &self.passcodes
    }

    pub(super) fn verification(&self) -> &VerificationController {
        &self.verification
    }

    pub(crate) fn contexts(&self) -> &BrowserContexts {
        &self.contexts
    }

    pub(super) fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    /// Session manager over one browser context's storage.
    pub(crate) fn sessions<'a>(&self, storage: &'a dyn ContextStorage) -> SessionManager<'a> {
        SessionManager::new(storage, self.clock.clone())
            .with_ttl(ChronoDuration::seconds(self.config.session_ttl_seconds()))
    }
}

#[cfg(test)]
mod tests {
    use super::AuthConfig;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://najeekai.dev".to_string());
        assert_eq!(config.frontend_base_url(), "https://najeekai.dev");
        assert_eq!(config.otp_ttl_seconds(), 600);
        assert_eq!(config.resend_countdown_seconds(), 600);
        assert_eq!(config.session_ttl_seconds(), 7 * 24 * 60 * 60);
        assert_eq!(config.context_ttl_seconds(), super::DEFAULT_CONTEXT_TTL_SECONDS);
        assert!(config.cookie_secure());

        let config = AuthConfig::new("http://localhost:8080".to_string())
            .with_otp_ttl_seconds(60)
            .with_resend_countdown_seconds(30)
            .with_session_ttl_seconds(120)
            .with_context_ttl_seconds(90);
        assert_eq!(config.otp_ttl_seconds(), 60);
        assert_eq!(config.resend_countdown_seconds(), 30);
        assert_eq!(config.session_ttl_seconds(), 120);
        assert_eq!(config.context_ttl_seconds(), 90);
        assert!(!config.cookie_secure());
    }
}
