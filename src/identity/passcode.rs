//! Passcode issuance: ask the issuer for a code and persist its hashed record.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, error};
use ulid::Ulid;

use super::clock::Clock;
use super::error::{AuthError, ValidationError};
use super::issuer::PasscodeIssuer;
use super::model::{PasscodeRecord, PendingRegistration, SignupForm};
use super::retry::{CallError, RetryPolicy};
use super::storage::RegistrationCache;
use super::store::{IdentityStore, PasscodeStore};
use super::validate::{hash_code, normalize_email, valid_email};

/// Default lifetime of an issued passcode.
pub const PASSCODE_TTL_SECONDS: i64 = 600;

pub struct PasscodeService {
    issuer: Arc<dyn PasscodeIssuer>,
    passcodes: Arc<dyn PasscodeStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    ttl: Duration,
}

impl PasscodeService {
    #[must_use]
    pub fn new(
        issuer: Arc<dyn PasscodeIssuer>,
        passcodes: Arc<dyn PasscodeStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            issuer,
            passcodes,
            clock,
            retry: RetryPolicy::default(),
            ttl: Duration::seconds(PASSCODE_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Issue a code for `email` and return the session id it is keyed by.
    ///
    /// The issuer mails a fresh code on every call, so it gets one attempt.
    ///
    /// # Errors
    /// `Validation(InvalidEmail)` for a malformed address, `Network` when the
    /// issuer times out or fails, or the store is out of retry budget.
    pub async fn send(&self, email: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(ValidationError::InvalidEmail.into());
        }

        let issued = self
            .retry
            .with_max_attempts(1)
            .run("issuer.send", || self.issuer.send(&email))
            .await?;
        let Some(otp) = issued.otp else {
            error!(session_id = %issued.session_id, "issuer response did not include a code");
            return Err(CallError::Transport {
                operation: "issuer.send",
                attempts: 1,
                message: "issuer response did not include a code".to_string(),
            }
            .into());
        };

        let now = self.clock.now();
        let record = PasscodeRecord {
            email,
            code_hash: hash_code(&otp),
            session_id: issued.session_id,
            expires_at: now + self.ttl,
            created_at: now,
        };
        self.retry
            .run("passcodes.insert", || self.passcodes.insert(&record))
            .await?;

        debug!(session_id = %record.session_id, "passcode issued");
        Ok(record.session_id)
    }

    /// Issue a fresh code for the pending email and point the registration at it.
    ///
    /// The previous record stays in the store but no longer matches the held session id.
    ///
    /// # Errors
    /// Same as [`PasscodeService::send`]. The pending registration is untouched on error.
    pub async fn resend(&self, pending: &mut PendingRegistration) -> Result<(), AuthError> {
        if pending.decoy {
            pending.session_id = Ulid::new().to_string();
            debug!("decoy registration rotated");
            return Ok(());
        }
        let session_id = self.send(&pending.email).await?;
        pending.session_id = session_id;
        Ok(())
    }

    /// Validate the signup form, issue a code and hold the pending registration.
    ///
    /// # Errors
    /// Validation errors for the form, or issuance errors from [`PasscodeService::send`].
    pub async fn start_signup(
        &self,
        form: &SignupForm,
        cache: RegistrationCache<'_>,
    ) -> Result<PendingRegistration, AuthError> {
        let form = form.validated()?;
        let session_id = self.send(&form.email).await?;
        let pending = form.into_pending(session_id);
        cache.hold(&pending)?;
        Ok(pending)
    }

    /// Issue a login code when `email` belongs to an identity.
    ///
    /// Something is always held: the returning user's registration, or a decoy
    /// when the email is unknown or issuing failed. Returns whether a code went
    /// out. Callers must not reveal this to the user.
    ///
    /// # Errors
    /// `Validation(InvalidEmail)` for a malformed address, or a cache failure.
    pub async fn start_login(
        &self,
        identities: &dyn IdentityStore,
        email: &str,
        cache: RegistrationCache<'_>,
    ) -> Result<bool, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(ValidationError::InvalidEmail.into());
        }
        let pending = match self.returning_registration(identities, &email).await {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                debug!("login requested for unknown email");
                PendingRegistration::decoy(&email, Ulid::new().to_string())
            }
            Err(err) => {
                error!("Failed to issue login passcode: {err}");
                PendingRegistration::decoy(&email, Ulid::new().to_string())
            }
        };
        cache.hold(&pending)?;
        Ok(!pending.decoy)
    }

    async fn returning_registration(
        &self,
        identities: &dyn IdentityStore,
        email: &str,
    ) -> Result<Option<PendingRegistration>, AuthError> {
        let existing = self
            .retry
            .run("identities.find_by_email", || identities.find_by_email(email))
            .await?;
        let Some(identity) = existing else {
            return Ok(None);
        };
        let session_id = self.send(&identity.email).await?;
        Ok(Some(PendingRegistration::for_returning(&identity, session_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::clock::{ManualClock, SystemClock};
    use crate::identity::issuer::{IssuedCode, IssuerVerdict};
    use crate::identity::model::Role;
    use crate::identity::storage::MemoryContextStorage;
    use crate::identity::store::{BoxFuture, MemoryIdentityStore, MemoryPasscodeStore};
    use anyhow::{Result, anyhow};
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingIssuer {
        calls: AtomicU32,
        otp: Option<&'static str>,
        first_call_delay: Option<std::time::Duration>,
    }

    impl CountingIssuer {
        fn with_otp(otp: Option<&'static str>) -> Self {
            Self {
                otp,
                ..Self::default()
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PasscodeIssuer for CountingIssuer {
        fn send<'a>(&'a self, _email: &'a str) -> BoxFuture<'a, Result<IssuedCode>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n == 0
                    && let Some(delay) = self.first_call_delay
                {
                    tokio::time::sleep(delay).await;
                }
                Ok(IssuedCode {
                    session_id: format!("session-{n}"),
                    otp: self.otp.map(str::to_string),
                })
            })
        }

        fn verify<'a>(
            &'a self,
            _email: &'a str,
            _otp: &'a str,
            _session_id: &'a str,
        ) -> BoxFuture<'a, Result<IssuerVerdict>> {
            Box::pin(async { Err(anyhow!("not used")) })
        }
    }

    struct Fixture {
        service: PasscodeService,
        issuer: Arc<CountingIssuer>,
        store: Arc<MemoryPasscodeStore>,
    }

    fn fixture(issuer: CountingIssuer) -> Fixture {
        let issuer = Arc::new(issuer);
        let store = Arc::new(MemoryPasscodeStore::new());
        let service = PasscodeService::new(
            issuer.clone(),
            store.clone(),
            Arc::new(ManualClock::new(Utc::now())),
        );
        Fixture {
            service,
            issuer,
            store,
        }
    }

    fn service(otp: Option<&'static str>) -> (PasscodeService, Arc<MemoryPasscodeStore>) {
        let Fixture { service, store, .. } = fixture(CountingIssuer::with_otp(otp));
        (service, store)
    }

    fn ada(role: Role) -> PendingRegistration {
        PendingRegistration {
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            first_name: "Ada".to_string(),
            middle_name: None,
            last_name: "Lovelace".to_string(),
            role,
            session_id: String::new(),
            decoy: false,
        }
    }

    #[tokio::test]
    async fn send_persists_hashed_record_with_ttl() -> Result<()> {
        let (service, store) = service(Some("482913"));
        let session_id = service.send(" Ada@Example.com ").await?;
        assert_eq!(session_id, "session-0");

        let record = store
            .find_latest(&session_id, &hash_code("482913"))
            .await?
            .ok_or_else(|| anyhow!("record missing"))?;
        assert_eq!(record.email, "ada@example.com");
        assert_eq!(record.expires_at - record.created_at, Duration::seconds(600));
        Ok(())
    }

    #[tokio::test]
    async fn send_rejects_invalid_email() {
        let (service, store) = service(Some("482913"));
        let result = service.send("nope").await;
        assert!(matches!(
            result,
            Err(AuthError::Validation(ValidationError::InvalidEmail))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn send_without_code_is_a_network_error() {
        let (service, _) = service(None);
        assert!(matches!(
            service.send("ada@example.com").await,
            Err(AuthError::Network(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn send_does_not_call_the_issuer_twice_after_a_timeout() {
        let Fixture {
            service,
            issuer,
            store,
        } = fixture(CountingIssuer {
            otp: Some("482913"),
            first_call_delay: Some(std::time::Duration::from_secs(30)),
            ..CountingIssuer::default()
        });
        let service = service.with_retry(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_timeout(std::time::Duration::from_secs(5)),
        );

        let result = service.send("ada@example.com").await;
        assert!(matches!(
            result,
            Err(AuthError::Network(CallError::Timeout { attempts: 1, .. }))
        ));
        assert_eq!(issuer.calls(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn resend_replaces_session_id() -> Result<()> {
        let (service, store) = service(Some("482913"));
        let mut pending = ada(Role::Client);
        pending.session_id = service.send("ada@example.com").await?;
        service.resend(&mut pending).await?;
        assert_eq!(pending.session_id, "session-1");
        assert_eq!(store.len().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn start_signup_holds_pending_registration() -> Result<()> {
        let (service, _) = service(Some("482913"));
        let storage = MemoryContextStorage::new();
        let cache = RegistrationCache::new(&storage);
        let form = SignupForm {
            email: "Ada@Example.com".to_string(),
            username: "ada".to_string(),
            first_name: "Ada".to_string(),
            middle_name: None,
            last_name: "Lovelace".to_string(),
            role: Role::Provider,
        };
        let pending = service.start_signup(&form, cache).await?;
        assert_eq!(pending.email, "ada@example.com");
        assert!(!pending.decoy);
        assert_eq!(cache.load()?, pending);
        Ok(())
    }

    #[tokio::test]
    async fn start_login_holds_returning_registration() -> Result<()> {
        let (service, _) = service(Some("482913"));
        let identities = MemoryIdentityStore::new(Arc::new(SystemClock));
        let storage = MemoryContextStorage::new();
        let cache = RegistrationCache::new(&storage);

        let mut known = ada(Role::Provider);
        identities.insert(&known.to_new_identity()).await?;
        assert!(service.start_login(&identities, "ADA@example.com", cache).await?);
        known.session_id = "session-0".to_string();
        assert_eq!(cache.load()?, known);
        Ok(())
    }

    #[tokio::test]
    async fn start_login_holds_a_decoy_for_unknown_email() -> Result<()> {
        let Fixture {
            service,
            issuer,
            store,
        } = fixture(CountingIssuer::with_otp(Some("482913")));
        let identities = MemoryIdentityStore::new(Arc::new(SystemClock));
        let storage = MemoryContextStorage::new();
        let cache = RegistrationCache::new(&storage);

        assert!(!service.start_login(&identities, "ghost@example.com", cache).await?);
        let mut held = cache.load()?;
        assert!(held.decoy);
        assert_eq!(held.email, "ghost@example.com");
        assert_eq!(issuer.calls(), 0);
        assert!(store.is_empty().await);

        let before = held.session_id.clone();
        service.resend(&mut held).await?;
        assert_ne!(held.session_id, before);
        assert_eq!(issuer.calls(), 0);
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn start_login_holds_a_decoy_when_issuing_fails() -> Result<()> {
        let Fixture {
            service, issuer, ..
        } = fixture(CountingIssuer::with_otp(None));
        let identities = MemoryIdentityStore::new(Arc::new(SystemClock));
        identities.insert(&ada(Role::Client).to_new_identity()).await?;
        let storage = MemoryContextStorage::new();
        let cache = RegistrationCache::new(&storage);

        assert!(!service.start_login(&identities, "ada@example.com", cache).await?);
        assert!(cache.load()?.decoy);
        assert_eq!(issuer.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn start_login_rejects_malformed_email() {
        let (service, _) = service(Some("482913"));
        let identities = MemoryIdentityStore::new(Arc::new(SystemClock));
        let storage = MemoryContextStorage::new();
        let cache = RegistrationCache::new(&storage);
        assert!(matches!(
            service.start_login(&identities, "ghost", cache).await,
            Err(AuthError::Validation(ValidationError::InvalidEmail))
        ));
        assert!(!cache.has_pending());
    }
}
