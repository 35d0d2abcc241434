//! Verification Controller.
//!
//! Turns a submitted passcode plus the held [`PendingRegistration`] into an
//! authenticated session:
//!
//! ```text
//! Idle -> CodeSubmitted -> { Valid, Invalid, Expired }
//! Valid -> { Registered, LoggedIn, Failed }
//! ```
//!
//! First-time verification inserts an identity. The store's unique indexes make
//! this idempotent: a duplicate insert (a replay, or another tab racing on the
//! same code) is resolved by re-reading the identity and logging in against it.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::clock::Clock;
use super::error::{AuthError, ValidationError};
use super::issuer::PasscodeIssuer;
use super::model::{IdentityRecord, PendingRegistration, Session, SessionUser};
use super::retry::RetryPolicy;
use super::session::SessionManager;
use super::storage::RegistrationCache;
use super::store::{IdentityStore, InsertOutcome, PasscodeStore};
use super::validate::{hash_code, normalize_code};

/// Where the browser goes after a successful verification.
pub const DASHBOARD_PATH: &str = "/dashboard";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationState {
    Idle,
    CodeSubmitted,
    Valid,
    Invalid,
    Expired,
    Registered,
    LoggedIn,
    Failed,
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CodeSubmitted => "code_submitted",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::Registered => "registered",
            Self::LoggedIn => "logged_in",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// A new identity was created.
    Registered,
    /// An existing identity was loaded.
    LoggedIn,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub kind: OutcomeKind,
    pub user: SessionUser,
    pub session: Session,
}

impl VerificationOutcome {
    #[must_use]
    pub fn state(&self) -> VerificationState {
        match self.kind {
            OutcomeKind::Registered => VerificationState::Registered,
            OutcomeKind::LoggedIn => VerificationState::LoggedIn,
        }
    }

    #[must_use]
    pub fn redirect(&self) -> &'static str {
        DASHBOARD_PATH
    }
}

pub struct VerificationController {
    identities: Arc<dyn IdentityStore>,
    passcodes: Arc<dyn PasscodeStore>,
    issuer: Arc<dyn PasscodeIssuer>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl VerificationController {
    #[must_use]
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        passcodes: Arc<dyn PasscodeStore>,
        issuer: Arc<dyn PasscodeIssuer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identities,
            passcodes,
            issuer,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Verify `code` against the held registration and establish a session.
    ///
    /// On success the pending registration is cleared and the session persisted.
    /// On any error the pending registration is left in place so the user can
    /// retry or resend.
    ///
    /// # Errors
    /// See [`AuthError`]; `ExpiredCode` and `InvalidCode` are the expected user errors.
    pub async fn verify(
        &self,
        code: &str,
        cache: RegistrationCache<'_>,
        sessions: &SessionManager<'_>,
    ) -> Result<VerificationOutcome, AuthError> {
        let pending = cache.load()?;
        let mut state = VerificationState::Idle;
        transition(&mut state, VerificationState::CodeSubmitted, &pending);

        let result = self.resolve(code, &pending, &mut state).await;
        let identity = match result {
            Ok(resolved) => resolved,
            Err(err) => {
                if matches!(state, VerificationState::Valid) {
                    transition(&mut state, VerificationState::Failed, &pending);
                }
                return Err(err);
            }
        };

        let (kind, record) = identity;
        let session = sessions.create_session(record.id, record.role)?;
        let user = SessionUser::from(&record);
        sessions.set_auth(&user, &session)?;
        cache.clear();

        let outcome = VerificationOutcome {
            kind,
            user,
            session,
        };
        transition(&mut state, outcome.state(), &pending);
        info!(user_id = %outcome.user.id, role = %outcome.user.role, outcome = %outcome.state(), "verification complete");
        Ok(outcome)
    }

    async fn resolve(
        &self,
        code: &str,
        pending: &PendingRegistration,
        state: &mut VerificationState,
    ) -> Result<(OutcomeKind, IdentityRecord), AuthError> {
        let Some(code) = normalize_code(code) else {
            transition(state, VerificationState::Invalid, pending);
            return Err(ValidationError::MalformedCode.into());
        };

        let code_hash = hash_code(code);
        let record = self
            .retry
            .run("passcodes.find_latest", || {
                self.passcodes.find_latest(&pending.session_id, &code_hash)
            })
            .await?;
        let Some(record) = record.filter(|record| record.email == pending.email) else {
            transition(state, VerificationState::Invalid, pending);
            return Err(AuthError::InvalidCode);
        };

        if record.is_expired(self.clock.now()) {
            transition(state, VerificationState::Expired, pending);
            return Err(AuthError::ExpiredCode);
        }

        let verdict = self
            .retry
            .run("issuer.verify", || {
                self.issuer.verify(&pending.email, code, &pending.session_id)
            })
            .await?;
        if !verdict.success {
            transition(state, VerificationState::Invalid, pending);
            return Err(AuthError::InvalidCode);
        }
        transition(state, VerificationState::Valid, pending);

        if verdict.is_registered {
            if let Some(existing) = self.find_by_email(&pending.email).await? {
                return Ok((OutcomeKind::LoggedIn, existing));
            }
            debug!(session_id = %pending.session_id, "issuer reported a registered email the store does not know");
        }

        let new_identity = pending.to_new_identity();
        let inserted = self
            .retry
            .run("identities.insert", || self.identities.insert(&new_identity))
            .await?;
        match inserted {
            InsertOutcome::Created(record) => Ok((OutcomeKind::Registered, record)),
            InsertOutcome::Conflict => match self.find_by_email(&pending.email).await? {
                Some(existing) => {
                    if existing.role != pending.role {
                        warn!(
                            user_id = %existing.id,
                            stored_role = %existing.role,
                            pending_role = %pending.role,
                            "stored role differs from signup role; using stored role"
                        );
                    }
                    Ok((OutcomeKind::LoggedIn, existing))
                }
                None => Err(AuthError::StoreConflict),
            },
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AuthError> {
        Ok(self
            .retry
            .run("identities.find_by_email", || self.identities.find_by_email(email))
            .await?)
    }
}

fn transition(state: &mut VerificationState, next: VerificationState, pending: &PendingRegistration) {
    debug!(session_id = %pending.session_id, from = %state, to = %next, "verification state");
    *state = next;
}
