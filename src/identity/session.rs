//! Session Manager: creates sessions and persists session + user per browser context.

use anyhow::{Context, Result};
use chrono::Duration;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::clock::Clock;
use super::model::{Role, Session, SessionUser};
use super::storage::ContextStorage;
use super::validate::generate_session_token;

pub const SESSION_KEY: &str = "session";
pub const USER_KEY: &str = "user";

/// Default session lifetime: 7 days.
pub const SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

pub struct SessionManager<'a> {
    storage: &'a dyn ContextStorage,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<'a> SessionManager<'a> {
    #[must_use]
    pub fn new(storage: &'a dyn ContextStorage, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            ttl: Duration::seconds(SESSION_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Build a fresh session for `user_id`; nothing is persisted yet.
    ///
    /// # Errors
    /// Returns an error if the token cannot be generated.
    pub fn create_session(&self, user_id: Uuid, role: Role) -> Result<Session> {
        let issued_at = self.clock.now();
        Ok(Session {
            token: generate_session_token()?,
            user_id,
            role,
            issued_at,
            expires_at: issued_at + self.ttl,
        })
    }

    /// Persist both the session and user, replacing whatever was there.
    ///
    /// # Errors
    /// Returns an error if either value cannot be serialized; nothing is written in that case.
    pub fn set_auth(&self, user: &SessionUser, session: &Session) -> Result<()> {
        let session_blob = serde_json::to_string(session).context("failed to serialize session")?;
        let user_blob = serde_json::to_string(user).context("failed to serialize user")?;
        self.storage
            .set_many(vec![(SESSION_KEY, session_blob), (USER_KEY, user_blob)]);
        Ok(())
    }

    /// The persisted user and session, if both exist, parse, and the session is unexpired.
    #[must_use]
    pub fn current(&self) -> Option<(SessionUser, Session)> {
        let session: Session = self.read(SESSION_KEY)?;
        let user: SessionUser = self.read(USER_KEY)?;
        if !session.is_active(self.clock.now()) || session.user_id != user.id {
            return None;
        }
        Some((user, session))
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Clear session and user together.
    pub fn logout(&self) {
        self.storage.remove_many(&[SESSION_KEY, USER_KEY]);
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let blob = self.storage.get(key)?;
        match serde_json::from_str(&blob) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, "ignoring unreadable stored value: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::clock::ManualClock;
    use crate::identity::storage::MemoryContextStorage;
    use chrono::Utc;

    fn user(id: Uuid, role: Role) -> SessionUser {
        SessionUser {
            id,
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            first_name: "Ada".to_string(),
            middle_name: None,
            last_name: "Lovelace".to_string(),
            role,
        }
    }

    #[test]
    fn set_auth_then_logout() -> Result<()> {
        let storage = MemoryContextStorage::new();
        let sessions = SessionManager::new(&storage, Arc::new(ManualClock::new(Utc::now())));
        assert!(!sessions.is_authenticated());

        let id = Uuid::new_v4();
        let session = sessions.create_session(id, Role::Client)?;
        assert_eq!(session.expires_at - session.issued_at, Duration::days(7));
        sessions.set_auth(&user(id, Role::Client), &session)?;
        assert!(sessions.is_authenticated());

        sessions.logout();
        assert!(!sessions.is_authenticated());
        assert_eq!(storage.get(SESSION_KEY), None);
        assert_eq!(storage.get(USER_KEY), None);
        Ok(())
    }

    #[test]
    fn set_auth_overwrites_previous_session() -> Result<()> {
        let storage = MemoryContextStorage::new();
        let sessions = SessionManager::new(&storage, Arc::new(ManualClock::new(Utc::now())));

        let first_id = Uuid::new_v4();
        let first = sessions.create_session(first_id, Role::Client)?;
        sessions.set_auth(&user(first_id, Role::Client), &first)?;

        let second_id = Uuid::new_v4();
        let second = sessions.create_session(second_id, Role::Provider)?;
        sessions.set_auth(&user(second_id, Role::Provider), &second)?;

        let (current_user, current) = sessions.current().ok_or_else(|| anyhow::anyhow!("no session"))?;
        assert_eq!(current_user.id, second_id);
        assert_eq!(current.token, second.token);
        assert_ne!(current.token, first.token);
        Ok(())
    }

    #[test]
    fn expired_session_is_not_authenticated() -> Result<()> {
        let storage = MemoryContextStorage::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sessions = SessionManager::new(&storage, clock.clone()).with_ttl(Duration::minutes(5));
        let id = Uuid::new_v4();
        let session = sessions.create_session(id, Role::Client)?;
        sessions.set_auth(&user(id, Role::Client), &session)?;

        clock.advance(Duration::minutes(5));
        assert!(!sessions.is_authenticated());
        Ok(())
    }

    #[test]
    fn half_written_state_is_not_authenticated() -> Result<()> {
        let storage = MemoryContextStorage::new();
        let sessions = SessionManager::new(&storage, Arc::new(ManualClock::new(Utc::now())));
        let id = Uuid::new_v4();
        let session = sessions.create_session(id, Role::Client)?;
        storage.set(SESSION_KEY, serde_json::to_string(&session)?);
        assert!(!sessions.is_authenticated());
        Ok(())
    }
}
