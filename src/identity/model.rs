//! Data carried through the signup and verification workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::ValidationError;
use super::validate::{normalize_email, normalize_username, valid_email, valid_name, valid_username};

/// Marketplace role of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Hires services.
    Client,
    /// Offers services.
    #[serde(alias = "freelancer")]
    Provider,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Provider => "provider",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "provider" | "freelancer" => Ok(Self::Provider),
            _ => Err(ValidationError::InvalidRole),
        }
    }
}

/// Raw signup form input as submitted by the browser.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    pub email: String,
    pub username: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub role: Role,
}

impl SignupForm {
    /// Normalize and check every field, returning the cleaned form.
    ///
    /// # Errors
    /// Returns the first field that fails validation.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        let email = normalize_email(&self.email);
        if !valid_email(&email) {
            return Err(ValidationError::InvalidEmail);
        }
        let username = normalize_username(&self.username);
        if !valid_username(&username) {
            return Err(ValidationError::InvalidUsername);
        }
        let first_name = self.first_name.trim().to_string();
        if !valid_name(&first_name) {
            return Err(ValidationError::MissingField("firstName"));
        }
        let last_name = self.last_name.trim().to_string();
        if !valid_name(&last_name) {
            return Err(ValidationError::MissingField("lastName"));
        }
        let middle_name = self
            .middle_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Ok(Self {
            email,
            username,
            first_name,
            middle_name,
            last_name,
            role: self.role,
        })
    }

    /// Attach the issuer's session id, producing the blob held until verification.
    #[must_use]
    pub fn into_pending(self, session_id: String) -> PendingRegistration {
        PendingRegistration {
            email: self.email,
            username: self.username,
            first_name: self.first_name,
            middle_name: self.middle_name,
            last_name: self.last_name,
            role: self.role,
            session_id,
            decoy: false,
        }
    }
}

/// Signup data awaiting passcode verification, held per browser context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingRegistration {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub role: Role,
    pub session_id: String,
    /// Held for a login whose email has no identity; it never verifies.
    #[serde(default, skip_serializing_if = "is_false")]
    pub decoy: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl PendingRegistration {
    /// Rebuild pending data for a returning user from the stored identity.
    #[must_use]
    pub fn for_returning(identity: &IdentityRecord, session_id: String) -> Self {
        Self {
            email: identity.email.clone(),
            username: identity.username.clone(),
            first_name: identity.first_name.clone(),
            middle_name: identity.middle_name.clone(),
            last_name: identity.last_name.clone(),
            role: identity.role,
            session_id,
            decoy: false,
        }
    }

    /// Stand-in for a login that issued no code, shaped like a returning user's.
    #[must_use]
    pub fn decoy(email: &str, session_id: String) -> Self {
        Self {
            email: email.to_string(),
            username: String::new(),
            first_name: String::new(),
            middle_name: None,
            last_name: String::new(),
            role: Role::Client,
            session_id,
            decoy: true,
        }
    }

    #[must_use]
    pub fn to_new_identity(&self) -> NewIdentity {
        NewIdentity {
            email: self.email.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            middle_name: self.middle_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
        }
    }
}

/// An issued passcode. The code itself is never kept; only its hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasscodeRecord {
    pub email: String,
    pub code_hash: Vec<u8>,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PasscodeRecord {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Fields required to create an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewIdentity {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub role: Role,
}

/// A stored account. Email and username are unique across both roles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Proof of authentication for a browser context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// The user bundle persisted next to the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub role: Role,
}

impl From<&IdentityRecord> for SessionUser {
    fn from(identity: &IdentityRecord) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            username: identity.username.clone(),
            first_name: identity.first_name.clone(),
            middle_name: identity.middle_name.clone(),
            last_name: identity.last_name.clone(),
            role: identity.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::Duration;

    fn form() -> SignupForm {
        SignupForm {
            email: " Alice@Example.COM ".to_string(),
            username: "Alice_01".to_string(),
            first_name: " Alice ".to_string(),
            middle_name: Some("  ".to_string()),
            last_name: "Doe".to_string(),
            role: Role::Client,
        }
    }

    #[test]
    fn role_parses_aliases() {
        assert_eq!("client".parse::<Role>().ok(), Some(Role::Client));
        assert_eq!("Freelancer".parse::<Role>().ok(), Some(Role::Provider));
        assert_eq!("provider".parse::<Role>().ok(), Some(Role::Provider));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn role_deserializes_freelancer_alias() -> Result<()> {
        let role: Role = serde_json::from_str("\"freelancer\"")?;
        assert_eq!(role, Role::Provider);
        assert_eq!(serde_json::to_string(&role)?, "\"provider\"");
        Ok(())
    }

    #[test]
    fn signup_form_normalizes_fields() -> Result<()> {
        let cleaned = form().validated()?;
        assert_eq!(cleaned.email, "alice@example.com");
        assert_eq!(cleaned.username, "alice_01");
        assert_eq!(cleaned.first_name, "Alice");
        assert_eq!(cleaned.middle_name, None);
        Ok(())
    }

    #[test]
    fn signup_form_rejects_missing_last_name() {
        let mut input = form();
        input.last_name = " ".to_string();
        assert_eq!(
            input.validated().err(),
            Some(ValidationError::MissingField("lastName"))
        );
    }

    #[test]
    fn signup_form_rejects_bad_email() {
        let mut input = form();
        input.email = "not-an-email".to_string();
        assert_eq!(input.validated().err(), Some(ValidationError::InvalidEmail));
    }

    #[test]
    fn pending_registration_uses_camel_case_blob() -> Result<()> {
        let pending = form().validated()?.into_pending("session-1".to_string());
        let value = serde_json::to_value(&pending)?;
        assert_eq!(value["sessionId"], "session-1");
        assert_eq!(value["firstName"], "Alice");
        assert_eq!(value["role"], "client");
        Ok(())
    }

    #[test]
    fn passcode_expires_at_boundary() {
        let now = Utc::now();
        let record = PasscodeRecord {
            email: "a@example.com".to_string(),
            code_hash: vec![1],
            session_id: "s".to_string(),
            expires_at: now,
            created_at: now - Duration::minutes(10),
        };
        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - Duration::seconds(1)));
    }
}
