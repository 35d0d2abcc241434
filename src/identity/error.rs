use thiserror::Error;

use super::retry::CallError;

/// Input that cannot be acted on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no signup data found")]
    MissingPending,
    #[error("verification code must be 6 digits")]
    MalformedCode,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("username must be 3-32 characters of a-z, 0-9, '.', '_' or '-'")]
    InvalidUsername,
    #[error("invalid role")]
    InvalidRole,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("stored signup data is unreadable")]
    CorruptPending,
}

/// Failures surfaced at the action boundary of the verification workflow.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("OTP has expired")]
    ExpiredCode,
    #[error("Invalid OTP")]
    InvalidCode,
    #[error("an account with this email or username already exists")]
    StoreConflict,
    #[error("resend available in {remaining_seconds} seconds")]
    ResendCooldown { remaining_seconds: u64 },
    #[error("rate limited")]
    RateLimited,
    #[error(transparent)]
    Network(#[from] CallError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Message shown to the user as a transient notice.
    ///
    /// Transport details are never shown; they are logged where the error is raised.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) | Self::Internal(_) => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}
