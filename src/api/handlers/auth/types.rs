//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::identity::{OutcomeKind, SessionUser};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    #[serde(alias = "code")]
    pub otp: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct VerifyOtpResponse {
    pub outcome: OutcomeKind,
    pub user: SessionUser,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub redirect: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct OtpStatusResponse {
    pub remaining_seconds: u64,
    pub can_resend: bool,
    /// Remaining time as `m:ss`.
    pub display: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SessionResponse {
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn verify_request_accepts_code_alias() -> Result<()> {
        let request: VerifyOtpRequest = serde_json::from_str(r#"{"code":"482913"}"#)?;
        assert_eq!(request.otp, "482913");
        let request: VerifyOtpRequest = serde_json::from_str(r#"{"otp":"123456"}"#)?;
        assert_eq!(request.otp, "123456");
        Ok(())
    }

    #[test]
    fn error_response_omits_missing_remaining_seconds() -> Result<()> {
        let value = serde_json::to_value(ErrorResponse {
            error: "Invalid OTP".to_string(),
            remaining_seconds: None,
        })?;
        assert_eq!(value, serde_json::json!({ "error": "Invalid OTP" }));
        Ok(())
    }
}
