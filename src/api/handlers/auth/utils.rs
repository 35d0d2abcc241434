//! Shared helpers for auth handlers.

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use super::context::context_cookie;
use super::state::{AuthConfig, AuthState};
use super::types::ErrorResponse;
use crate::identity::AuthError;
use crate::identity::rate_limit::{RateLimitAction, RateLimitDecision};

/// Status code for an error raised at the action boundary.
pub(super) fn error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Validation(_) | AuthError::InvalidCode => StatusCode::BAD_REQUEST,
        AuthError::ExpiredCode => StatusCode::GONE,
        AuthError::StoreConflict => StatusCode::CONFLICT,
        AuthError::ResendCooldown { .. } | AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Network(_) => StatusCode::BAD_GATEWAY,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Turn an `AuthError` into a JSON notice `{error}`.
pub(super) fn error_response(err: &AuthError) -> Response {
    match err {
        AuthError::Network(inner) => warn!("upstream call failed: {inner}"),
        AuthError::Internal(inner) => error!("internal error: {inner:#}"),
        _ => {}
    }
    let remaining_seconds = match err {
        AuthError::ResendCooldown { remaining_seconds } => Some(*remaining_seconds),
        _ => None,
    };
    (
        error_status(err),
        Json(ErrorResponse {
            error: err.user_message(),
            remaining_seconds,
        }),
    )
        .into_response()
}

/// Attach the context cookie so the browser keeps talking to the same context.
pub(super) fn with_context_cookie(mut response: Response, config: &AuthConfig, id: &str) -> Response {
    match context_cookie(config, id) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build context cookie: {err}"),
    }
    response
}

/// Apply IP and (when known) email rate limits before any passcode work.
pub(super) fn check_rate_limit(
    auth_state: &AuthState,
    headers: &HeaderMap,
    email: Option<&str>,
    action: RateLimitAction,
) -> Result<(), AuthError> {
    let client_ip = extract_client_ip(headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), action)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }
    if let Some(email) = email
        && auth_state.rate_limiter().check_email(email, action) == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }
    Ok(())
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{CallError, ValidationError};
    use axum::http::HeaderValue;

    #[test]
    fn error_statuses() {
        assert_eq!(error_status(&AuthError::InvalidCode), StatusCode::BAD_REQUEST);
        assert_eq!(error_status(&AuthError::ExpiredCode), StatusCode::GONE);
        assert_eq!(error_status(&AuthError::StoreConflict), StatusCode::CONFLICT);
        assert_eq!(
            error_status(&AuthError::ResendCooldown {
                remaining_seconds: 5
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            error_status(&AuthError::Validation(ValidationError::MissingPending)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&AuthError::Network(CallError::Timeout {
                operation: "issuer.send",
                attempts: 3
            })),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 9.9.9.9 "));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
