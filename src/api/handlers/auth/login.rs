//! Passwordless login: request a passcode for an existing account.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::state::AuthState;
use super::types::{ErrorResponse, LoginRequest};
use super::utils::{check_rate_limit, error_response, with_context_cookie};
use crate::identity::{AuthError, RegistrationCache, ValidationError, rate_limit::RateLimitAction};

/// Start a login (always returns 202 to avoid account probing).
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 202, description = "Login accepted"),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Missing payload".to_string(),
                remaining_seconds: None,
            }),
        )
            .into_response();
    };

    let email = request.email.trim().to_lowercase();
    if let Err(err) = check_rate_limit(&auth_state, &headers, Some(&email), RateLimitAction::Login) {
        return error_response(&err);
    }

    let (context_id, context) = auth_state.contexts().resolve(&headers).await;
    let _actions = context.lock_actions().await;
    let cache = RegistrationCache::new(context.storage());

    // A decoy is held for unknown emails, so the countdown and the /verify guard
    // look the same either way.
    let response = match auth_state
        .passcodes()
        .start_login(auth_state.identities().as_ref(), &email, cache)
        .await
    {
        Ok(issued) => {
            context.restart_countdown(auth_state.config().resend_countdown_seconds());
            debug!(issued, "login start handled");
            StatusCode::ACCEPTED.into_response()
        }
        Err(err @ AuthError::Validation(ValidationError::InvalidEmail)) => error_response(&err),
        Err(err) => {
            error!("Failed to start login: {err}");
            StatusCode::ACCEPTED.into_response()
        }
    };
    with_context_cookie(response, auth_state.config(), &context_id)
}
