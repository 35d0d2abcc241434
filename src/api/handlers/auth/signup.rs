//! Signup: issue a passcode and hold the pending registration in the browser context.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::info;

use super::state::AuthState;
use super::types::{ErrorResponse, OtpStatusResponse};
use super::utils::{check_rate_limit, error_response, with_context_cookie};
use super::verification::otp_status_body;
use crate::identity::{RegistrationCache, SignupForm, rate_limit::RateLimitAction};

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupForm,
    responses(
        (status = 202, description = "Passcode sent; pending registration held", body = OtpStatusResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 502, description = "Passcode issuer unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn signup(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignupForm>>,
) -> impl IntoResponse {
    let form: SignupForm = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Missing payload".to_string(),
                    remaining_seconds: None,
                }),
            )
                .into_response();
        }
    };

    let email = form.email.trim().to_lowercase();
    if let Err(err) = check_rate_limit(&auth_state, &headers, Some(&email), RateLimitAction::Signup) {
        return error_response(&err);
    }

    let (context_id, context) = auth_state.contexts().resolve(&headers).await;
    let _actions = context.lock_actions().await;
    let cache = RegistrationCache::new(context.storage());

    let response = match auth_state.passcodes().start_signup(&form, cache).await {
        Ok(pending) => {
            context.restart_countdown(auth_state.config().resend_countdown_seconds());
            info!(role = %pending.role, "signup passcode issued");
            (StatusCode::ACCEPTED, Json(otp_status_body(&context))).into_response()
        }
        Err(err) => error_response(&err),
    };
    with_context_cookie(response, auth_state.config(), &context_id)
}

/// Cancel an in-progress signup: drop the pending registration and stop the countdown.
#[utoipa::path(
    delete,
    path = "/v1/auth/signup",
    responses(
        (status = 204, description = "Pending registration cleared")
    ),
    tag = "auth"
)]
pub async fn cancel_signup(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(context) = auth_state.contexts().find(&headers).await {
        let _actions = context.lock_actions().await;
        RegistrationCache::new(context.storage()).clear();
        context.stop_countdown();
    }
    StatusCode::NO_CONTENT
}
