//! Passcode verification, resend and countdown endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{error, info};

use super::context::BrowserContext;
use super::state::AuthState;
use super::types::{ErrorResponse, OtpStatusResponse, VerifyOtpRequest, VerifyOtpResponse};
use super::utils::{check_rate_limit, error_response, with_context_cookie};
use crate::identity::{
    AuthError, RegistrationCache, ValidationError, countdown::format_remaining,
    rate_limit::RateLimitAction,
};

pub(super) fn otp_status_body(context: &BrowserContext) -> OtpStatusResponse {
    let remaining_seconds = context.remaining_seconds();
    OtpStatusResponse {
        remaining_seconds,
        can_resend: remaining_seconds == 0,
        display: context.countdown_display(),
    }
}

fn missing_payload() -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "Missing payload".to_string(),
            remaining_seconds: None,
        }),
    )
        .into_response()
}

/// Verify the submitted passcode and establish a session for this browser context.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Verified; session established", body = VerifyOtpResponse),
        (status = 400, description = "Missing signup data, malformed or invalid code", body = ErrorResponse),
        (status = 409, description = "Email or username already taken", body = ErrorResponse),
        (status = 410, description = "Code expired", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 502, description = "Upstream unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    if let Err(err) = check_rate_limit(&auth_state, &headers, None, RateLimitAction::VerifyOtp) {
        return error_response(&err);
    }

    let Some(context) = auth_state.contexts().find(&headers).await else {
        return error_response(&AuthError::Validation(ValidationError::MissingPending));
    };
    let _actions = context.lock_actions().await;
    let cache = RegistrationCache::new(context.storage());
    let sessions = auth_state.sessions(context.storage());

    match auth_state
        .verification()
        .verify(&request.otp, cache, &sessions)
        .await
    {
        Ok(outcome) => {
            context.stop_countdown();
            let response = VerifyOtpResponse {
                outcome: outcome.kind,
                redirect: outcome.redirect().to_string(),
                token: outcome.session.token,
                expires_at: outcome.session.expires_at,
                user: outcome.user,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

/// Issue a new passcode once the countdown has reached zero.
#[utoipa::path(
    post,
    path = "/v1/auth/resend-otp",
    responses(
        (status = 202, description = "New passcode sent; countdown restarted", body = OtpStatusResponse),
        (status = 400, description = "No signup data found", body = ErrorResponse),
        (status = 429, description = "Countdown still running", body = ErrorResponse),
        (status = 502, description = "Passcode issuer unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn resend_otp(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let (context_id, context) = auth_state.contexts().resolve(&headers).await;
    let _actions = context.lock_actions().await;
    let cache = RegistrationCache::new(context.storage());

    let response = match resend(&auth_state, &headers, &context, cache).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(otp_status_body(&context))).into_response(),
        Err(err) => error_response(&err),
    };
    with_context_cookie(response, auth_state.config(), &context_id)
}

async fn resend(
    auth_state: &AuthState,
    headers: &HeaderMap,
    context: &BrowserContext,
    cache: RegistrationCache<'_>,
) -> Result<(), AuthError> {
    let mut pending = cache.load()?;
    check_rate_limit(auth_state, headers, Some(&pending.email), RateLimitAction::ResendOtp)?;

    context.check_resend()?;

    auth_state.passcodes().resend(&mut pending).await?;
    if let Err(err) = cache.hold(&pending) {
        error!("Failed to store resent signup data: {err}");
        return Err(err.into());
    }
    context.restart_countdown(auth_state.config().resend_countdown_seconds());
    info!("passcode resent");
    Ok(())
}

/// Countdown state for the verification view.
#[utoipa::path(
    get,
    path = "/v1/auth/otp-status",
    responses(
        (status = 200, description = "Countdown state", body = OtpStatusResponse)
    ),
    tag = "auth"
)]
pub async fn otp_status(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let body = match auth_state.contexts().find(&headers).await {
        Some(context) => otp_status_body(&context),
        None => OtpStatusResponse {
            remaining_seconds: 0,
            can_resend: true,
            display: format_remaining(0),
        },
    };
    (StatusCode::OK, Json(body))
}
