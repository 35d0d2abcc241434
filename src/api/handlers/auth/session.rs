//! Session endpoints backed by the browser context.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::state::AuthState;
use super::types::SessionResponse;
use crate::identity::SessionUser;

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    let Some(context) = auth_state.contexts().find(&headers).await else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let _actions = context.lock_actions().await;
    let sessions = auth_state.sessions(context.storage());
    let Some((cached, session)) = sessions.current() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    // The stored identity wins over the bundle captured at verification time.
    let identities = auth_state.identities();
    let user = match auth_state
        .retry()
        .run("identities.find_by_id", || identities.find_by_id(cached.id))
        .await
    {
        Ok(Some(record)) => {
            let user = SessionUser::from(&record);
            if user != cached
                && let Err(err) = sessions.set_auth(&user, &session)
            {
                error!("Failed to refresh session user: {err}");
            }
            user
        }
        Ok(None) => {
            debug!(user_id = %cached.id, "session user no longer exists");
            sessions.logout();
            return StatusCode::NO_CONTENT.into_response();
        }
        Err(err) => {
            error!("Failed to load session user: {err}");
            cached
        }
    };

    (
        StatusCode::OK,
        Json(SessionResponse {
            user,
            expires_at: session.expires_at,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    if let Some(context) = auth_state.contexts().find(&headers).await {
        let _actions = context.lock_actions().await;
        auth_state.sessions(context.storage()).logout();
    }
    StatusCode::NO_CONTENT
}
