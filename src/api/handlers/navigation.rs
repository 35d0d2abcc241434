//! Route guard decisions for the browser.
//!
//! The frontend asks before rendering a view; the answer depends on the session
//! and pending registration held in the caller's browser context.

use axum::{
    Json,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use super::auth::AuthState;
use crate::identity::{RegistrationCache, Route, RouteDecision, View, guard};

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NavigationQuery {
    /// Browser path to resolve, defaults to `/`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Render,
    Redirect,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct NavigationResponse {
    pub route: Route,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/navigation",
    responses(
        (status = 200, description = "Render or redirect decision", body = NavigationResponse)
    ),
    tag = "navigation"
)]
pub async fn navigate(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Query(query): Query<NavigationQuery>,
) -> impl IntoResponse {
    let route = Route::from_path(query.path.as_deref().unwrap_or("/"));

    let (user, has_pending) = match auth_state.contexts().find(&headers).await {
        Some(context) => {
            let user = auth_state
                .sessions(context.storage())
                .current()
                .map(|(user, _)| user);
            let has_pending = RegistrationCache::new(context.storage()).has_pending();
            (user, has_pending)
        }
        None => (None, false),
    };

    let body = match guard(route, user.as_ref(), has_pending) {
        RouteDecision::Render(view) => NavigationResponse {
            route,
            decision: Decision::Render,
            view: Some(view),
            redirect: None,
        },
        RouteDecision::Redirect(target) => {
            debug!(from = route.path(), to = target.path(), "navigation redirected");
            NavigationResponse {
                route,
                decision: Decision::Redirect,
                view: None,
                redirect: Some(target.path().to_string()),
            }
        }
    };
    (StatusCode::OK, Json(body))
}
