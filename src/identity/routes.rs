//! Route guards for the marketplace views.
//!
//! Guards are pure: the caller passes the current session user and whether a
//! registration is pending.

use serde::Serialize;
use utoipa::ToSchema;

use super::model::{Role, SessionUser};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Home,
    Login,
    Signup,
    Verify,
    Dashboard,
    RequestService,
    NotFound,
}

impl Route {
    /// Map a browser path to a route. `/dashboard/...` sub-paths belong to the dashboard.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Self::Home,
            "/login" => Self::Login,
            "/signup" => Self::Signup,
            "/verify" => Self::Verify,
            "/dashboard" => Self::Dashboard,
            "/request-service" => Self::RequestService,
            other if other.starts_with("/dashboard/") => Self::Dashboard,
            _ => Self::NotFound,
        }
    }

    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Login => "/login",
            Self::Signup => "/signup",
            Self::Verify => "/verify",
            Self::Dashboard => "/dashboard",
            Self::RequestService => "/request-service",
            Self::NotFound => "/404",
        }
    }
}

/// The view rendered when a guard lets the request through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Home,
    Login,
    Signup,
    Verify,
    ClientDashboard,
    ProviderDashboard,
    RequestService,
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    Render(View),
    Redirect(Route),
}

#[must_use]
pub fn guard(route: Route, user: Option<&SessionUser>, has_pending: bool) -> RouteDecision {
    use RouteDecision::{Redirect, Render};

    match (route, user) {
        (Route::Home, _) => Render(View::Home),
        (Route::Login | Route::Signup, Some(_)) => Redirect(Route::Dashboard),
        (Route::Login, None) => Render(View::Login),
        (Route::Signup, None) => Render(View::Signup),
        (Route::Verify, _) if !has_pending => Redirect(Route::Signup),
        (Route::Verify, _) => Render(View::Verify),
        (Route::Dashboard | Route::RequestService, None) => Redirect(Route::Login),
        (Route::Dashboard, Some(user)) => match user.role {
            Role::Client => Render(View::ClientDashboard),
            Role::Provider => Render(View::ProviderDashboard),
        },
        (Route::RequestService, Some(user)) => match user.role {
            Role::Client => Render(View::RequestService),
            Role::Provider => Redirect(Route::Dashboard),
        },
        (Route::NotFound, _) => Render(View::NotFound),
    }
}
