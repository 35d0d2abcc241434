use crate::identity::{
    HttpPasscodeIssuer, LocalPasscodeIssuer, LogEmailSender, PasscodeIssuer, RetryPolicy,
    SystemClock,
    rate_limit::NoopRateLimiter,
    store::{PgIdentityStore, PgPasscodeStore, postgres::apply_schema},
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
    routing::{get, options},
};
use secrecy::SecretString;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use handlers::auth::{AuthBackends, AuthConfig, AuthState};
pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Where passcodes come from.
#[derive(Debug, Clone)]
pub struct IssuerOptions {
    /// Base URL of a remote issuer exposing `sendOtp`/`verifyOtp`; `None` issues codes in-process.
    pub url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
}

/// Assemble the HTTP application around an auth state and database pool.
///
/// # Errors
/// Returns an error if the frontend base URL cannot be turned into a CORS origin.
pub fn app(auth_state: Arc<AuthState>, pool: PgPool) -> Result<Router> {
    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    // Non-doc routes (`/openapi.json` and preflight-only `OPTIONS /health`) are added here.
    let (router, openapi) = router().split_for_parts();
    let openapi = Arc::new(openapi);
    let app = router
        .route(
            "/openapi.json",
            get(move || {
                let openapi = openapi.clone();
                async move { axum::Json(openapi.as_ref().clone()) }
            }),
        )
        .route("/health", options(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(pool)),
        );

    Ok(app)
}

/// Start the server
/// # Errors
/// Return error if the database is unreachable, the issuer is misconfigured or the listener fails
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: AuthConfig,
    issuer_options: IssuerOptions,
    retry: RetryPolicy,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    apply_schema(&pool)
        .await
        .context("Failed to apply database schema")?;

    let clock = Arc::new(SystemClock);
    let identities = Arc::new(PgIdentityStore::new(pool.clone(), clock.clone()));
    let passcodes = Arc::new(PgPasscodeStore::new(pool.clone()));

    let issuer: Arc<dyn PasscodeIssuer> = match &issuer_options.url {
        Some(url) => {
            info!("Using remote passcode issuer");
            Arc::new(HttpPasscodeIssuer::new(
                url,
                issuer_options.api_key.clone(),
                issuer_options.timeout,
            )?)
        }
        None => {
            info!("Using in-process passcode issuer");
            Arc::new(LocalPasscodeIssuer::new(
                Arc::new(LogEmailSender),
                identities.clone(),
                passcodes.clone(),
                clock.clone(),
            ))
        }
    };

    let auth_state = Arc::new(AuthState::new(
        auth_config,
        AuthBackends {
            identities,
            passcodes,
            issuer,
        },
        clock,
        retry,
        Arc::new(NoopRateLimiter),
    ));

    let app = app(auth_state, pool)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
