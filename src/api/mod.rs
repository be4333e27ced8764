use crate::{
    api::handlers::{health, root},
    auth::{AuthConfig, AuthState, MemorySessionStore, PgSessionStore, SessionStore},
    mail::LogMailSender,
    store::{self, CredentialStore, MemoryCredentialStore, PgCredentialStore, apply_schema},
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, options},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span, warn};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod error;
pub(crate) mod guard;
pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Start the server
///
/// With `dsn` set, users, roles and sessions live in `PostgreSQL`; without it
/// everything is kept in process memory.
///
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: Option<String>, auth_config: AuthConfig) -> Result<()> {
    let (credentials, sessions): (Arc<dyn CredentialStore>, Arc<dyn SessionStore>) = match dsn {
        Some(dsn) => {
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

            (
                Arc::new(PgCredentialStore::new(pool.clone())),
                Arc::new(PgSessionStore::new(pool)),
            )
        }
        None => {
            warn!("No DSN given, using in-memory stores; all data is lost on shutdown");
            (
                Arc::new(MemoryCredentialStore::new()),
                Arc::new(MemorySessionStore::new()),
            )
        }
    };

    store::seed(credentials.as_ref())
        .await
        .context("Failed to seed default roles")?;

    let frontend_origin = frontend_origin(auth_config.frontend_base_url())?;
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        credentials,
        sessions,
        Arc::new(LogMailSender),
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = app(auth_state).layer(cors);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// Full application router: documented routes, the guarded `/home` page and
/// the request-id and tracing layers. CORS is added by [`new`].
pub fn app(auth_state: Arc<AuthState>) -> Router {
    // Build the router from OpenAPI-wired routes, then extend it with non-doc routes like
    // `/home` and preflight-only `OPTIONS /health`.
    let (router, _openapi) = router().split_for_parts();

    let pages = Router::new()
        .route("/home", get(root::home))
        .route_layer(middleware::from_fn(guard::require_identity));

    router
        .route("/health", options(health::health))
        .merge(pages)
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
                .layer(Extension(auth_state)),
        )
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

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
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
