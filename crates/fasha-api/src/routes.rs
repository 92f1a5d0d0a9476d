//! Router setup and server start.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use fasha_core::config::ServerConfig;
use fasha_core::error::FashaError;

use crate::auth::{self, API_KEY_HEADER};
use crate::handlers;
use crate::rate_limit::{self, RateLimiter};
use crate::state::AppState;

/// Build the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    let public_routes = Router::new().route("/health", get(handlers::health));

    // Only the chat turn reaches the model, so only it is rate limited.
    let limiter = RateLimiter::new(state.rate_limit_per_sec);
    let chat_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .layer(axum::middleware::from_fn(rate_limit::rate_limit_middleware))
        .layer(axum::Extension(limiter));

    let protected_routes = chat_routes
        .route("/greeting", get(handlers::greeting))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::reset_session),
        )
        .route("/orders", get(handlers::orders))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `config.bind:port` and serve until the process exits.
pub async fn start_server(config: &ServerConfig, port: u16, state: AppState) -> Result<(), FashaError> {
    let addr = format!("{}:{}", config.bind, port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FashaError::Api(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| FashaError::Api(format!("Server error: {}", e)))
}
