//! Route handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use fasha_chat::{ChatError, DialogueState, ProductCard, SessionSnapshot};
use fasha_core::types::LedgerEntry;

use crate::error::ApiError;
use crate::state::AppState;

const MAX_SESSION_ID_CHARS: usize = 128;
const DEFAULT_ORDER_LIMIT: usize = 20;
const MAX_ORDER_LIMIT: usize = 200;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub state: DialogueState,
    pub products: Vec<ProductCard>,
}

#[derive(Debug, Deserialize)]
pub struct OrdersParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<LedgerEntry>,
    /// Total rows in the ledger.
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub catalog_size: usize,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GreetingResponse {
    pub greeting: String,
}

fn validate_session_id(id: &str) -> Result<&str, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("'session_id' must not be empty".to_string()));
    }
    if id.chars().count() > MAX_SESSION_ID_CHARS {
        return Err(ApiError::BadRequest(format!(
            "'session_id' exceeds {} characters",
            MAX_SESSION_ID_CHARS
        )));
    }
    Ok(id)
}

// =============================================================================
// Chat
// =============================================================================

/// POST /chat - run one dialogue turn.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = validate_session_id(&body.session_id)?;
    let reply = state.engine.handle_turn(session_id, &body.message).await?;
    Ok(Json(ChatResponse {
        reply: reply.text,
        state: reply.state,
        products: reply.products,
    }))
}

/// GET /greeting - welcome text for a new conversation.
pub async fn greeting(State(state): State<AppState>) -> Json<GreetingResponse> {
    Json(GreetingResponse {
        greeting: state.engine.greeting().to_string(),
    })
}

// =============================================================================
// Sessions
// =============================================================================

/// GET /sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let id = validate_session_id(&id)?;
    state
        .engine
        .session_snapshot(id)
        .await
        .map(Json)
        .ok_or_else(|| ChatError::SessionNotFound(id.to_string()).into())
}

/// DELETE /sessions/{id} - start a new chat on the same id.
pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = validate_session_id(&id)?;
    if state.engine.reset_session(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ChatError::SessionNotFound(id.to_string()).into())
    }
}

// =============================================================================
// Orders
// =============================================================================

/// GET /orders?limit= - most recent ledger entries, newest first.
pub async fn orders(
    State(state): State<AppState>,
    Query(params): Query<OrdersParams>,
) -> Result<Json<OrdersResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_ORDER_LIMIT).clamp(1, MAX_ORDER_LIMIT);
    let orders = state.ledger.list_recent(limit).await?;
    let total = state.ledger.count().await?;
    Ok(Json(OrdersResponse { orders, total }))
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - public liveness check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        catalog_size: state.catalog.len(),
        active_sessions: state.engine.active_sessions(),
    })
}
