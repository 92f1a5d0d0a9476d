//! API-key authentication.
//!
//! Keys come from `server.api_keys` and the comma-separated
//! `FASHA_API_KEYS` variable. When neither yields a key, one is generated
//! and persisted under the data directory so restarts keep it.

use std::path::Path;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;

use crate::state::AppState;

/// Header carrying the client key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Environment variable with extra comma-separated keys.
pub const API_KEYS_ENV: &str = "FASHA_API_KEYS";

/// Generate a random 32-character hex key.
pub fn generate_api_key() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

/// Load the key stored at `key_path`, or generate and store a new one.
pub fn load_or_generate_key(key_path: &Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(key_path) {
        let key = contents.trim().to_string();
        if !key.is_empty() {
            tracing::info!(path = %key_path.display(), "API key loaded");
            return key;
        }
    }

    let key = generate_api_key();
    if let Some(parent) = key_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(key_path, &key) {
        Ok(()) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600));
            }
            tracing::info!(path = %key_path.display(), "API key generated and saved");
        }
        Err(e) => {
            tracing::warn!(path = %key_path.display(), error = %e, "Failed to save generated API key");
        }
    }
    key
}

/// Merge configured keys with `env_keys` (comma-separated), falling back
/// to the persisted key at `key_path` when the result is empty.
pub fn resolve_api_keys(configured: &[String], env_keys: Option<&str>, key_path: &Path) -> Vec<String> {
    let mut keys: Vec<String> = configured
        .iter()
        .map(|k| k.trim().to_string())
        .chain(
            env_keys
                .unwrap_or_default()
                .split(',')
                .map(|k| k.trim().to_string()),
        )
        .filter(|k| !k.is_empty())
        .collect();
    keys.sort();
    keys.dedup();

    if keys.is_empty() {
        keys.push(load_or_generate_key(key_path));
    }
    keys
}

/// Middleware rejecting requests without an accepted `X-API-Key`.
pub async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let message = match req.headers().get(API_KEY_HEADER).map(|v| v.to_str()) {
        Some(Ok(key)) if state.accepts_key(key.trim()) => return next.run(req).await,
        Some(Ok(_)) => "Invalid API key",
        Some(Err(_)) => "Invalid X-API-Key header encoding",
        None => "Missing X-API-Key header",
    };

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": message
        })),
    )
        .into_response()
}
