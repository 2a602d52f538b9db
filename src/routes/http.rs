// GET handlers shared by both services: health, version

use axum::response::IntoResponse;

use crate::version::{NAME, VERSION};

/// GET /health: liveness only.
pub(super) async fn health_handler() -> &'static str {
    "OK"
}

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}
