// GET /counters: CSV snapshot with 304 while the cache is still fresh

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::SourceState;
use crate::snapshot::SnapshotStatus;

const CSV_CONTENT_TYPE: &str = "text/csv";

pub(super) async fn counters_handler(State(state): State<SourceState>) -> Response {
    let cache = state.cache.clone();
    // Regeneration is CPU-bound and takes a std lock; keep it off the async workers.
    let result = match tokio::task::spawn_blocking(move || cache.get_snapshot()).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "snapshot task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "snapshot task failed").into_response();
        }
    };

    match result {
        Ok(snapshot) => match snapshot.status {
            SnapshotStatus::Fresh => {
                ([(header::CONTENT_TYPE, CSV_CONTENT_TYPE)], snapshot.body).into_response()
            }
            SnapshotStatus::NotModified => (
                StatusCode::NOT_MODIFIED,
                [(header::CONTENT_TYPE, CSV_CONTENT_TYPE)],
            )
                .into_response(),
        },
        Err(e) => {
            tracing::error!(error = %e, "Error generating CSV metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error generating CSV metrics: {e}"),
            )
                .into_response()
        }
    }
}
