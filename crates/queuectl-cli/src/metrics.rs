//! The read-only `GET /metrics` HTTP surface, served over the same
//! `SqlitePool`-backed store the workers use so concurrent requests don't
//! serialize on each other — each request just borrows a pooled
//! connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use queuectl_core::JobState;
use queuectl_store::Store;

type SharedStore = Arc<dyn Store>;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(store)
}

async fn metrics_handler(
    State(store): State<SharedStore>,
) -> Result<Json<BTreeMap<String, i64>>, (axum::http::StatusCode, String)> {
    let counts = store.counts().await.map_err(|e| {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
        )
    })?;

    let mut body = BTreeMap::new();
    for state in JobState::ALL {
        body.insert(state.as_str().to_string(), counts.get(&state).copied().unwrap_or(0));
    }
    Ok(Json(body))
}
