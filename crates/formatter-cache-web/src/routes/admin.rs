//! Admin routes - cache maintenance.

use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use tracing::info;

use crate::state::AppState;

/// Empty every cache tier.
pub fn clear(state: &AppState) -> Response {
    state.service.clear();
    info!("Cache cleared through admin endpoint");
    StatusCode::NO_CONTENT.into_response()
}

/// Entry counts and sizes per tier, in-flight renders and pending derivations.
pub async fn stats(state: &AppState) -> Response {
    Json(state.service.stats().await).into_response()
}
