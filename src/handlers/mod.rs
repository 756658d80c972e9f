// Handlers module
// HTTP handlers for the blog pages

pub mod auth;
pub mod posts;

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::app::AppState;
use crate::error::{AppError, AppResult};

/// Health check handler
/// Returns "OK" with 200 status while the store answers
pub async fn health_check(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    state.store.health_check().await?;
    Ok((StatusCode::OK, "OK"))
}

/// Fallback for unknown paths, rendered with the custom 404 page
pub async fn not_found() -> AppError {
    AppError::not_found("page")
}
