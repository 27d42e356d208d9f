use axum::{extract::State, Json};
use serde::Serialize;

use super::error::AppResult;
use super::state::AppState;
use crate::aqi::AqiReport;

pub const WELCOME_MESSAGE: &str = "Welcome to Space Apps 2025 API";

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: WELCOME_MESSAGE,
    })
}

/// Liveness only; never touches the feeds or the model.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

pub async fn aqi_info(State(state): State<AppState>) -> AppResult<Json<AqiReport>> {
    let report = state.pipeline.run().await?;
    Ok(Json(report))
}
