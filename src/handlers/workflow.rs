use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::workflow::{self, ConfirmOutcome, StartOutcome};
use crate::state::AppState;

// POST /start
#[derive(Deserialize)]
pub struct StartRequest {
    pub user_id: i64,
    pub query: String,
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartRequest>,
) -> Result<Json<StartOutcome>, AppError> {
    let outcome = workflow::start(&state, payload.user_id, &payload.query).await?;
    Ok(Json(outcome))
}

// POST /confirm
#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub user_id: i64,
    pub confirm: bool,
}

pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<Json<ConfirmOutcome>, AppError> {
    let outcome = workflow::confirm(&state, payload.user_id, payload.confirm)?;
    Ok(Json(outcome))
}

// GET /pending/:user_id
pub async fn pending(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let response = match workflow::peek_pending(&state, user_id)? {
        Some(entry) => Json(entry).into_response(),
        None => Json(serde_json::json!({ "status": "no pending request" })).into_response(),
    };
    Ok(response)
}
