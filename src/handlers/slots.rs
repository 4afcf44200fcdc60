use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::SlotView;
use crate::services::scheduling;
use crate::state::AppState;

// GET /slots?date=DD-MM-YYYY&doctor=...
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
    pub doctor: Option<String>,
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SlotsQuery>,
) -> Result<Json<Vec<SlotView>>, AppError> {
    let conn = state.db()?;
    let slots = scheduling::list_slots(&conn, &params.date, params.doctor.as_deref())?;
    Ok(Json(slots))
}
