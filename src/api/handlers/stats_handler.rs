use axum::{Json, extract::State, response::IntoResponse};

use crate::{
    api::{app_state::AppState, dto::stats_dto::StatsResponse},
    error::AppError,
};

pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let kb = state.knowledge_base()?;
    Ok(Json(StatsResponse::from(kb.stats())))
}
