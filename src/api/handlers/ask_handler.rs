use axum::{Json, extract::State, response::IntoResponse};
use tracing::{debug, error};

use crate::{
    api::{app_state::AppState, dto::ask_dto::*},
    error::AppError,
};

pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Question over HTTP: {}", request.question);

    let kb = state.knowledge_base()?;

    let start_time = std::time::Instant::now();
    let result = kb.ask(&request.question).await;
    let elapsed = start_time.elapsed();

    // Empty questions never reach the model and are not counted.
    if !matches!(result, Err(AppError::Validation(_))) {
        state
            .metrics
            .record_question(elapsed.as_secs_f64(), result.is_ok());
    }

    let answer = result.inspect_err(|e| {
        if !e.is_user_facing() {
            error!("Failed to answer question: {}", e);
        }
    })?;

    Ok(Json(AskResponse {
        messages: answer.messages,
        sources: answer.sources,
        took_ms: elapsed.as_millis() as u64,
    }))
}
