use axum::{Json, body::Bytes, extract::State, response::IntoResponse};
use tracing::{error, info};

use crate::{
    api::{app_state::AppState, dto::update_dto::*},
    error::AppError,
    services::knowledge_base::update_target,
};

/// Crawl a site and add its new or changed pages. An empty body updates the
/// configured default site; a body that is not a valid request is a 400.
pub async fn update(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let kb = state.knowledge_base()?;
    let request = UpdateRequest::from_body(&body)?;

    let crawler = &kb.config().crawler;
    let (site, max_links) = update_target(
        request.url.as_deref(),
        request.max_links,
        &crawler.default_site,
        crawler.default_update_max_links,
    )?;
    info!("Update of {} requested over HTTP (max {} pages)", site, max_links);

    let start_time = std::time::Instant::now();
    let result = kb.update(&site, max_links).await;
    let took_ms = start_time.elapsed().as_millis() as u64;

    if !matches!(result, Err(AppError::UpdateInProgress)) {
        state
            .metrics
            .record_update(result.is_ok(), kb.stats().chunks);
    }

    let report = result.inspect_err(|e| {
        if !e.is_user_facing() {
            error!("Update of {} failed: {}", site, e);
        }
    })?;

    let status = if report.is_empty() { "up_to_date" } else { "updated" };
    Ok(Json(UpdateResponse {
        status: status.to_string(),
        pages: report.pages,
        chunks: report.chunks,
        message: report.to_string(),
        took_ms,
    }))
}
