//! API 模块
//!
//! 基于知识库的 JSON 接口，挂载在 `/api/v1` 下。

pub mod app_state;
pub mod dto;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn create_router(app_state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::ask_routes::create_ask_router())
        .merge(routes::update_routes::create_update_router())
        .merge(routes::stats_routes::create_stats_router());

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
