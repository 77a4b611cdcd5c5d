use crate::api::handlers::stats_handler::*;
use axum::{Router, routing::get};

use crate::api::app_state::AppState;

pub fn create_stats_router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}
