use crate::api::handlers::update_handler::*;
use axum::{Router, routing::post};

use crate::api::app_state::AppState;

pub fn create_update_router() -> Router<AppState> {
    Router::new().route("/update", post(update))
}
