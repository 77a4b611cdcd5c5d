use crate::api::handlers::ask_handler::*;
use axum::{Router, routing::post};

use crate::api::app_state::AppState;

pub fn create_ask_router() -> Router<AppState> {
    Router::new().route("/ask", post(ask))
}
