//! API 路由

pub mod ask_routes;
pub mod stats_routes;
pub mod update_routes;
