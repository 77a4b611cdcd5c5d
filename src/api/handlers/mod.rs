//! API 请求处理器

pub mod ask_handler;
pub mod stats_handler;
pub mod update_handler;

pub use ask_handler::*;
pub use stats_handler::*;
pub use update_handler::*;
