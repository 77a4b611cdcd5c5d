//! API 请求/响应数据结构

pub mod ask_dto;
pub mod stats_dto;
pub mod update_dto;

pub use ask_dto::*;
pub use stats_dto::*;
pub use update_dto::*;
