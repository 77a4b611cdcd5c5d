//! 配置管理模块
//!
//! 类型化的应用配置，依次从默认值、可选的 TOML 文件和环境变量加载。

pub mod config;
pub mod loader;

pub use config::AppConfig;
pub use loader::{ConfigLoader, ConfigValidationError};
