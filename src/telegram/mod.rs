//! Telegram 机器人模块
//!
//! 精简的 Bot API 客户端、MarkdownV2 工具、聊天命令，
//! 以及驱动命令处理的长轮询分发器。

pub mod client;
pub mod commands;
pub mod dispatcher;
pub mod markdown;
pub mod types;

pub use client::TelegramClient;
pub use commands::{Command, CommandHandler};
pub use dispatcher::Dispatcher;
