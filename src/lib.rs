//! Ragram - 网站内容检索增强问答
//!
//! 通过 sitemap 爬取站点，将页面文本同时写入稠密向量索引和 BM25 索引，
//! 并基于最匹配的文本块由语言模型生成回答。回答通过 Telegram 机器人和
//! 小型 HTTP API 提供。

pub mod api;
pub mod config;
pub mod crawler;
pub mod error;
pub mod index;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod telegram;
