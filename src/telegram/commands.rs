//! 聊天命令处理

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::client::TelegramClient;
use super::markdown::{bold, code, escape_markdown_v2, italic, link};
use super::types::{Message, ParseMode};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::{KnowledgeStats, SourceLink};
use crate::observability::AppMetrics;
use crate::services::KnowledgeBase;
use crate::services::knowledge_base::update_target;

/// Longest text the Bot API accepts in one message
const TELEGRAM_MAX_LEN: usize = 4096;

const READY: &str = "✅ Ready.";
const UNAVAILABLE: &str = "❌ Service unavailable.";
const ASK_UNAVAILABLE: &str = "The service is temporarily unavailable. Please try again later.";
const UPDATE_UNAVAILABLE: &str = "The service is unavailable. Cannot run an update.";
const INVALID_URL: &str = "Invalid URL. Make sure it starts with http:// or https://";
const THINKING: &str = "Thinking... 🧠";
const UNEXPECTED_ERROR: &str = "An unexpected error occurred. Please try again later.";
const INTERNAL_ERROR: &str = "Internal error. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Ping,
    Stats,
    Update {
        url: Option<String>,
        max_links: Option<usize>,
    },
    /// Free text, unknown commands and commands meant for another bot
    Question(String),
}

impl Command {
    /// Parse a message text. Returns `None` for blank messages.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let question = || Some(Command::Question(text.to_string()));
        let Some(stripped) = text.strip_prefix('/') else {
            return question();
        };

        let (head, args) = match stripped.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (stripped, ""),
        };
        let name = match head.split_once('@') {
            Some((name, target)) => match bot_username {
                Some(me) if target.eq_ignore_ascii_case(me) => name,
                _ => return question(),
            },
            None => head,
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "ping" => Command::Ping,
            "stats" => Command::Stats,
            "update" => {
                let (url, rest) = match args.split_once(char::is_whitespace) {
                    Some((url, rest)) => (url, rest.trim()),
                    None => (args, ""),
                };
                let max_links = if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                    rest.parse().ok()
                } else {
                    None
                };
                Command::Update {
                    url: (!url.is_empty()).then(|| url.to_string()),
                    max_links,
                }
            }
            _ => return question(),
        };
        Some(command)
    }
}

pub fn start_text(default_site: &str) -> String {
    format!(
        "Hello! I am an AI assistant for product research.\n\n\
         Ask a question and I will find the answer in the knowledge base ({} and others) \
         and reply with a structured answer.\n\n\
         Commands: /help",
        default_site
    )
}

pub fn help_text(default_site: &str) -> String {
    let line = |command: &str, description: &str| {
        format!("{}: {}\n", code(command), escape_markdown_v2(description))
    };
    format!(
        "{}\n{}{}{}{}{}\n{} {}\n{}",
        bold("Commands:"),
        line("/start", "greeting"),
        line("/help", "this help"),
        line("/update <url> [max]", "update the knowledge base"),
        line("/stats", "knowledge base statistics"),
        line("/ping", "availability check"),
        escape_markdown_v2("Default source:"),
        italic(default_site),
        escape_markdown_v2("Just ask a question and I will look for the answer in the knowledge base."),
    )
}

pub fn stats_text(stats: &KnowledgeStats) -> String {
    format!(
        "{}\n• Documents: {}\n• Chunks: {}\n• Last update: {}",
        bold("Knowledge base statistics:"),
        code(&stats.documents.to_string()),
        code(&stats.chunks.to_string()),
        italic(&stats.last_updated)
    )
}

pub fn sources_footer(sources: &[SourceLink]) -> String {
    let lines: Vec<String> = sources
        .iter()
        .map(|s| format!("• {}", link(&s.title, &s.url)))
        .collect();
    format!("\n\n{}\n{}", bold("Sources:"), lines.join("\n"))
}

/// MarkdownV2 when the escaped text still fits a message, plain text otherwise.
fn render(text: &str) -> (String, Option<ParseMode>) {
    let escaped = escape_markdown_v2(text);
    if escaped.chars().count() <= TELEGRAM_MAX_LEN {
        (escaped, Some(ParseMode::MarkdownV2))
    } else {
        (text.to_string(), None)
    }
}

/// Runs chat commands against the knowledge base.
pub struct CommandHandler {
    client: TelegramClient,
    knowledge_base: Option<Arc<KnowledgeBase>>,
    metrics: Arc<AppMetrics>,
    default_site: String,
    default_max_links: usize,
    show_sources: bool,
}

impl CommandHandler {
    pub fn new(
        client: TelegramClient,
        knowledge_base: Option<Arc<KnowledgeBase>>,
        metrics: Arc<AppMetrics>,
        config: &AppConfig,
    ) -> Self {
        Self {
            client,
            knowledge_base,
            metrics,
            default_site: config.crawler.default_site.clone(),
            default_max_links: config.crawler.default_update_max_links,
            show_sources: config.telegram.show_sources,
        }
    }

    /// Handle one incoming message. Failures to reply are logged.
    pub async fn handle(&self, message: Message, bot_username: Option<&str>) {
        let Some(command) = message
            .text
            .as_deref()
            .and_then(|text| Command::parse(text, bot_username))
        else {
            return;
        };

        let chat_id = message.chat.id;
        if let Err(e) = self.dispatch(chat_id, command).await {
            warn!("Failed to reply in chat {}: {}", chat_id, e);
        }
    }

    async fn dispatch(&self, chat_id: i64, command: Command) -> Result<()> {
        match command {
            Command::Start => self.reply(chat_id, &start_text(&self.default_site)).await,
            Command::Help => {
                self.reply_markdown(chat_id, &help_text(&self.default_site))
                    .await
            }
            Command::Ping => {
                let text = if self.knowledge_base.is_some() {
                    READY
                } else {
                    UNAVAILABLE
                };
                self.reply(chat_id, text).await
            }
            Command::Stats => match &self.knowledge_base {
                Some(kb) => self.reply_markdown(chat_id, &stats_text(&kb.stats())).await,
                None => self.reply(chat_id, UNAVAILABLE).await,
            },
            Command::Update { url, max_links } => {
                self.update(chat_id, url.as_deref(), max_links).await
            }
            Command::Question(question) => self.answer(chat_id, &question).await,
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        self.client.send_message(chat_id, text, None).await?;
        Ok(())
    }

    async fn reply_markdown(&self, chat_id: i64, text: &str) -> Result<()> {
        self.client
            .send_message(chat_id, text, Some(ParseMode::MarkdownV2))
            .await?;
        Ok(())
    }

    async fn update(&self, chat_id: i64, url: Option<&str>, max_links: Option<usize>) -> Result<()> {
        let Some(kb) = &self.knowledge_base else {
            return self.reply(chat_id, UPDATE_UNAVAILABLE).await;
        };
        let (url, max_links) =
            match update_target(url, max_links, &self.default_site, self.default_max_links) {
                Ok(target) => target,
                Err(_) => return self.reply(chat_id, INVALID_URL).await,
            };

        let placeholder = self
            .client
            .send_message(
                chat_id,
                &format!(
                    "Starting the knowledge base update from {}... This may take a few minutes. 🚀",
                    url
                ),
                None,
            )
            .await?;

        info!("Update of {} requested from chat {}", url, chat_id);
        let result = kb.update(&url, max_links).await;
        if !matches!(result, Err(AppError::UpdateInProgress)) {
            self.metrics.record_update(result.is_ok(), kb.stats().chunks);
        }
        let text = match result {
            Ok(report) => report.to_string(),
            Err(e) if e.is_user_facing() => {
                warn!("Update of {} rejected: {}", url, e);
                format!("Error: {}", e)
            }
            Err(e) => {
                error!("Update of {} failed: {}", url, e);
                UNEXPECTED_ERROR.to_string()
            }
        };

        self.client
            .edit_message_text(chat_id, placeholder.message_id, &text, None)
            .await
    }

    async fn answer(&self, chat_id: i64, question: &str) -> Result<()> {
        let Some(kb) = &self.knowledge_base else {
            return self.reply(chat_id, ASK_UNAVAILABLE).await;
        };

        let placeholder = self.client.send_message(chat_id, THINKING, None).await?;
        let started = Instant::now();
        let result = kb.ask(question).await;
        self.metrics
            .record_question(started.elapsed().as_secs_f64(), result.is_ok());

        let answer = match result {
            Ok(answer) => answer,
            Err(e) => {
                let text = if e.is_user_facing() {
                    e.to_string()
                } else {
                    error!("Failed to answer in chat {}: {}", chat_id, e);
                    INTERNAL_ERROR.to_string()
                };
                return self
                    .client
                    .edit_message_text(chat_id, placeholder.message_id, &text, None)
                    .await;
            }
        };

        let mut parts: Vec<(String, Option<ParseMode>)> =
            answer.messages.iter().map(|m| render(m)).collect();
        if self.show_sources && !answer.sources.is_empty() {
            let footer = sources_footer(&answer.sources);
            let fits = matches!(
                parts.last(),
                Some((last, Some(ParseMode::MarkdownV2)))
                    if last.chars().count() + footer.chars().count() <= TELEGRAM_MAX_LEN
            );
            if let (true, Some((last, _))) = (fits, parts.last_mut()) {
                last.push_str(&footer);
            } else {
                parts.push((footer.trim_start().to_string(), Some(ParseMode::MarkdownV2)));
            }
        }

        let mut parts = parts.into_iter();
        if let Some((first, mode)) = parts.next() {
            self.client
                .edit_message_text(chat_id, placeholder.message_id, &first, mode)
                .await?;
        }
        for (part, mode) in parts {
            self.client.send_message(chat_id, &part, mode).await?;
        }
        Ok(())
    }
}
