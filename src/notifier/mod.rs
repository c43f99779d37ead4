//! Delivery of the composed alert through one configured channel.

use crate::config::{NotifierConfig, Provider};
use crate::error::NotifyError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

/// What a successful send looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub provider: &'static str,
    /// Number of posts the text was split into.
    pub parts: usize,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, text: &str) -> Result<Delivery, NotifyError>;
}

/// Pick the channel named by the configuration.
pub fn build_notifier(
    config: &NotifierConfig,
    client: Client,
) -> Result<Box<dyn Notifier>, NotifyError> {
    let notifier: Box<dyn Notifier> = match config.provider {
        Provider::Telegram => Box::new(TelegramNotifier {
            client,
            token: required(&config.telegram_bot_token, "telegram", "bot token")?,
            chat_id: required(&config.telegram_chat_id, "telegram", "chat id")?,
        }),
        Provider::Discord => Box::new(DiscordNotifier {
            client,
            webhook_url: required(&config.discord_webhook_url, "discord", "webhook url")?,
        }),
        Provider::Slack => Box::new(SlackNotifier {
            client,
            webhook_url: required(&config.slack_webhook_url, "slack", "webhook url")?,
        }),
        Provider::Console => Box::new(ConsoleNotifier),
    };
    Ok(notifier)
}

fn required(
    value: &Option<String>,
    provider: &'static str,
    field: &'static str,
) -> Result<String, NotifyError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(NotifyError::MissingCredential { provider, field })
}

/// Split on block boundaries so no chunk exceeds `limit` characters.
/// A single block longer than the limit is cut at character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for block in text.split("\n\n") {
        let needed = if current.is_empty() {
            block.chars().count()
        } else {
            current.chars().count() + 2 + block.chars().count()
        };

        if needed <= limit {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(block);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if block.chars().count() <= limit {
            current.push_str(block);
        } else {
            let chars: Vec<char> = block.chars().collect();
            chunks.extend(chars.chunks(limit).map(|c| c.iter().collect::<String>()));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn post_json(
    client: &Client,
    provider: &'static str,
    url: &str,
    payload: &serde_json::Value,
) -> Result<(), NotifyError> {
    let resp = client.post(url).json(payload).send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(NotifyError::Rejected {
        provider,
        status: status.as_u16(),
        body,
    })
}

// ── Telegram ──────────────────────────────────────────────────────────────────

const TELEGRAM_LIMIT: usize = 4096;

pub struct TelegramNotifier {
    client: Client,
    token: String,
    chat_id: String,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<Delivery, NotifyError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let parts = split_message(text, TELEGRAM_LIMIT);

        for part in &parts {
            let payload = json!({
                "chat_id": self.chat_id,
                "text": part,
                "parse_mode": "Markdown",
                "disable_web_page_preview": true,
            });
            post_json(&self.client, self.name(), &url, &payload).await?;
        }

        debug!("Telegram: {} message(s) sent", parts.len());
        Ok(Delivery { provider: self.name(), parts: parts.len() })
    }
}

// ── Discord ───────────────────────────────────────────────────────────────────

const DISCORD_LIMIT: usize = 2000;

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

/// Discord bolds with `**`; the composer uses single asterisks.
/// Escaped asterisks (`\*`) are content and stay single.
pub fn to_discord_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut escaped = false;
    for c in text.chars() {
        if c == '*' && !escaped {
            out.push_str("**");
        } else {
            out.push(c);
        }
        escaped = c == '\\' && !escaped;
    }
    out
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, text: &str) -> Result<Delivery, NotifyError> {
        let parts = split_message(&to_discord_markdown(text), DISCORD_LIMIT);

        for part in &parts {
            let payload = json!({ "content": part, "username": "IPO Alert" });
            post_json(&self.client, self.name(), &self.webhook_url, &payload).await?;
        }

        debug!("Discord: {} message(s) sent", parts.len());
        Ok(Delivery { provider: self.name(), parts: parts.len() })
    }
}

// ── Slack ─────────────────────────────────────────────────────────────────────

/// Slack mrkdwn has no backslash escapes; drop the ones the composer added.
pub fn unescape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && matches!(chars.peek(), Some('_' | '*' | '`' | '[')) {
            continue;
        }
        out.push(c);
    }
    out
}

pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, text: &str) -> Result<Delivery, NotifyError> {
        let payload = json!({ "text": unescape_markdown(text) });
        post_json(&self.client, self.name(), &self.webhook_url, &payload).await?;
        Ok(Delivery { provider: self.name(), parts: 1 })
    }
}

// ── Console (dry run) ─────────────────────────────────────────────────────────

pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send(&self, text: &str) -> Result<Delivery, NotifyError> {
        info!("Printing alert instead of delivering it");
        println!("{}", text);
        Ok(Delivery { provider: self.name(), parts: 1 })
    }
}
