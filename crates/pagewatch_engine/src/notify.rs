use std::time::Duration;

use pagewatch_core::NotificationSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects messages longer than this.
const MAX_MESSAGE_CHARS: usize = 4_096;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification settings incomplete")]
    InvalidConfiguration,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("channel rejected message with status {status}: {description}")]
    Rejected { status: u16, description: String },
}

/// Delivers a message to the configured chat.
#[async_trait::async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, settings: &NotificationSettings, text: &str) -> Result<(), NotifyError>;
}

/// Sends plain-text messages through the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramTransport {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramTransport {
    pub fn new() -> Result<Self, NotifyError> {
        Self::with_api_base(TELEGRAM_API_BASE)
    }

    /// Points the transport at another API host (a local mock in tests).
    pub fn with_api_base(api_base: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait::async_trait]
impl NotificationTransport for TelegramTransport {
    async fn send(&self, settings: &NotificationSettings, text: &str) -> Result<(), NotifyError> {
        if !settings.is_complete() {
            return Err(NotifyError::InvalidConfiguration);
        }

        let api_url = format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            settings.bot_token.trim()
        );
        let text = crate::classify::truncate_chars(text, MAX_MESSAGE_CHARS);
        let payload = SendMessage {
            chat_id: settings.chat_id.trim(),
            text,
            disable_web_page_preview: true,
        };

        let response = self.client.post(&api_url).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(api) if status.is_success() && api.ok => Ok(()),
            Some(api) => Err(NotifyError::Rejected {
                status: status.as_u16(),
                description: api.description.unwrap_or_else(|| status.to_string()),
            }),
            None if status.is_success() => Ok(()),
            None => Err(NotifyError::Rejected {
                status: status.as_u16(),
                description: body,
            }),
        }
    }
}
