use std::sync::Arc;

use pagewatch_core::NotificationSettings;
use pagewatch_engine::{SettingsStore, StoreError};

/// Layers command-line or environment values over the stored settings.
/// Each override replaces its field independently.
pub struct OverrideSettings {
    inner: Arc<dyn SettingsStore>,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl OverrideSettings {
    pub fn new(
        inner: Arc<dyn SettingsStore>,
        bot_token: Option<String>,
        chat_id: Option<String>,
    ) -> Self {
        Self {
            inner,
            bot_token: bot_token.filter(|v| !v.trim().is_empty()),
            chat_id: chat_id.filter(|v| !v.trim().is_empty()),
        }
    }
}

#[async_trait::async_trait]
impl SettingsStore for OverrideSettings {
    async fn notification_settings(&self) -> Result<Option<NotificationSettings>, StoreError> {
        let stored = self.inner.notification_settings().await?;
        if self.bot_token.is_none() && self.chat_id.is_none() {
            return Ok(stored);
        }
        let mut settings = stored.unwrap_or_default();
        if let Some(token) = &self.bot_token {
            settings.bot_token = token.clone();
        }
        if let Some(chat_id) = &self.chat_id {
            settings.chat_id = chat_id.clone();
        }
        Ok(Some(settings))
    }
}
