//! Out-of-band alert delivery

use async_trait::async_trait;
use hapsync_core::{Error, NotifierConfig, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers a short text alert to the user
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Telegram bot `sendMessage` notifier
pub struct TelegramNotifier {
    /// ⚠️ Contains the bot token, NEVER log this value
    url: String,
    chat_id: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("url", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl TelegramNotifier {
    pub fn new(url: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            chat_id: chat_id.into(),
            client,
        })
    }

    /// Build the notifier described by the configuration
    pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
        config.validate()?;
        match config {
            NotifierConfig::Telegram { url, chat_id } => {
                Ok(Arc::new(Self::new(url.clone(), chat_id.clone())?))
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| Error::transport(format!("Telegram request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(format!("Telegram answered {}", status)));
        }

        debug!("Alert delivered to chat {}", self.chat_id);
        Ok(())
    }
}

/// Deliver an alert in the background; failures are only logged
pub(crate) fn spawn_alert(notifier: Arc<dyn Notifier>, text: &'static str) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = notifier.notify(text).await {
                    warn!("Failed to deliver alert: {}", e);
                }
            });
        }
        Err(_) => warn!("No async runtime available, alert dropped"),
    }
}
