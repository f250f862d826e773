use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Delivers HTML-formatted messages through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: Option<String>,
    chat_ids: Vec<String>,
}

impl TelegramNotifier {
    pub fn new(token: Option<String>, chat_ids: Vec<String>) -> Self {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_url: TELEGRAM_API_URL.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            chat_ids,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    pub fn chat_ids(&self) -> &[String] {
        &self.chat_ids
    }

    /// Send one message. Returns false without a request when no token is set.
    pub async fn notify(&self, chat_id: &str, text: &str) -> bool {
        let token = match &self.token {
            Some(token) => token,
            None => {
                warn!("Telegram bot token not configured; message not sent");
                return false;
            }
        };

        let url = format!("{}/bot{}/sendMessage", self.api_url, token);
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
        };

        match self.client.post(&url).form(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                warn!("Telegram rejected message to {}: {} {}", chat_id, status, detail);
                false
            }
            Err(e) => {
                warn!("Telegram request to {} failed: {}", chat_id, e);
                false
            }
        }
    }

    /// Send to every configured chat. Empty when no token is set.
    pub async fn notify_all(&self, text: &str) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        if !self.is_configured() {
            warn!("Telegram bot token not configured; broadcast skipped");
            return results;
        }

        for chat_id in &self.chat_ids {
            let ok = self.notify(chat_id, text).await;
            results.insert(chat_id.clone(), ok);
        }

        let delivered = results.values().filter(|ok| **ok).count();
        info!("Telegram broadcast: {}/{} delivered", delivered, results.len());
        results
    }
}
