//! Operator notifications
//!
//! Telegram alerts for conditions an operator should see promptly, such
//! as an infeasible allocation. Strictly fire-and-forget: delivery
//! failures are logged and dropped.

use std::time::Duration;

use serde_json::json;
use tracing::warn;

use crate::config::TelegramSettings;

pub struct Notifier {
    http: reqwest::Client,
    telegram: Option<TelegramSettings>,
}

impl Notifier {
    pub fn new(telegram: Option<TelegramSettings>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { http, telegram }
    }

    /// A notifier that swallows everything
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub async fn alert(&self, text: &str) {
        let Some(telegram) = &self.telegram else {
            return;
        };
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            telegram.bot_token
        );
        let result = self
            .http
            .post(&url)
            .json(&json!({ "chat_id": telegram.chat_id, "text": text }))
            .send()
            .await;
        match result {
            Ok(resp) if !resp.status().is_success() => {
                warn!("telegram alert rejected: http {}", resp.status());
            }
            Err(e) => warn!("telegram alert failed: {e}"),
            _ => {}
        }
    }
}
