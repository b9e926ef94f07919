//! Telegram Bot notifier: one-way operator chat via the Bot API.

use async_trait::async_trait;
use nucleo_core::config::TelegramChannelConfig;
use nucleo_core::error::{NucleoError, Result};
use nucleo_core::traits::NotificationClient;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram API response wrapper.
#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

pub struct TelegramNotifier {
    config: TelegramChannelConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramChannelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NucleoError::Channel(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Send a plain-text message to the configured chat.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NucleoError::Timeout(format!("Telegram sendMessage after {}s", REQUEST_TIMEOUT.as_secs()))
                } else {
                    NucleoError::Channel(format!("sendMessage failed: {}", e.without_url()))
                }
            })?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| NucleoError::Channel(format!("Invalid send response: {}", e.without_url())))?;

        check_response(result)
    }
}

fn check_response<T>(response: TelegramApiResponse<T>) -> Result<()> {
    if !response.ok {
        return Err(NucleoError::Channel(format!(
            "Telegram API error: {}",
            response.description.unwrap_or_default()
        )));
    }
    Ok(())
}

#[async_trait]
impl NotificationClient for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_notification(&self, text: &str) -> Result<()> {
        self.send_message(text).await?;
        tracing::debug!("💬 Telegram notification sent ({} chars)", text.chars().count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> TelegramNotifier {
        TelegramNotifier::new(TelegramChannelConfig {
            bot_token: "123:abc".into(),
            chat_id: "-100200".into(),
            api_base: "https://api.telegram.org/".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_api_url() {
        assert_eq!(
            notifier().api_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_api_error_maps_to_channel_error() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;
        let response: TelegramApiResponse<serde_json::Value> = serde_json::from_str(body).unwrap();
        let err = check_response(response).unwrap_err();
        assert!(matches!(err, NucleoError::Channel(ref m) if m.contains("chat not found")));
        assert!(err.is_transient());

        let ok: TelegramApiResponse<serde_json::Value> =
            serde_json::from_str(r#"{"ok":true,"result":{"message_id":5}}"#).unwrap();
        assert!(check_response(ok).is_ok());
    }
}
