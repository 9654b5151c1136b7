use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::notifier::Notifier,
    infra::http_client::{is_transient_status, transport_error},
};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org/";

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Delivers notices as Telegram bot messages. One attempt per message; the
/// sweeps never wait on delivery.
pub struct TelegramNotifier {
    http: Client,
    api_base: String,
    bot_token: SecretString,
}

impl TelegramNotifier {
    pub fn new(http: Client, api_base: impl Into<String>, bot_token: SecretString) -> Self {
        let mut api_base = api_base.into();
        if !api_base.ends_with('/') {
            api_base.push('/');
        }
        Self {
            http,
            api_base,
            bot_token,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: i64, message: &str) -> AppResult<()> {
        // The token contains ':' and lives in the path, so no Url::join here.
        let url = format!(
            "{}bot{}/sendMessage",
            self.api_base,
            self.bot_token.expose_secret()
        );

        let response = self
            .http
            .post(url)
            .json(&json!({
                "chat_id": user_id,
                "text": message,
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if is_transient_status(status) {
            return Err(AppError::TransientNetwork(format!("telegram answered {status}")));
        }

        let body: SendMessageResponse = response.json().await.map_err(transport_error)?;
        if !body.ok {
            return Err(AppError::InvalidInput(format!(
                "telegram refused message: {}",
                body.description.unwrap_or_else(|| status.to_string())
            )));
        }

        debug!(user_id, "Notification delivered");
        Ok(())
    }
}
