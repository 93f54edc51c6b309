use crate::config::TelemetryConfig;
use anyhow::Result;
use std::time::Duration;
use tracing::{error, warn};

/// Pushes operator alerts to Telegram and/or Discord.
pub struct AlertManager {
    config: TelemetryConfig,
    http: reqwest::Client,
}

impl AlertManager {
    pub fn new(config: TelemetryConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    /// True when at least one channel has credentials.
    pub fn is_configured(&self) -> bool {
        (self.config.telegram_bot_token.is_some() && self.config.telegram_chat_id.is_some())
            || self.config.discord_webhook_url.is_some()
    }

    /// Send to every configured channel. Delivery failures are logged, never returned.
    pub async fn send(&self, message: &str) {
        warn!("ALERT: {message}");

        if let Err(e) = self.send_telegram(message).await {
            error!("Telegram alert failed: {e}");
        }
        if let Err(e) = self.send_discord(message).await {
            error!("Discord alert failed: {e}");
        }
    }

    async fn send_telegram(&self, message: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) =
            (&self.config.telegram_bot_token, &self.config.telegram_chat_id)
        else {
            return Ok(());
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": format!("ATHENA: {message}"),
        });
        self.http.post(&url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    async fn send_discord(&self, message: &str) -> Result<()> {
        let Some(webhook_url) = &self.config.discord_webhook_url else {
            return Ok(());
        };

        let body = serde_json::json!({ "content": format!("**ATHENA**: {message}") });
        self.http.post(webhook_url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn on_kill_switch(&self, reason: &str) {
        if self.config.alert_on_kill_switch {
            self.send(&format!("EMERGENCY STOP: {reason}")).await;
        }
    }

    pub async fn on_cycle_error(&self, consecutive: u32) {
        if self.config.alert_on_error {
            self.send(&format!("Cycle failed ({consecutive} consecutive errors)"))
                .await;
        }
    }
}
