use std::time::Duration;

use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::adapters::cryptobot::CryptoBotNetwork;
use crate::infra::{error::InfraError, retry::RetryPolicy};

pub struct AppConfig {
    pub database_url: String,
    pub database_pool_size: u32,

    pub xui_base_url: Url,
    pub xui_username: String,
    pub xui_password: SecretString,
    /// Verify the panel's TLS certificate. Disable only for self-signed panels.
    pub xui_ssl_verify: bool,
    pub xui_timeout: Duration,
    pub xui_retry_attempts: u32,
    pub xui_inbound_cache_ttl: Duration,
    /// Inbound new clients are attached to. When unset the first enabled
    /// inbound reported by the panel is used.
    pub xui_inbound_id: Option<i64>,
    /// Host serving subscription links (`https://<domain>/sub/<id>`).
    pub subscription_domain: String,

    pub cryptobot_token: SecretString,
    pub cryptobot_network: CryptoBotNetwork,

    /// Telegram bot token used for user notifications.
    pub bot_token: SecretString,

    pub expiry_sweep_interval: Duration,
    pub payment_poll_interval: Duration,
    pub expiry_warning_window: chrono::Duration,
    pub invoice_abandon_after: chrono::Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,

    pub log_file: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url: String = get_env("DATABASE_URL");
        let database_pool_size: u32 = get_env_default("DATABASE_POOL_SIZE", 20);

        let xui_base_url: Url = get_env("XUI_BASE_URL");
        let xui_username: String = get_env("XUI_USERNAME");
        let xui_password = SecretString::new(get_env::<String>("XUI_PASSWORD").into());
        let xui_ssl_verify: bool = get_env_default("XUI_SSL_VERIFY", true);
        let xui_timeout_secs: u64 = get_env_default("XUI_TIMEOUT", 15);
        let xui_retry_attempts: u32 = get_env_default("XUI_RETRY_ATTEMPTS", 3);
        let xui_inbound_cache_ttl_secs: u64 = get_env_default("XUI_INBOUND_CACHE_TTL", 60);
        let xui_inbound_id: Option<i64> = std::env::var("XUI_INBOUND_ID")
            .ok()
            .and_then(|s| s.trim().parse().ok());
        let subscription_domain: String = get_env("SUBSCRIPTION_DOMAIN");

        let cryptobot_token = SecretString::new(get_env::<String>("CRYPTOBOT_TOKEN").into());
        let cryptobot_network: CryptoBotNetwork =
            get_env_default("CRYPTOBOT_NETWORK", CryptoBotNetwork::Mainnet);

        let bot_token = SecretString::new(get_env::<String>("BOT_TOKEN").into());

        let expiry_sweep_secs: u64 = get_env_default("EXPIRY_SWEEP_SECS", 300);
        let payment_poll_secs: u64 = get_env_default("PAYMENT_POLL_SECS", 30);
        let expiry_warning_days: i64 = get_env_default("EXPIRY_WARNING_DAYS", 3);
        let invoice_abandon_hours: i64 = get_env_default("INVOICE_ABANDON_HOURS", 24);
        let retry_base_delay_ms: u64 = get_env_default("RETRY_BASE_DELAY_MS", 500);
        let retry_max_delay_ms: u64 = get_env_default("RETRY_MAX_DELAY_MS", 8_000);

        let log_file: String = get_env_default("LOG_FILE", "logs/reconciler.log".to_string());

        Self {
            database_url,
            database_pool_size,
            xui_base_url,
            xui_username,
            xui_password,
            xui_ssl_verify,
            xui_timeout: Duration::from_secs(xui_timeout_secs),
            xui_retry_attempts,
            xui_inbound_cache_ttl: Duration::from_secs(xui_inbound_cache_ttl_secs),
            xui_inbound_id,
            subscription_domain,
            cryptobot_token,
            cryptobot_network,
            bot_token,
            expiry_sweep_interval: Duration::from_secs(expiry_sweep_secs),
            payment_poll_interval: Duration::from_secs(payment_poll_secs),
            expiry_warning_window: chrono::Duration::days(expiry_warning_days),
            invoice_abandon_after: chrono::Duration::hours(invoice_abandon_hours),
            retry_base_delay: Duration::from_millis(retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(retry_max_delay_ms),
            log_file,
        }
    }

    /// Range checks on values that would otherwise make a loop spin or stall.
    pub fn validate(&self) -> Result<(), InfraError> {
        if !(5..=100).contains(&self.database_pool_size) {
            return Err(invalid("DATABASE_POOL_SIZE", "must be between 5 and 100"));
        }
        if self.xui_retry_attempts == 0 {
            return Err(invalid("XUI_RETRY_ATTEMPTS", "must be at least 1"));
        }
        if self.xui_timeout.is_zero() {
            return Err(invalid("XUI_TIMEOUT", "must be positive"));
        }
        if self.xui_inbound_cache_ttl > Duration::from_secs(86_400) {
            return Err(invalid("XUI_INBOUND_CACHE_TTL", "must not exceed 86400 seconds"));
        }
        if self.expiry_sweep_interval.is_zero() {
            return Err(invalid("EXPIRY_SWEEP_SECS", "must be positive"));
        }
        if self.payment_poll_interval.is_zero() {
            return Err(invalid("PAYMENT_POLL_SECS", "must be positive"));
        }
        if self.expiry_warning_window < chrono::Duration::zero() {
            return Err(invalid("EXPIRY_WARNING_DAYS", "must not be negative"));
        }
        if self.invoice_abandon_after <= chrono::Duration::zero() {
            return Err(invalid("INVOICE_ABANDON_HOURS", "must be positive"));
        }
        if self.subscription_domain.trim().is_empty() {
            return Err(invalid("SUBSCRIPTION_DOMAIN", "must not be empty"));
        }
        Ok(())
    }

    pub fn panel_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.xui_retry_attempts,
            self.retry_base_delay,
            self.retry_max_delay,
        )
    }
}

fn invalid(var: &'static str, reason: &str) -> InfraError {
    InfraError::ConfigInvalid {
        var,
        reason: reason.to_string(),
    }
}
