use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::app_error::AppResult;

// ============================================================================
// Port Types - panel-agnostic
// ============================================================================

/// Session credential issued by the panel on login.
///
/// Debug output is redacted; the raw value only leaves through `expose`.
#[derive(Clone)]
pub struct SessionToken(Arc<str>);

impl SessionToken {
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// An access point on the panel that client credentials attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    pub id: i64,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub enable: bool,
}

/// Desired remote state of one client credential.
///
/// The client id is generated locally and persisted before the panel is
/// called, so creation and removal can be retried safely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSpec {
    pub client_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl ClientSpec {
    pub fn new(client_id: Uuid, email: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            client_id,
            email: email.into(),
            expires_at,
        }
    }

    /// Credential valid for `duration_days` starting at `now`.
    pub fn for_duration(
        client_id: Uuid,
        email: impl Into<String>,
        duration_days: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(client_id, email, now + Duration::days(duration_days))
    }
}

/// What the panel confirmed after creating a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandle {
    pub client_id: Uuid,
    pub email: String,
    pub inbound_id: i64,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Port Trait
// ============================================================================

/// Authenticated access to the VPN panel.
///
/// Implementations own their session and inbound cache and apply the retry
/// policy to every call; callers only see the final outcome.
#[async_trait]
pub trait VpnPanel: Send + Sync {
    /// Force a fresh login and return the new session.
    async fn login(&self) -> AppResult<SessionToken>;

    async fn list_inbounds(&self, use_cache: bool) -> AppResult<Vec<Inbound>>;

    /// Create the client. A client that already exists with this email counts
    /// as created.
    async fn create_client(&self, inbound_id: i64, client: &ClientSpec) -> AppResult<ClientHandle>;

    /// Move an existing client's expiry. A missing client is an
    /// `InvariantViolation`.
    async fn update_client_expiry(&self, inbound_id: i64, client: &ClientSpec) -> AppResult<()>;

    /// Delete the client. Deleting an absent client succeeds.
    async fn remove_client(&self, inbound_id: i64, client_id: Uuid) -> AppResult<()>;

    fn build_subscription_link(&self, email: &str) -> AppResult<Url>;
}
