use serde::{Deserialize, Serialize};

/// Local view of a subscription's panel credential.
///
/// `PendingProvision` is the provisioning-pending marker: the row is committed
/// but the panel has not yet confirmed a client matching its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    PendingProvision,
    Active,
    Revoked,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::PendingProvision => "pending_provision",
            SubscriptionState::Active => "active",
            SubscriptionState::Revoked => "revoked",
        }
    }

    /// Revoked rows are history only; everything else may still hold a live
    /// credential on the panel.
    pub fn is_live(&self) -> bool {
        !matches!(self, SubscriptionState::Revoked)
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
