use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::panel::{ClientSpec, VpnPanel},
    domain::entities::{
        payment_method::PaymentMethod, plan_type::PlanType,
        subscription_state::SubscriptionState,
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait SubscriptionRepoTrait: Send + Sync {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<SubscriptionProfile>>;

    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<SubscriptionProfile>>;

    /// Non-revoked subscriptions with `expiry_date <= horizon`.
    async fn list_due_for_expiry(
        &self,
        horizon: DateTime<Utc>,
    ) -> AppResult<Vec<SubscriptionProfile>>;

    /// Subscriptions in `pending_provision` that have not expired at `now`.
    async fn list_pending_provision(&self, now: DateTime<Utc>)
    -> AppResult<Vec<SubscriptionProfile>>;

    /// Flip `notified` to true if it is still false and the expiry has not
    /// moved since it was read. Returns whether this caller won the claim.
    async fn claim_warning(&self, id: i64, expiry_date: DateTime<Utc>) -> AppResult<bool>;

    /// Record a revocation if the row still carries `expiry_date`. A renewal
    /// committed in between makes this a no-op returning false.
    async fn mark_revoked(
        &self,
        id: i64,
        expiry_date: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// `pending_provision -> active` if the expiry the panel was given is
    /// still the stored one.
    async fn mark_provisioned(
        &self,
        id: i64,
        expiry_date: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Forget that the panel ever held this client so the next provisioning
    /// pass creates it again.
    async fn reset_provisioning(&self, id: i64) -> AppResult<()>;

    /// Pin the panel inbound unless one is already stored. Returns the
    /// inbound the row ends up with.
    async fn assign_inbound(&self, id: i64, inbound_id: i64) -> AppResult<i64>;
}

// ============================================================================
// Profile Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct SubscriptionProfile {
    pub id: i64,
    pub user_id: i64,
    /// Panel client email, also the subscription id in the link.
    pub email: String,
    pub client_id: Uuid,
    /// Chosen on first provisioning when no inbound is configured. `None`
    /// means the panel has never been asked to create this client.
    pub inbound_id: Option<i64>,
    pub plan_type: PlanType,
    pub payment_method: PaymentMethod,
    pub expiry_date: DateTime<Utc>,
    pub notified: bool,
    pub state: SubscriptionState,
    pub provisioned_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionProfile {
    /// Remote state the panel should hold for this row.
    pub fn client_spec(&self) -> ClientSpec {
        ClientSpec::new(self.client_id, self.email.clone(), self.expiry_date)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_date
    }
}

// ============================================================================
// Use Cases
// ============================================================================

/// Read side used by the chat front-end.
pub struct SubscriptionUseCases {
    repo: Arc<dyn SubscriptionRepoTrait>,
    panel: Arc<dyn VpnPanel>,
}

impl SubscriptionUseCases {
    pub fn new(repo: Arc<dyn SubscriptionRepoTrait>, panel: Arc<dyn VpnPanel>) -> Self {
        Self { repo, panel }
    }

    pub async fn list_for_user(&self, user_id: i64) -> AppResult<Vec<SubscriptionProfile>> {
        self.repo.list_by_user(user_id).await
    }

    /// Link the VPN client imports. Only owned, non-revoked subscriptions have
    /// one; another user's subscription is reported as not found.
    #[instrument(skip(self))]
    pub async fn subscription_link(&self, user_id: i64, subscription_id: i64) -> AppResult<Url> {
        let subscription = self
            .repo
            .get_by_id(subscription_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(AppError::NotFound)?;

        if !subscription.state.is_live() {
            return Err(AppError::InvalidInput(
                "subscription has been revoked".into(),
            ));
        }

        self.panel.build_subscription_link(&subscription.email)
    }
}
