use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        messages,
        ports::{
            notifier::{Notifier, dispatch},
            panel::VpnPanel,
        },
        use_cases::subscription::{SubscriptionProfile, SubscriptionRepoTrait},
    },
    domain::entities::{
        idempotency_key::IdempotencyKey,
        payment_method::{LedgerEntryType, PaymentMethod},
        plan_type::PlanType,
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait LedgerRepoTrait: Send + Sync {
    /// Apply one credit atomically.
    ///
    /// In a single transaction: lock the source invoice (if any) and require
    /// it to be `active`, extend the renewal target or create a new
    /// subscription in `pending_provision`, insert the ledger entry keyed by
    /// `request.idempotency_key`, and flip the invoice to `paid`. If the key
    /// already exists nothing is written and `AppError::DuplicateCredit` is
    /// returned.
    async fn apply_credit(&self, request: &CreditRequest) -> AppResult<CreditOutcome>;
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct LedgerEntryProfile {
    pub id: Uuid,
    pub user_id: i64,
    pub amount_cents: i64,
    pub entry_type: LedgerEntryType,
    pub payment_method: PaymentMethod,
    pub idempotency_key: IdempotencyKey,
    pub subscription_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Value to credit, before a panel identity has been chosen.
#[derive(Debug, Clone)]
pub struct CreditGrant {
    pub user_id: i64,
    pub days: i32,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub idempotency_key: IdempotencyKey,
    /// Invoice flipped to `paid` in the same transaction.
    pub invoice_id: Option<i64>,
    /// Subscription to extend. Ignored when it is revoked or not the user's.
    pub renew_subscription_id: Option<i64>,
}

/// Panel identity of a subscription that does not exist yet.
///
/// Chosen before the transaction so a retried provisioning call addresses the
/// same remote client. The inbound is only known up front when configured;
/// otherwise provisioning picks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClientIdentity {
    pub client_id: Uuid,
    pub email: String,
    pub inbound_id: Option<i64>,
}

impl NewClientIdentity {
    pub fn generate(user_id: i64, inbound_id: Option<i64>) -> Self {
        let client_id = Uuid::new_v4();
        let suffix = client_id.simple().to_string();
        Self {
            email: format!("{}-{}", user_id, &suffix[..8]),
            client_id,
            inbound_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreditRequest {
    pub grant: CreditGrant,
    pub identity: NewClientIdentity,
    pub plan_type: PlanType,
    pub now: DateTime<Utc>,
}

impl CreditRequest {
    pub fn entry_type(&self, renewed: bool) -> LedgerEntryType {
        if renewed {
            LedgerEntryType::Renewal
        } else if self.grant.payment_method == PaymentMethod::Free {
            LedgerEntryType::Promo
        } else {
            LedgerEntryType::Purchase
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreditOutcome {
    pub entry: LedgerEntryProfile,
    pub subscription: SubscriptionProfile,
    pub renewed: bool,
}

/// Result of a credit including the post-commit panel step.
#[derive(Debug, Clone)]
pub struct AppliedCredit {
    pub outcome: CreditOutcome,
    /// False when the panel call failed; the provisioning pass picks it up.
    pub provisioned: bool,
}

/// New expiry after crediting `days`: time left on a live subscription is
/// kept, an expired one restarts from `now`.
pub fn extend_expiry(current: DateTime<Utc>, now: DateTime<Utc>, days: i32) -> DateTime<Utc> {
    current.max(now) + Duration::days(i64::from(days))
}

// ============================================================================
// Use Cases
// ============================================================================

/// Credit path shared by paid invoices and promotional grants.
pub struct CreditUseCases {
    subscription_repo: Arc<dyn SubscriptionRepoTrait>,
    ledger_repo: Arc<dyn LedgerRepoTrait>,
    panel: Arc<dyn VpnPanel>,
    notifier: Arc<dyn Notifier>,
    inbound_id: Option<i64>,
}

impl CreditUseCases {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepoTrait>,
        ledger_repo: Arc<dyn LedgerRepoTrait>,
        panel: Arc<dyn VpnPanel>,
        notifier: Arc<dyn Notifier>,
        inbound_id: Option<i64>,
    ) -> Self {
        Self {
            subscription_repo,
            ledger_repo,
            panel,
            notifier,
            inbound_id,
        }
    }

    /// Configured inbound, or the first enabled one the panel reports.
    pub async fn select_inbound(&self) -> AppResult<i64> {
        if let Some(id) = self.inbound_id {
            return Ok(id);
        }
        self.panel
            .list_inbounds(true)
            .await?
            .into_iter()
            .find(|inbound| inbound.enable)
            .map(|inbound| inbound.id)
            .ok_or_else(|| AppError::InvariantViolation("panel has no enabled inbound".into()))
    }

    /// Commit the credit, then provision on the panel and notify the user.
    ///
    /// Only the local commit decides success and it never waits on the
    /// panel. A failed panel call leaves the subscription in
    /// `pending_provision` and is not an error here.
    #[instrument(skip(self, grant), fields(user_id = grant.user_id, key = %grant.idempotency_key))]
    pub async fn credit(&self, grant: CreditGrant, now: DateTime<Utc>) -> AppResult<AppliedCredit> {
        if grant.days <= 0 {
            return Err(AppError::InvalidInput("credited days must be positive".into()));
        }

        let request = CreditRequest {
            identity: NewClientIdentity::generate(grant.user_id, self.inbound_id),
            plan_type: PlanType::from_days(grant.days),
            now,
            grant,
        };

        let outcome = self.ledger_repo.apply_credit(&request).await?;
        info!(
            subscription_id = outcome.subscription.id,
            entry_type = %outcome.entry.entry_type,
            expiry = %outcome.subscription.expiry_date,
            "Credit committed"
        );

        let provisioned = match self.provision(&outcome.subscription, now).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(
                    subscription_id = outcome.subscription.id,
                    error = %e,
                    code = %e.code(),
                    "Provisioning after credit failed, left pending"
                );
                false
            }
        };

        self.notify_activation(&outcome.subscription, request.grant.days, provisioned);

        Ok(AppliedCredit {
            outcome,
            provisioned,
        })
    }

    /// Make the panel hold `subscription`'s client with its current expiry.
    ///
    /// Returns false when the row changed while the panel was being called;
    /// it stays pending and the next pass sends the newer expiry.
    pub async fn provision(
        &self,
        subscription: &SubscriptionProfile,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let spec = subscription.client_spec();

        match (subscription.provisioned_at, subscription.inbound_id) {
            (Some(_), Some(inbound_id)) => {
                if let Err(e) = self.panel.update_client_expiry(inbound_id, &spec).await {
                    if let AppError::InvariantViolation(_) = &e {
                        error!(
                            subscription_id = subscription.id,
                            email = %subscription.email,
                            inbound_id,
                            error = %e,
                            "Panel lost a provisioned client, scheduling re-creation"
                        );
                        self.subscription_repo
                            .reset_provisioning(subscription.id)
                            .await?;
                    }
                    return Err(e);
                }
            }
            (_, stored) => {
                let inbound_id = match stored {
                    Some(id) => id,
                    None => {
                        let chosen = self.select_inbound().await?;
                        self.subscription_repo
                            .assign_inbound(subscription.id, chosen)
                            .await?
                    }
                };
                self.panel.create_client(inbound_id, &spec).await?;
            }
        }

        let confirmed = self
            .subscription_repo
            .mark_provisioned(subscription.id, subscription.expiry_date, now)
            .await?;
        if !confirmed {
            info!(
                subscription_id = subscription.id,
                "Subscription changed during provisioning, will resend"
            );
        }
        Ok(confirmed)
    }

    fn notify_activation(&self, subscription: &SubscriptionProfile, days: i32, provisioned: bool) {
        let link = if provisioned {
            self.panel
                .build_subscription_link(&subscription.email)
                .ok()
                .map(|url| url.to_string())
        } else {
            None
        };
        dispatch(
            &self.notifier,
            subscription.user_id,
            messages::subscription_activated(days, link.as_deref()),
        );
    }
}
