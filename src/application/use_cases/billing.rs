use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_gateway::{NewGatewayInvoice, PaymentGateway},
        use_cases::{
            credit::{AppliedCredit, CreditGrant, CreditUseCases},
            subscription::SubscriptionRepoTrait,
        },
    },
    domain::entities::{
        idempotency_key::IdempotencyKey, invoice_status::InvoiceStatus,
        payment_method::PaymentMethod,
    },
};

// ============================================================================
// Constants
// ============================================================================

pub const MAX_INVOICE_DAYS: i32 = 366;
pub const MAX_PROMO_DAYS: i32 = 90;

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait InvoiceRepoTrait: Send + Sync {
    async fn create(&self, invoice: &NewInvoice) -> AppResult<InvoiceProfile>;

    async fn list_active(&self) -> AppResult<Vec<InvoiceProfile>>;

    /// Compare-and-set on the status column. Returns whether the row moved.
    async fn transition_status(
        &self,
        invoice_id: i64,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> AppResult<bool>;
}

// ============================================================================
// Profile Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct InvoiceProfile {
    /// Identifier assigned by the payment gateway.
    pub invoice_id: i64,
    pub user_id: i64,
    pub amount_cents: i64,
    pub asset: String,
    pub days: i32,
    pub status: InvoiceStatus,
    pub renew_subscription_id: Option<i64>,
    pub pay_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceProfile {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Ledger credit this invoice turns into once paid.
    pub fn credit_grant(&self) -> CreditGrant {
        CreditGrant {
            user_id: self.user_id,
            days: self.days,
            amount_cents: self.amount_cents,
            payment_method: PaymentMethod::Crypto,
            idempotency_key: IdempotencyKey::for_invoice(self.invoice_id),
            invoice_id: Some(self.invoice_id),
            renew_subscription_id: self.renew_subscription_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_id: i64,
    pub user_id: i64,
    pub amount_cents: i64,
    pub asset: String,
    pub days: i32,
    pub renew_subscription_id: Option<i64>,
    pub pay_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Use Cases
// ============================================================================

/// Write side used by the chat front-end: opening invoices and granting
/// promotional days.
pub struct BillingUseCases {
    invoice_repo: Arc<dyn InvoiceRepoTrait>,
    subscription_repo: Arc<dyn SubscriptionRepoTrait>,
    gateway: Arc<dyn PaymentGateway>,
    credit: Arc<CreditUseCases>,
    invoice_lifetime: Duration,
}

impl BillingUseCases {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceRepoTrait>,
        subscription_repo: Arc<dyn SubscriptionRepoTrait>,
        gateway: Arc<dyn PaymentGateway>,
        credit: Arc<CreditUseCases>,
        invoice_lifetime: Duration,
    ) -> Self {
        Self {
            invoice_repo,
            subscription_repo,
            gateway,
            credit,
            invoice_lifetime,
        }
    }

    /// Open an invoice at the gateway and track it locally as `active`.
    ///
    /// `renew_subscription_id` must name one of the user's non-revoked
    /// subscriptions; the payment then extends it instead of creating a new
    /// one.
    #[instrument(skip(self, asset))]
    pub async fn create_invoice(
        &self,
        user_id: i64,
        amount_cents: i64,
        asset: &str,
        days: i32,
        renew_subscription_id: Option<i64>,
    ) -> AppResult<InvoiceProfile> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".into()));
        }
        if !(1..=MAX_INVOICE_DAYS).contains(&days) {
            return Err(AppError::InvalidInput(format!(
                "days must be between 1 and {MAX_INVOICE_DAYS}"
            )));
        }
        let asset = asset.trim().to_uppercase();
        if asset.is_empty() {
            return Err(AppError::InvalidInput("asset is required".into()));
        }

        if let Some(subscription_id) = renew_subscription_id {
            let renewable = self
                .subscription_repo
                .get_by_id(subscription_id)
                .await?
                .is_some_and(|s| s.user_id == user_id && s.state.is_live());
            if !renewable {
                return Err(AppError::NotFound);
            }
        }

        let gateway_invoice = self
            .gateway
            .create_invoice(&NewGatewayInvoice {
                amount_cents,
                asset: asset.clone(),
                description: format!("VPN subscription, {days} days"),
                payload: user_id.to_string(),
                expires_in_secs: Some(self.invoice_lifetime.num_seconds()),
            })
            .await?;

        let invoice = self
            .invoice_repo
            .create(&NewInvoice {
                invoice_id: gateway_invoice.invoice_id,
                user_id,
                amount_cents,
                asset,
                days,
                renew_subscription_id,
                pay_url: gateway_invoice.pay_url,
                created_at: Utc::now(),
            })
            .await?;

        info!(invoice_id = invoice.invoice_id, "Invoice opened");
        Ok(invoice)
    }

    /// Credit free days. `key` identifies the grant (one daily bonus, one
    /// referral reward) and makes replays a `DuplicateCredit`.
    #[instrument(skip(self))]
    pub async fn grant_promotional(
        &self,
        user_id: i64,
        days: i32,
        key: &str,
    ) -> AppResult<AppliedCredit> {
        if !(1..=MAX_PROMO_DAYS).contains(&days) {
            return Err(AppError::InvalidInput(format!(
                "promotional days must be between 1 and {MAX_PROMO_DAYS}"
            )));
        }

        let grant = CreditGrant {
            user_id,
            days,
            amount_cents: 0,
            payment_method: PaymentMethod::Free,
            idempotency_key: IdempotencyKey::for_promo(key)?,
            invoice_id: None,
            renew_subscription_id: None,
        };
        self.credit.credit(grant, Utc::now()).await
    }
}
