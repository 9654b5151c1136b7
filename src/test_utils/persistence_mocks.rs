use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        billing::{InvoiceProfile, InvoiceRepoTrait, NewInvoice},
        credit::{
            CreditOutcome, CreditRequest, LedgerEntryProfile, LedgerRepoTrait, extend_expiry,
        },
        subscription::{SubscriptionProfile, SubscriptionRepoTrait},
    },
    domain::entities::{
        idempotency_key::IdempotencyKey, invoice_status::InvoiceStatus,
        subscription_state::SubscriptionState,
    },
};

#[derive(Default)]
struct Tables {
    subscriptions: BTreeMap<i64, SubscriptionProfile>,
    invoices: BTreeMap<i64, InvoiceProfile>,
    ledger: Vec<LedgerEntryProfile>,
    next_subscription_id: i64,
}

/// All three tables behind one lock, so a credit is as atomic as the
/// Postgres transaction it stands in for.
#[derive(Default)]
pub struct InMemoryPersistence {
    tables: Mutex<Tables>,
    fail_next_list: AtomicBool,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_subscription(&self, mut subscription: SubscriptionProfile) -> SubscriptionProfile {
        let mut tables = self.tables.lock().unwrap();
        tables.next_subscription_id += 1;
        subscription.id = tables.next_subscription_id;
        tables
            .subscriptions
            .insert(subscription.id, subscription.clone());
        subscription
    }

    pub fn update_subscription(&self, id: i64, update: impl FnOnce(&mut SubscriptionProfile)) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(subscription) = tables.subscriptions.get_mut(&id) {
            update(subscription);
        }
    }

    pub fn subscription(&self, id: i64) -> Option<SubscriptionProfile> {
        self.tables.lock().unwrap().subscriptions.get(&id).cloned()
    }

    pub fn subscriptions_for(&self, user_id: i64) -> Vec<SubscriptionProfile> {
        self.tables
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn insert_invoice(&self, invoice: InvoiceProfile) -> InvoiceProfile {
        self.tables
            .lock()
            .unwrap()
            .invoices
            .insert(invoice.invoice_id, invoice.clone());
        invoice
    }

    pub fn invoice(&self, invoice_id: i64) -> Option<InvoiceProfile> {
        self.tables.lock().unwrap().invoices.get(&invoice_id).cloned()
    }

    pub fn ledger_len(&self) -> usize {
        self.tables.lock().unwrap().ledger.len()
    }

    pub fn ledger_entry(&self, key: &IdempotencyKey) -> Option<LedgerEntryProfile> {
        self.tables
            .lock()
            .unwrap()
            .ledger
            .iter()
            .find(|e| &e.idempotency_key == key)
            .cloned()
    }

    /// Make the next listing query fail like a lost database connection.
    pub fn fail_next_list(&self) {
        self.fail_next_list.store(true, Ordering::SeqCst);
    }

    fn check_list(&self) -> AppResult<()> {
        if self.fail_next_list.swap(false, Ordering::SeqCst) {
            return Err(AppError::Database("Database operation failed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepoTrait for InMemoryPersistence {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<SubscriptionProfile>> {
        Ok(self.subscription(id))
    }

    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<SubscriptionProfile>> {
        Ok(self.subscriptions_for(user_id))
    }

    async fn list_due_for_expiry(
        &self,
        horizon: DateTime<Utc>,
    ) -> AppResult<Vec<SubscriptionProfile>> {
        self.check_list()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.state.is_live() && s.expiry_date <= horizon)
            .cloned()
            .collect())
    }

    async fn list_pending_provision(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<SubscriptionProfile>> {
        self.check_list()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.state == SubscriptionState::PendingProvision && s.expiry_date > now)
            .cloned()
            .collect())
    }

    async fn claim_warning(&self, id: i64, expiry_date: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.subscriptions.get_mut(&id) {
            Some(s) if s.state.is_live() && !s.notified && s.expiry_date == expiry_date => {
                s.notified = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_revoked(
        &self,
        id: i64,
        expiry_date: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.subscriptions.get_mut(&id) {
            Some(s) if s.state.is_live() && s.expiry_date == expiry_date => {
                s.state = SubscriptionState::Revoked;
                s.revoked_at = Some(at);
                s.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_provisioned(
        &self,
        id: i64,
        expiry_date: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.subscriptions.get_mut(&id) {
            Some(s)
                if s.state == SubscriptionState::PendingProvision
                    && s.expiry_date == expiry_date =>
            {
                s.state = SubscriptionState::Active;
                s.provisioned_at.get_or_insert(at);
                s.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_provisioning(&self, id: i64) -> AppResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(s) = tables.subscriptions.get_mut(&id) {
            s.provisioned_at = None;
            if s.state.is_live() {
                s.state = SubscriptionState::PendingProvision;
            }
        }
        Ok(())
    }

    async fn assign_inbound(&self, id: i64, inbound_id: i64) -> AppResult<i64> {
        let mut tables = self.tables.lock().unwrap();
        let s = tables.subscriptions.get_mut(&id).ok_or(AppError::NotFound)?;
        Ok(*s.inbound_id.get_or_insert(inbound_id))
    }
}

#[async_trait]
impl InvoiceRepoTrait for InMemoryPersistence {
    async fn create(&self, invoice: &NewInvoice) -> AppResult<InvoiceProfile> {
        let mut tables = self.tables.lock().unwrap();
        if tables.invoices.contains_key(&invoice.invoice_id) {
            return Err(AppError::InvalidInput(
                "A record with this value already exists".into(),
            ));
        }
        let profile = InvoiceProfile {
            invoice_id: invoice.invoice_id,
            user_id: invoice.user_id,
            amount_cents: invoice.amount_cents,
            asset: invoice.asset.clone(),
            days: invoice.days,
            status: InvoiceStatus::Active,
            renew_subscription_id: invoice.renew_subscription_id,
            pay_url: invoice.pay_url.clone(),
            created_at: invoice.created_at,
            updated_at: invoice.created_at,
        };
        tables.invoices.insert(profile.invoice_id, profile.clone());
        Ok(profile)
    }

    async fn list_active(&self) -> AppResult<Vec<InvoiceProfile>> {
        self.check_list()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .invoices
            .values()
            .filter(|i| i.status == InvoiceStatus::Active)
            .cloned()
            .collect())
    }

    async fn transition_status(
        &self,
        invoice_id: i64,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.invoices.get_mut(&invoice_id) {
            Some(invoice) if invoice.status == from => {
                invoice.status = to;
                invoice.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LedgerRepoTrait for InMemoryPersistence {
    async fn apply_credit(&self, request: &CreditRequest) -> AppResult<CreditOutcome> {
        let mut guard = self.tables.lock().unwrap();
        let tables = &mut *guard;
        let grant = &request.grant;
        let now = request.now;

        // Every check runs before the first write.
        if tables
            .ledger
            .iter()
            .any(|e| e.idempotency_key == grant.idempotency_key)
        {
            return Err(AppError::DuplicateCredit(grant.idempotency_key.to_string()));
        }
        if let Some(invoice_id) = grant.invoice_id {
            match tables.invoices.get(&invoice_id).map(|i| i.status) {
                None => return Err(AppError::NotFound),
                Some(InvoiceStatus::Active) => {}
                Some(InvoiceStatus::Paid) => {
                    return Err(AppError::DuplicateCredit(grant.idempotency_key.to_string()));
                }
                Some(other) => {
                    return Err(AppError::InvariantViolation(format!(
                        "invoice {invoice_id} is {other}, refusing to credit"
                    )));
                }
            }
        }

        let target = grant
            .renew_subscription_id
            .and_then(|id| tables.subscriptions.get_mut(&id))
            .filter(|s| s.user_id == grant.user_id && s.state.is_live());

        let (subscription, renewed) = match target {
            Some(s) => {
                s.expiry_date = extend_expiry(s.expiry_date, now, grant.days);
                s.notified = false;
                s.state = SubscriptionState::PendingProvision;
                s.updated_at = now;
                (s.clone(), true)
            }
            None => {
                tables.next_subscription_id += 1;
                let subscription = SubscriptionProfile {
                    id: tables.next_subscription_id,
                    user_id: grant.user_id,
                    email: request.identity.email.clone(),
                    client_id: request.identity.client_id,
                    inbound_id: request.identity.inbound_id,
                    plan_type: request.plan_type,
                    payment_method: grant.payment_method,
                    expiry_date: extend_expiry(now, now, grant.days),
                    notified: false,
                    state: SubscriptionState::PendingProvision,
                    provisioned_at: None,
                    revoked_at: None,
                    created_at: now,
                    updated_at: now,
                };
                tables
                    .subscriptions
                    .insert(subscription.id, subscription.clone());
                (subscription, false)
            }
        };

        let entry = LedgerEntryProfile {
            id: Uuid::new_v4(),
            user_id: grant.user_id,
            amount_cents: grant.amount_cents,
            entry_type: request.entry_type(renewed),
            payment_method: grant.payment_method,
            idempotency_key: grant.idempotency_key.clone(),
            subscription_id: subscription.id,
            created_at: now,
        };
        tables.ledger.push(entry.clone());

        if let Some(invoice) = grant
            .invoice_id
            .and_then(|id| tables.invoices.get_mut(&id))
        {
            invoice.status = InvoiceStatus::Paid;
            invoice.updated_at = now;
        }

        Ok(CreditOutcome {
            entry,
            subscription,
            renewed,
        })
    }
}
