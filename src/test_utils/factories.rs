//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    application::{
        ports::panel::Inbound,
        use_cases::{billing::InvoiceProfile, subscription::SubscriptionProfile},
    },
    domain::entities::{
        invoice_status::InvoiceStatus, payment_method::PaymentMethod, plan_type::PlanType,
        subscription_state::SubscriptionState,
    },
};

static NEXT_INVOICE_ID: AtomicI64 = AtomicI64::new(1_000);

/// Create a provisioned 30-day subscription. The id is assigned on insert.
pub fn create_test_subscription(
    user_id: i64,
    overrides: impl FnOnce(&mut SubscriptionProfile),
) -> SubscriptionProfile {
    let now = Utc::now();
    let client_id = Uuid::new_v4();
    let mut subscription = SubscriptionProfile {
        id: 0,
        user_id,
        email: format!("{}-{}", user_id, &client_id.simple().to_string()[..8]),
        client_id,
        inbound_id: Some(1),
        plan_type: PlanType::Days30,
        payment_method: PaymentMethod::Crypto,
        expiry_date: now + Duration::days(30),
        notified: false,
        state: SubscriptionState::Active,
        provisioned_at: Some(now - Duration::days(1)),
        revoked_at: None,
        created_at: now - Duration::days(1),
        updated_at: now - Duration::days(1),
    };
    overrides(&mut subscription);
    subscription
}

/// Create a fresh active invoice with a unique gateway id.
pub fn create_test_invoice(
    user_id: i64,
    overrides: impl FnOnce(&mut InvoiceProfile),
) -> InvoiceProfile {
    let now = Utc::now();
    let invoice_id = NEXT_INVOICE_ID.fetch_add(1, Ordering::SeqCst);
    let mut invoice = InvoiceProfile {
        invoice_id,
        user_id,
        amount_cents: 499,
        asset: "USDT".to_string(),
        days: 30,
        status: InvoiceStatus::Active,
        renew_subscription_id: None,
        pay_url: Some(format!("https://t.me/CryptoBot?start=IV{invoice_id}")),
        created_at: now - Duration::minutes(5),
        updated_at: now - Duration::minutes(5),
    };
    overrides(&mut invoice);
    invoice
}

pub fn create_test_inbound(id: i64, overrides: impl FnOnce(&mut Inbound)) -> Inbound {
    let mut inbound = Inbound {
        id,
        remark: format!("inbound-{id}"),
        protocol: "vless".to_string(),
        port: 443,
        enable: true,
    };
    overrides(&mut inbound);
    inbound
}
