pub mod idempotency_key;
pub mod invoice_status;
pub mod payment_method;
pub mod plan_type;
pub mod subscription_state;
