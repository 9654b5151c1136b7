pub mod notifier;
pub mod panel;
pub mod payment_gateway;
