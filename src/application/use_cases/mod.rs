pub mod billing;
pub mod credit;
pub mod expiry;
pub mod payment;
pub mod subscription;
