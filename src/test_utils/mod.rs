//! Test utilities for use case testing.
//!
//! This module provides:
//! - Test data factories for creating valid fixtures
//! - An in-memory persistence implementing every repository trait
//! - Scripted panel, payment gateway and notifier doubles

mod factories;
mod gateway_mocks;
mod panel_mocks;
mod persistence_mocks;

pub use factories::*;
pub use gateway_mocks::*;
pub use panel_mocks::*;
pub use persistence_mocks::*;

/// Let fire-and-forget tasks spawned by the code under test run.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
