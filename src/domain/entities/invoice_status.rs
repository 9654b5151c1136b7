use serde::{Deserialize, Serialize};

use crate::app_error::{AppError, AppResult};

/// Lifecycle of a gateway invoice. `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Active,
    Paid,
    Expired,
    Cancelled,
    Error,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Active => "active",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Expired => "expired",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Error => "error",
        }
    }

    /// Parse a status string reported by the payment gateway.
    ///
    /// Unknown strings are rejected instead of being mapped to a default, so a
    /// gateway API change can never be mistaken for a payment.
    pub fn from_gateway(s: &str) -> AppResult<Self> {
        match s {
            "active" => Ok(InvoiceStatus::Active),
            "paid" => Ok(InvoiceStatus::Paid),
            "expired" => Ok(InvoiceStatus::Expired),
            "cancelled" | "canceled" => Ok(InvoiceStatus::Cancelled),
            "error" => Ok(InvoiceStatus::Error),
            other => Err(AppError::UnknownGatewayStatus(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvoiceStatus::Active)
    }

    /// Validate a state change. Staying in the same state is allowed (no-op);
    /// the only real moves are `active -> {paid, expired, cancelled, error}`.
    pub fn transition_to(self, next: InvoiceStatus) -> AppResult<InvoiceStatus> {
        match (self, next) {
            (current, next) if current == next => Ok(current),
            (InvoiceStatus::Active, next) => Ok(next),
            (current, next) => Err(AppError::InvariantViolation(format!(
                "invoice cannot move from {} to {}",
                current, next
            ))),
        }
    }
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        InvoiceStatus::Active
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
