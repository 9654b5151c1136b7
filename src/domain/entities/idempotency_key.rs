use serde::{Deserialize, Serialize};

use crate::app_error::{AppError, AppResult};

const INVOICE_PREFIX: &str = "invoice:";
const PROMO_PREFIX: &str = "promo:";
const MAX_KEY_LEN: usize = 128;

/// Deterministic key that makes a ledger credit apply at most once per source
/// event. The database enforces uniqueness; this type only builds the keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn for_invoice(invoice_id: i64) -> Self {
        Self(format!("{INVOICE_PREFIX}{invoice_id}"))
    }

    /// Key for a promotional grant. `source` is chosen by the caller (e.g.
    /// `daily:<user>:<date>` or `referral:<referrer>:<referred>`) and must be
    /// stable across retries of the same grant.
    pub fn for_promo(source: &str) -> AppResult<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(AppError::InvalidInput(
                "promotional idempotency key must not be empty".into(),
            ));
        }
        let key = format!("{PROMO_PREFIX}{source}");
        if key.len() > MAX_KEY_LEN {
            return Err(AppError::InvalidInput(format!(
                "idempotency key longer than {MAX_KEY_LEN} bytes"
            )));
        }
        Ok(Self(key))
    }

    /// Rehydrate a key read back from storage.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
