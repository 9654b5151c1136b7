use sqlx::PgPool;

use crate::app_error::AppError;

pub mod invoice;
pub mod ledger;
pub mod subscription;

/// Unique constraint that makes a ledger credit apply at most once.
pub const LEDGER_KEY_CONSTRAINT: &str = "ledger_entries_idempotency_key_key";

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                tracing::warn!(error = %err, "Database unavailable");
                AppError::TransientNetwork("database unavailable".into())
            }
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    if db_err.constraint() == Some(LEDGER_KEY_CONSTRAINT) {
                        AppError::DuplicateCredit("ledger idempotency key".into())
                    } else {
                        AppError::InvalidInput("A record with this value already exists".into())
                    }
                } else if db_err.is_foreign_key_violation() {
                    AppError::InvalidInput("Referenced record not found".into())
                } else {
                    // Log the actual error for debugging, but don't expose details
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
