use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{
        PostgresPersistence,
        subscription::{SUBSCRIPTION_COLS, row_to_subscription},
    },
    app_error::{AppError, AppResult},
    application::use_cases::credit::{
        CreditOutcome, CreditRequest, LedgerEntryProfile, LedgerRepoTrait, extend_expiry,
    },
    domain::entities::{idempotency_key::IdempotencyKey, invoice_status::InvoiceStatus},
};

const LEDGER_COLS: &str = r#"
    id, user_id, amount_cents, entry_type, payment_method,
    idempotency_key, subscription_id, created_at
"#;

fn row_to_entry(row: sqlx::postgres::PgRow) -> LedgerEntryProfile {
    LedgerEntryProfile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        amount_cents: row.get("amount_cents"),
        entry_type: row.get("entry_type"),
        payment_method: row.get("payment_method"),
        idempotency_key: IdempotencyKey::from_stored(row.get("idempotency_key")),
        subscription_id: row.get("subscription_id"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl LedgerRepoTrait for PostgresPersistence {
    async fn apply_credit(&self, request: &CreditRequest) -> AppResult<CreditOutcome> {
        let grant = &request.grant;
        let now = request.now;
        let key = grant.idempotency_key.as_str();

        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        if let Some(invoice_id) = grant.invoice_id {
            let row = sqlx::query("SELECT status FROM invoices WHERE invoice_id = $1 FOR UPDATE")
                .bind(invoice_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(AppError::from)?
                .ok_or(AppError::NotFound)?;

            match row.get::<InvoiceStatus, _>("status") {
                InvoiceStatus::Active => {}
                InvoiceStatus::Paid => return Err(AppError::DuplicateCredit(key.to_string())),
                other => {
                    return Err(AppError::InvariantViolation(format!(
                        "invoice {invoice_id} is {other}, refusing to credit"
                    )));
                }
            }
        }

        let target = match grant.renew_subscription_id {
            Some(subscription_id) => sqlx::query(&format!(
                r#"
                SELECT {}
                FROM subscriptions
                WHERE id = $1 AND user_id = $2 AND state <> 'revoked'
                FOR UPDATE
                "#,
                SUBSCRIPTION_COLS
            ))
            .bind(subscription_id)
            .bind(grant.user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::from)?
            .map(row_to_subscription),
            None => None,
        };

        let (subscription_row, renewed) = match target {
            Some(current) => {
                let expiry = extend_expiry(current.expiry_date, now, grant.days);
                let row = sqlx::query(&format!(
                    r#"
                    UPDATE subscriptions
                    SET expiry_date = $2,
                        notified = FALSE,
                        state = 'pending_provision',
                        updated_at = $3
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    SUBSCRIPTION_COLS
                ))
                .bind(current.id)
                .bind(expiry)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::from)?;
                (row, true)
            }
            None => {
                let row = sqlx::query(&format!(
                    r#"
                    INSERT INTO subscriptions (
                        user_id, email, client_id, inbound_id, plan_type,
                        payment_method, expiry_date, notified, state,
                        created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, 'pending_provision', $8, $8)
                    RETURNING {}
                    "#,
                    SUBSCRIPTION_COLS
                ))
                .bind(grant.user_id)
                .bind(&request.identity.email)
                .bind(request.identity.client_id)
                .bind(request.identity.inbound_id)
                .bind(request.plan_type)
                .bind(grant.payment_method)
                .bind(extend_expiry(now, now, grant.days))
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::from)?;
                (row, false)
            }
        };
        let subscription = row_to_subscription(subscription_row);

        let entry_row = sqlx::query(&format!(
            r#"
            INSERT INTO ledger_entries (
                id, user_id, amount_cents, entry_type, payment_method,
                idempotency_key, subscription_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING {}
            "#,
            LEDGER_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(grant.user_id)
        .bind(grant.amount_cents)
        .bind(request.entry_type(renewed))
        .bind(grant.payment_method)
        .bind(key)
        .bind(subscription.id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let Some(entry_row) = entry_row else {
            return Err(AppError::DuplicateCredit(key.to_string()));
        };

        if let Some(invoice_id) = grant.invoice_id {
            let result = sqlx::query(
                r#"
                UPDATE invoices
                SET status = 'paid', updated_at = $2
                WHERE invoice_id = $1 AND status = 'active'
                "#,
            )
            .bind(invoice_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

            if result.rows_affected() != 1 {
                return Err(AppError::InvariantViolation(format!(
                    "invoice {invoice_id} left active state during credit"
                )));
            }
        }

        tx.commit().await.map_err(AppError::from)?;

        Ok(CreditOutcome {
            entry: row_to_entry(entry_row),
            subscription,
            renewed,
        })
    }
}
