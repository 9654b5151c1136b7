use async_trait::async_trait;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing::{InvoiceProfile, InvoiceRepoTrait, NewInvoice},
    domain::entities::invoice_status::InvoiceStatus,
};

const INVOICE_COLS: &str = r#"
    invoice_id, user_id, amount_cents, asset, days, status,
    renew_subscription_id, pay_url, created_at, updated_at
"#;

fn row_to_invoice(row: sqlx::postgres::PgRow) -> InvoiceProfile {
    InvoiceProfile {
        invoice_id: row.get("invoice_id"),
        user_id: row.get("user_id"),
        amount_cents: row.get("amount_cents"),
        asset: row.get("asset"),
        days: row.get("days"),
        status: row.get("status"),
        renew_subscription_id: row.get("renew_subscription_id"),
        pay_url: row.get("pay_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl InvoiceRepoTrait for PostgresPersistence {
    async fn create(&self, invoice: &NewInvoice) -> AppResult<InvoiceProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO invoices (
                invoice_id, user_id, amount_cents, asset, days, status,
                renew_subscription_id, pay_url, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8, $8)
            RETURNING {}
            "#,
            INVOICE_COLS
        ))
        .bind(invoice.invoice_id)
        .bind(invoice.user_id)
        .bind(invoice.amount_cents)
        .bind(&invoice.asset)
        .bind(invoice.days)
        .bind(invoice.renew_subscription_id)
        .bind(&invoice.pay_url)
        .bind(invoice.created_at)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_invoice(row))
    }

    async fn list_active(&self) -> AppResult<Vec<InvoiceProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE status = 'active' ORDER BY created_at",
            INVOICE_COLS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_invoice).collect())
    }

    async fn transition_status(
        &self,
        invoice_id: i64,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $3, updated_at = NOW()
            WHERE invoice_id = $1 AND status = $2
            "#,
        )
        .bind(invoice_id)
        .bind(from)
        .bind(to)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }
}
