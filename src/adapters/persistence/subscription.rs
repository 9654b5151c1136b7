use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription::{SubscriptionProfile, SubscriptionRepoTrait},
};

pub(crate) const SUBSCRIPTION_COLS: &str = r#"
    id, user_id, email, client_id, inbound_id, plan_type, payment_method,
    expiry_date, notified, state, provisioned_at, revoked_at,
    created_at, updated_at
"#;

pub(crate) fn row_to_subscription(row: sqlx::postgres::PgRow) -> SubscriptionProfile {
    SubscriptionProfile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        email: row.get("email"),
        client_id: row.get("client_id"),
        inbound_id: row.get("inbound_id"),
        plan_type: row.get("plan_type"),
        payment_method: row.get("payment_method"),
        expiry_date: row.get("expiry_date"),
        notified: row.get("notified"),
        state: row.get("state"),
        provisioned_at: row.get("provisioned_at"),
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl SubscriptionRepoTrait for PostgresPersistence {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<SubscriptionProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SUBSCRIPTION_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_subscription))
    }

    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<SubscriptionProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
            SUBSCRIPTION_COLS
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    async fn list_due_for_expiry(
        &self,
        horizon: DateTime<Utc>,
    ) -> AppResult<Vec<SubscriptionProfile>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE state <> 'revoked' AND expiry_date <= $1
            ORDER BY expiry_date
            "#,
            SUBSCRIPTION_COLS
        ))
        .bind(horizon)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    async fn list_pending_provision(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<SubscriptionProfile>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE state = 'pending_provision' AND expiry_date > $1
            ORDER BY updated_at
            "#,
            SUBSCRIPTION_COLS
        ))
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    async fn claim_warning(&self, id: i64, expiry_date: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET notified = TRUE, updated_at = NOW()
            WHERE id = $1
              AND notified = FALSE
              AND expiry_date = $2
              AND state <> 'revoked'
            "#,
        )
        .bind(id)
        .bind(expiry_date)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_revoked(
        &self,
        id: i64,
        expiry_date: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET state = 'revoked', revoked_at = $3, updated_at = $3
            WHERE id = $1 AND expiry_date = $2 AND state <> 'revoked'
            "#,
        )
        .bind(id)
        .bind(expiry_date)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_provisioned(
        &self,
        id: i64,
        expiry_date: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET state = 'active',
                provisioned_at = COALESCE(provisioned_at, $3),
                updated_at = $3
            WHERE id = $1 AND expiry_date = $2 AND state = 'pending_provision'
            "#,
        )
        .bind(id)
        .bind(expiry_date)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn reset_provisioning(&self, id: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET provisioned_at = NULL,
                state = CASE WHEN state = 'revoked' THEN state ELSE 'pending_provision' END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn assign_inbound(&self, id: i64, inbound_id: i64) -> AppResult<i64> {
        let row = sqlx::query(
            r#"
            UPDATE subscriptions
            SET inbound_id = COALESCE(inbound_id, $2)
            WHERE id = $1
            RETURNING inbound_id
            "#,
        )
        .bind(id)
        .bind(inbound_id)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.get("inbound_id"))
    }
}
