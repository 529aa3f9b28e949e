//! PostgreSQL credit store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contacts_core::{
    CoreError, CreditBalance, CreditGrant, CreditStore, GrantOutcome, PaymentRecord,
    PaymentStatus, Result, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::store_error;

/// Credit balances in `user_credits`, audit rows in `payments`
#[derive(Clone)]
pub struct PgCreditStore {
    pool: PgPool,
}

impl PgCreditStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn balance_from_row(row: &PgRow) -> std::result::Result<CreditBalance, sqlx::Error> {
    Ok(CreditBalance {
        user_id: UserId::new(row.try_get("user_id")?),
        credits: row.try_get("credits")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<PaymentRecord> {
    let status: String = row.try_get("status").map_err(store_error)?;
    let status = PaymentStatus::parse(&status)
        .ok_or_else(|| CoreError::Integrity(format!("unknown payment status '{status}'")))?;

    Ok(PaymentRecord {
        id: row.try_get::<Uuid, _>("id").map_err(store_error)?,
        user_id: UserId::new(row.try_get("user_id").map_err(store_error)?),
        intent_id: row.try_get("intent_id").map_err(store_error)?,
        amount: row.try_get("amount").map_err(store_error)?,
        credits: row.try_get("credits").map_err(store_error)?,
        status,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(store_error)?,
    })
}

#[async_trait]
impl CreditStore for PgCreditStore {
    async fn fetch_balance(&self, user: &UserId) -> Result<Option<CreditBalance>> {
        let row = sqlx::query(
            r"SELECT user_id, credits, updated_at FROM user_credits WHERE user_id = $1",
        )
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref()
            .map(balance_from_row)
            .transpose()
            .map_err(store_error)
    }

    async fn ensure_balance(&self, user: &UserId) -> Result<CreditBalance> {
        sqlx::query(
            r"INSERT INTO user_credits (user_id, credits, updated_at)
               VALUES ($1, 0, NOW())
               ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        self.fetch_balance(user).await?.ok_or_else(|| {
            CoreError::Integrity(format!("credit balance for {user} vanished after insert"))
        })
    }

    async fn compare_and_set(&self, user: &UserId, expected: i64, new: i64) -> Result<bool> {
        if new < 0 {
            return Err(CoreError::Validation(format!(
                "credit balance cannot become negative ({new})"
            )));
        }

        let result = sqlx::query(
            r"UPDATE user_credits
               SET credits = $3, updated_at = NOW()
               WHERE user_id = $1 AND credits = $2",
        )
        .bind(user.as_uuid())
        .bind(expected)
        .bind(new)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_grant(
        &self,
        user: &UserId,
        credits: i64,
        grant: &CreditGrant,
    ) -> Result<GrantOutcome> {
        let record = PaymentRecord::new(*user, credits, grant);
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Unique intent_id is the dedup barrier; refunds carry NULL and never collide
        let claimed: Option<Uuid> = sqlx::query_scalar(
            r"INSERT INTO payments (id, user_id, intent_id, amount, credits, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (intent_id) DO NOTHING
               RETURNING id",
        )
        .bind(record.id)
        .bind(user.as_uuid())
        .bind(record.intent_id.as_deref())
        .bind(record.amount)
        .bind(record.credits)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        if claimed.is_none() {
            tx.rollback().await.map_err(store_error)?;
            return Ok(GrantOutcome::AlreadyApplied);
        }

        let balance: i64 = sqlx::query_scalar(
            r"INSERT INTO user_credits (user_id, credits, updated_at)
               VALUES ($1, $2, NOW())
               ON CONFLICT (user_id)
               DO UPDATE SET credits = user_credits.credits + EXCLUDED.credits, updated_at = NOW()
               RETURNING credits",
        )
        .bind(user.as_uuid())
        .bind(credits)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        Ok(GrantOutcome::Applied { balance })
    }

    async fn find_payment(&self, intent_id: &str) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(
            r"SELECT id, user_id, intent_id, amount, credits, status, created_at
               FROM payments WHERE intent_id = $1",
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn list_payments(&self, user: &UserId) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(
            r"SELECT id, user_id, intent_id, amount, credits, status, created_at
               FROM payments WHERE user_id = $1
               ORDER BY created_at DESC",
        )
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(payment_from_row).collect()
    }
}
