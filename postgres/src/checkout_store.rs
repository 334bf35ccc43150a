//! Checkout attempt persistence.
//!
//! A checkout is one primary attempt row (the earliest row for a code) plus
//! its item rows. `log_attempt` appends additional rows under the same code
//! as a purchase audit trail; reads and appends always resolve against the
//! primary row, so audit rows never leak into the item set.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use flashsale_core::codes;
use flashsale_core::{Checkout, CheckoutStore, Result, SaleError};

use crate::{is_unique_violation, map_db_error};

/// `PostgreSQL` implementation of checkout persistence.
#[derive(Clone)]
pub struct PgCheckoutStore {
    pool: PgPool,
}

impl PgCheckoutStore {
    /// Build a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Id of the primary (earliest) attempt row for a code.
    async fn primary_attempt_id(&self, code: &str) -> Result<Option<String>> {
        sqlx::query_scalar(
            "SELECT id FROM checkout_attempts WHERE checkout_code = $1 \
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)
    }
}

impl CheckoutStore for PgCheckoutStore {
    async fn checkout_by_code(&self, code: &str) -> Result<Checkout> {
        let row: Option<(String, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, sale_id, user_id, created_at FROM checkout_attempts \
             WHERE checkout_code = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        let Some((attempt_id, sale_id, user_id, created_at)) = row else {
            return Err(SaleError::CheckoutNotFound);
        };

        let item_ids: Vec<String> = sqlx::query_scalar(
            "SELECT item_id FROM checkout_items WHERE checkout_attempt_id = $1 ORDER BY added_at",
        )
        .bind(&attempt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(Checkout {
            code: code.to_string(),
            sale_id,
            user_id,
            item_ids,
            created_at,
        })
    }

    async fn create_checkout(&self, checkout: &Checkout) -> Result<()> {
        let attempt_id = codes::checkout_row_id();

        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        sqlx::query(
            "INSERT INTO checkout_attempts (id, checkout_code, sale_id, user_id, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&attempt_id)
        .bind(&checkout.code)
        .bind(&checkout.sale_id)
        .bind(&checkout.user_id)
        .bind(checkout.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        for item_id in &checkout.item_ids {
            sqlx::query(
                "INSERT INTO checkout_items (id, checkout_attempt_id, item_id, added_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(codes::checkout_row_id())
            .bind(&attempt_id)
            .bind(item_id)
            .bind(checkout.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }

        tx.commit().await.map_err(map_db_error)
    }

    async fn add_item(&self, code: &str, item_id: &str) -> Result<()> {
        let attempt_id = self
            .primary_attempt_id(code)
            .await?
            .ok_or(SaleError::CheckoutNotFound)?;

        let inserted = sqlx::query(
            "INSERT INTO checkout_items (id, checkout_attempt_id, item_id, added_at) \
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(codes::checkout_row_id())
        .bind(&attempt_id)
        .bind(item_id)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            // The unique (attempt, item) constraint decides concurrent
            // duplicate adds; losing the race is a domain answer, not a fault.
            Err(error) if is_unique_violation(&error) => Err(SaleError::ItemAlreadyInCheckout),
            Err(error) => Err(map_db_error(error)),
        }
    }

    async fn log_attempt(
        &self,
        sale_id: &str,
        user_id: &str,
        code: &str,
        item_id: &str,
    ) -> Result<()> {
        let attempt_id = codes::checkout_row_id();

        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        sqlx::query(
            "INSERT INTO checkout_attempts (id, checkout_code, sale_id, user_id, created_at) \
             VALUES ($1, $2, $3, $4, NOW())",
        )
        .bind(&attempt_id)
        .bind(code)
        .bind(sale_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        sqlx::query(
            "INSERT INTO checkout_items (id, checkout_attempt_id, item_id, added_at) \
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(codes::checkout_row_id())
        .bind(&attempt_id)
        .bind(item_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)
    }

    async fn delete_checkout(&self, code: &str) -> Result<()> {
        // Cascade removes the item rows, audit rows included.
        sqlx::query("DELETE FROM checkout_attempts WHERE checkout_code = $1")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(())
    }
}
