//! Sales, items and purchase-result persistence.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::Postgres;

use flashsale_core::{Item, PurchaseResult, Result, Sale, SaleError, SaleStore, SaleTx};

use crate::map_db_error;

type SaleRow = (
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    i32,
    i32,
    DateTime<Utc>,
);

type ItemRow = (
    String,
    String,
    String,
    String,
    bool,
    Option<String>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

const SELECT_SALE: &str =
    "SELECT id, started_at, ended_at, total_items, items_sold, created_at FROM sales";

const SELECT_ITEM: &str =
    "SELECT id, sale_id, name, image_url, sold, sold_to_user_id, sold_at, created_at FROM items";

fn sale_from_row(row: SaleRow) -> Sale {
    let (id, started_at, ended_at, total_items, items_sold, created_at) = row;
    Sale {
        id,
        started_at,
        ended_at,
        total_items,
        items_sold,
        created_at,
    }
}

fn item_from_row(row: ItemRow) -> Item {
    let (id, sale_id, name, image_url, sold, sold_to_user_id, sold_at, created_at) = row;
    Item {
        id,
        sale_id,
        name,
        image_url,
        sold,
        sold_to_user_id,
        sold_at,
        created_at,
    }
}

/// `PostgreSQL` implementation of the sale store of record.
#[derive(Clone)]
pub struct PgSaleStore {
    pool: PgPool,
}

impl PgSaleStore {
    /// Build a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (health checks).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl SaleStore for PgSaleStore {
    type Tx = PgSaleTx;

    async fn active_sale(&self) -> Result<Sale> {
        let query = format!(
            "{SELECT_SALE} WHERE started_at <= NOW() AND ended_at > NOW() \
             ORDER BY started_at DESC LIMIT 1"
        );
        let row: Option<SaleRow> = sqlx::query_as(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(sale_from_row).ok_or(SaleError::SaleNotFound)
    }

    async fn sale(&self, id: &str) -> Result<Sale> {
        let query = format!("{SELECT_SALE} WHERE id = $1");
        let row: Option<SaleRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(sale_from_row).ok_or(SaleError::SaleNotFound)
    }

    async fn create_sale(&self, sale: &Sale) -> Result<()> {
        sqlx::query(
            "INSERT INTO sales (id, started_at, ended_at, total_items, items_sold, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&sale.id)
        .bind(sale.started_at)
        .bind(sale.ended_at)
        .bind(sale.total_items)
        .bind(sale.items_sold)
        .bind(sale.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn item(&self, id: &str) -> Result<Item> {
        let query = format!("{SELECT_ITEM} WHERE id = $1");
        let row: Option<ItemRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(item_from_row).ok_or(SaleError::ItemNotFound)
    }

    async fn items_for_sale(
        &self,
        sale_id: &str,
        only_available: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Item>> {
        let filter = if only_available { " AND sold = FALSE" } else { "" };
        let query = format!(
            "{SELECT_ITEM} WHERE sale_id = $1{filter} ORDER BY created_at LIMIT $2 OFFSET $3"
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&query)
            .bind(sale_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(rows.into_iter().map(item_from_row).collect())
    }

    async fn create_items(&self, items: &[Item]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        // One multi-row insert per chunk; 8 columns per row keeps the bind
        // count well inside the protocol limit.
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        for chunk in items.chunks(1000) {
            let mut builder: sqlx::QueryBuilder<'_, Postgres> = sqlx::QueryBuilder::new(
                "INSERT INTO items (id, sale_id, name, image_url, sold, created_at) ",
            );
            builder.push_values(chunk, |mut row, item| {
                row.push_bind(&item.id)
                    .push_bind(&item.sale_id)
                    .push_bind(&item.name)
                    .push_bind(&item.image_url)
                    .push_bind(item.sold)
                    .push_bind(item.created_at);
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }
        tx.commit().await.map_err(map_db_error)?;

        Ok(())
    }

    async fn sold_item_count(&self, sale_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE sale_id = $1 AND sold = TRUE")
                .bind(sale_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_error)?;

        Ok(count)
    }

    async fn purchase_result(&self, code: &str) -> Result<Option<PurchaseResult>> {
        let row: Option<Json<PurchaseResult>> =
            sqlx::query_scalar("SELECT result FROM purchase_results WHERE checkout_code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;

        Ok(row.map(|json| json.0))
    }

    async fn begin(&self) -> Result<PgSaleTx> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        // Purchase commits require full serializability; conflicts surface as
        // SQLSTATE 40001 and are retried by the engine.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        Ok(PgSaleTx { tx })
    }
}

/// A serializable transaction over the sale store.
pub struct PgSaleTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl SaleTx for PgSaleTx {
    async fn sale(&mut self, id: &str) -> Result<Sale> {
        let query = format!("{SELECT_SALE} WHERE id = $1");
        let row: Option<SaleRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        row.map(sale_from_row).ok_or(SaleError::SaleNotFound)
    }

    async fn item(&mut self, id: &str) -> Result<Item> {
        let query = format!("{SELECT_ITEM} WHERE id = $1");
        let row: Option<ItemRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        row.map(item_from_row).ok_or(SaleError::ItemNotFound)
    }

    async fn mark_item_sold(&mut self, item_id: &str, user_id: &str) -> Result<bool> {
        // The single authoritative sold transition: exactly one concurrent
        // caller observes rows_affected = 1.
        let outcome = sqlx::query(
            "UPDATE items SET sold = TRUE, sold_to_user_id = $2, sold_at = NOW() \
             WHERE id = $1 AND sold = FALSE",
        )
        .bind(item_id)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        Ok(outcome.rows_affected() == 1)
    }

    async fn update_sale(&mut self, sale: &Sale) -> Result<()> {
        sqlx::query("UPDATE sales SET items_sold = $2 WHERE id = $1")
            .bind(&sale.id)
            .bind(sale.items_sold)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(())
    }

    async fn purchase_result(&mut self, code: &str) -> Result<Option<PurchaseResult>> {
        let row: Option<Json<PurchaseResult>> =
            sqlx::query_scalar("SELECT result FROM purchase_results WHERE checkout_code = $1")
                .bind(code)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_db_error)?;

        Ok(row.map(|json| json.0))
    }

    async fn save_purchase_result(&mut self, code: &str, result: &PurchaseResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO purchase_results (checkout_code, result, created_at) \
             VALUES ($1, $2, NOW()) ON CONFLICT (checkout_code) DO NOTHING",
        )
        .bind(code)
        .bind(Json(result))
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(map_db_error)
    }
}
