use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use intake_core::domain::customer::CustomerId;
use intake_core::domain::order::{NewOrder, Order, OrderId, PlacedOrder};

use super::customer::{row_to_customer, CUSTOMER_COLUMNS};
use super::BEGIN_WRITE;
use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_id: i64 =
        row.try_get("customer_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let item: String = row.try_get("item").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_str: String =
        row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let time_str: String = row.try_get("time").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let amount = Decimal::from_str(&amount_str)
        .map_err(|e| RepositoryError::Decode(format!("invalid amount `{amount_str}`: {e}")))?;
    let time = DateTime::parse_from_rfc3339(&time_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid time `{time_str}`: {e}")))?;

    Ok(Order { id: OrderId(id), customer_id: CustomerId(customer_id), item, amount, time })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn place(&self, order: NewOrder) -> Result<PlacedOrder, RepositoryError> {
        // Write lock up front; a deferred read-then-insert cannot wait out a
        // concurrent commit.
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        let customer_row =
            sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customer WHERE id = ?"))
                .bind(order.customer_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(customer_row) = customer_row else {
            tx.rollback().await?;
            return Err(RepositoryError::CustomerNotFound(order.customer_id));
        };
        let customer = row_to_customer(&customer_row)?;

        let result = sqlx::query(
            "INSERT INTO customer_order (customer_id, item, amount, time, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order.customer_id.0)
        .bind(&order.item)
        .bind(order.amount.to_string())
        .bind(order.time.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PlacedOrder {
            order: Order {
                id: OrderId(result.last_insert_rowid()),
                customer_id: order.customer_id,
                item: order.item,
                amount: order.amount,
                time: order.time,
            },
            customer,
        })
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, item, amount, time FROM customer_order WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, item, amount, time FROM customer_order
             WHERE customer_id = ?
             ORDER BY time ASC, id ASC",
        )
        .bind(customer_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }
}
