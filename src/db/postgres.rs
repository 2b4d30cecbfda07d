use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::order::{NewOrder, Order, OrderItem, OrderStatus, OrderStatusHistory};

use super::{OrderStore, StoreError};

// ============================================================================
// PostgreSQL Order Store
// ============================================================================
//
// `orders` holds the current record (items as JSONB, status as TEXT).
// `order_status_history` is append-only. Every write runs in a transaction
// so an order never exists without its initial history entry.
//
// ============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: String,
    status: String,
    items: Json<Vec<OrderItem>>,
    total_amount: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Corrupt(format!("order {}: {e}", row.id)))?;

        Ok(Order {
            id: row.id,
            customer_id: row.customer_id,
            items: row.items.0,
            total_amount: row.total_amount,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    order_id: Uuid,
    status: String,
    changed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for OrderStatusHistory {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Corrupt(format!("history {}: {e}", row.id)))?;

        Ok(OrderStatusHistory {
            id: row.id,
            order_id: row.order_id,
            status,
            changed_at: row.changed_at,
        })
    }
}

#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        tracing::info!(max_connections = config.max_connections, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!("Database connection established");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Cheap liveness probe used by the health monitor
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database connection closed");
    }
}

fn conflict_or_database(error: sqlx::Error, order_id: Uuid) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(order_id),
        _ => StoreError::Database(error),
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order, StoreError> {
        let order_id = order.id;
        let mut tx = self.pool.begin().await?;

        let row: OrderRow = sqlx::query_as(
            r#"
            INSERT INTO orders (id, customer_id, status, items, total_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING id, customer_id, status, items, total_amount, created_at, updated_at
            "#,
        )
        .bind(order.id)
        .bind(&order.customer_id)
        .bind(order.status.as_str())
        .bind(Json(order.items.clone()))
        .bind(order.total_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or_database(e, order_id))?;

        sqlx::query("INSERT INTO order_status_history (order_id, status, changed_at) VALUES ($1, $2, $3)")
            .bind(order_id)
            .bind(order.status.as_str())
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(order_id = %order_id, "Order created successfully");
        row.try_into()
    }

    async fn get_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, customer_id, status, items, total_amount, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The UPDATE takes the row lock, serializing writers on this order
        let updated: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            UPDATE orders
            SET status = $1, updated_at = GREATEST(updated_at, NOW())
            WHERE id = $2
            RETURNING updated_at
            "#,
        )
        .bind(status.as_str())
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((changed_at,)) = updated else {
            tx.rollback().await?;
            tracing::warn!(order_id = %order_id, "Order not found for status update");
            return Ok(false);
        };

        sqlx::query("INSERT INTO order_status_history (order_id, status, changed_at) VALUES ($1, $2, $3)")
            .bind(order_id)
            .bind(status.as_str())
            .bind(changed_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(order_id = %order_id, new_status = %status, "Order status updated");
        Ok(true)
    }

    async fn status_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, status, changed_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderStatusHistory::try_from).collect()
    }
}
