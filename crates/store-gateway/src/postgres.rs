//! # PostgreSQL Backend
//!
//! [`PgGateway`] implements [`StoreGateway`] on a `sqlx` pool. A unit of work is a
//! database transaction ([`PgUnit`]); the locked stock read is `SELECT ... FOR UPDATE`,
//! so the row lock is held by PostgreSQL until the transaction ends. Dropping a
//! `PgUnit` without committing rolls the transaction back (sqlx's `Transaction`
//! does this on drop).
//!
//! Expected tables (creating them is the deployment's job):
//!
//! ```sql
//! CREATE TABLE products    (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL, price NUMERIC(12,2) NOT NULL);
//! CREATE TABLE stocks      (id BIGSERIAL PRIMARY KEY, product_id BIGINT NOT NULL REFERENCES products(id),
//!                           warehouse_id BIGINT NOT NULL, quantity INTEGER NOT NULL CHECK (quantity >= 0));
//! CREATE TABLE orders      (id BIGSERIAL PRIMARY KEY, user_id BIGINT NOT NULL, status TEXT NOT NULL,
//!                           created_at TIMESTAMPTZ NOT NULL);
//! CREATE TABLE order_items (id BIGSERIAL PRIMARY KEY, order_id BIGINT NOT NULL REFERENCES orders(id),
//!                           product_id BIGINT NOT NULL REFERENCES products(id), warehouse_id BIGINT NOT NULL,
//!                           quantity INTEGER NOT NULL, price NUMERIC(12,2) NOT NULL);
//! ```

use crate::error::GatewayError;
use crate::gateway::{StoreGateway, UnitOfWork};
use crate::model::{
    Order, OrderCreate, OrderId, OrderItem, OrderItemCreate, OrderItemId, OrderStatus, Product,
    ProductId, Stock, StockId, UserId, WarehouseId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info, instrument};

impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => GatewayError::NotFound("row not found".to_string()),
            other => GatewayError::Storage(other.to_string()),
        }
    }
}

// Identifiers are BIGINT and quantities INTEGER in the schema.
fn to_db_id(id: u64) -> Result<i64, GatewayError> {
    i64::try_from(id).map_err(|_| GatewayError::Storage(format!("identifier {id} exceeds BIGINT")))
}

fn from_db_id(id: i64) -> Result<u64, GatewayError> {
    u64::try_from(id).map_err(|_| GatewayError::Storage(format!("negative identifier {id} in database")))
}

fn from_db_quantity(quantity: i32) -> Result<u32, GatewayError> {
    u32::try_from(quantity)
        .map_err(|_| GatewayError::Storage(format!("negative quantity {quantity} in database")))
}

fn to_db_quantity(quantity: u32) -> Result<i32, GatewayError> {
    i32::try_from(quantity)
        .map_err(|_| GatewayError::Storage(format!("quantity {quantity} exceeds INTEGER")))
}

fn stock_from_row(row: &PgRow) -> Result<Stock, GatewayError> {
    Ok(Stock {
        id: StockId(from_db_id(row.try_get("id")?)?),
        product_id: ProductId(from_db_id(row.try_get("product_id")?)?),
        warehouse_id: WarehouseId(from_db_id(row.try_get("warehouse_id")?)?),
        quantity: from_db_quantity(row.try_get("quantity")?)?,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, GatewayError> {
    Ok(OrderItem {
        id: OrderItemId(from_db_id(row.try_get("id")?)?),
        order_id: OrderId(from_db_id(row.try_get("order_id")?)?),
        warehouse_id: WarehouseId(from_db_id(row.try_get("warehouse_id")?)?),
        product_id: ProductId(from_db_id(row.try_get("product_id")?)?),
        quantity: from_db_quantity(row.try_get("quantity")?)?,
        price: row.try_get("price")?,
    })
}

/// [`StoreGateway`] over a PostgreSQL pool.
#[derive(Clone, Debug)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StoreGateway for PgGateway {
    type Unit = PgUnit;

    #[instrument(skip(self))]
    async fn begin(&self) -> Result<PgUnit, GatewayError> {
        let tx = self.pool.begin().await?;
        debug!("Transaction started");
        Ok(PgUnit { tx })
    }

    #[instrument(skip(self))]
    async fn product_by_id(&self, id: ProductId) -> Result<Product, GatewayError> {
        let row = sqlx::query("SELECT id, name, price FROM products WHERE id = $1")
            .bind(to_db_id(id.0)?)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        Ok(Product {
            id: ProductId(from_db_id(row.try_get("id")?)?),
            name: row.try_get("name")?,
            price: row.try_get::<Decimal, _>("price")?,
        })
    }

    #[instrument(skip(self, unit))]
    async fn stock_for_update(
        &self,
        unit: &mut PgUnit,
        product_id: ProductId,
        min_quantity: u32,
    ) -> Result<Stock, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, warehouse_id, quantity FROM stocks
            WHERE product_id = $1 AND quantity >= $2
            ORDER BY id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(to_db_id(product_id.0)?)
        .bind(to_db_quantity(min_quantity)?)
        .fetch_optional(&mut *unit.tx)
        .await?
        .ok_or_else(|| {
            GatewayError::NotFound(format!(
                "stock of {product_id} with quantity >= {min_quantity}"
            ))
        })?;

        stock_from_row(&row)
    }

    #[instrument(skip(self, unit, stock), fields(stock_id = %stock.id))]
    async fn update_stock(&self, unit: &mut PgUnit, stock: &Stock) -> Result<(), GatewayError> {
        let result = sqlx::query(
            "UPDATE stocks SET product_id = $2, warehouse_id = $3, quantity = $4 WHERE id = $1",
        )
        .bind(to_db_id(stock.id.0)?)
        .bind(to_db_id(stock.product_id.0)?)
        .bind(to_db_id(stock.warehouse_id.0)?)
        .bind(to_db_quantity(stock.quantity)?)
        .execute(&mut *unit.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(stock.id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, unit, order, items), fields(items = items.len()))]
    async fn create_order(
        &self,
        unit: &mut PgUnit,
        order: OrderCreate,
        items: Vec<OrderItemCreate>,
    ) -> Result<Order, GatewayError> {
        if items.is_empty() {
            return Err(GatewayError::Storage("order has no items".to_string()));
        }

        let order_row = sqlx::query(
            "INSERT INTO orders (user_id, status, created_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(to_db_id(order.user_id.0)?)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .fetch_one(&mut *unit.tx)
        .await?;
        let order_id = OrderId(from_db_id(order_row.try_get("id")?)?);

        let mut persisted = Vec::with_capacity(items.len());
        for item in items {
            let row = sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, warehouse_id, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(to_db_id(order_id.0)?)
            .bind(to_db_id(item.product_id.0)?)
            .bind(to_db_id(item.warehouse_id.0)?)
            .bind(to_db_quantity(item.quantity)?)
            .bind(item.price)
            .fetch_one(&mut *unit.tx)
            .await?;

            persisted.push(OrderItem {
                id: OrderItemId(from_db_id(row.try_get("id")?)?),
                order_id,
                warehouse_id: item.warehouse_id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            });
        }

        debug!(%order_id, "Order inserted");
        Ok(Order {
            id: order_id,
            user_id: order.user_id,
            status: order.status,
            created_at: order.created_at,
            items: persisted,
        })
    }

    #[instrument(skip(self))]
    async fn stocks_for_product(&self, product_id: ProductId) -> Result<Vec<Stock>, GatewayError> {
        let rows = sqlx::query(
            "SELECT id, product_id, warehouse_id, quantity FROM stocks WHERE product_id = $1 ORDER BY id",
        )
        .bind(to_db_id(product_id.0)?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stock_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn order_by_id(&self, id: OrderId) -> Result<Order, GatewayError> {
        let row = sqlx::query("SELECT id, user_id, status, created_at FROM orders WHERE id = $1")
            .bind(to_db_id(id.0)?)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        let status: String = row.try_get("status")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let items = sqlx::query(
            r#"
            SELECT id, order_id, product_id, warehouse_id, quantity, price
            FROM order_items WHERE order_id = $1 ORDER BY id
            "#,
        )
        .bind(to_db_id(id.0)?)
        .fetch_all(&self.pool)
        .await?;

        Ok(Order {
            id,
            user_id: UserId(from_db_id(row.try_get("user_id")?)?),
            status: status.parse::<OrderStatus>().map_err(GatewayError::Storage)?,
            created_at,
            items: items.iter().map(item_from_row).collect::<Result<_, _>>()?,
        })
    }
}

/// A PostgreSQL transaction used as a unit of work.
pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn commit(self) -> Result<(), GatewayError> {
        self.tx.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(self) -> Result<(), GatewayError> {
        self.tx.rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }
}
