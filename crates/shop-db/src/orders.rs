// Postgres implementation of the checkout and ledger seams.
//
// One checkout = one sqlx transaction:
// - `set_config('lock_timeout', .., true)` bounds every row-lock wait
// - product rows are locked with `for update`, ascending id, so two carts
//   sharing products always acquire in the same order
// - the stock decrement is guarded (`stock >= qty`) as a second line of
//   defence behind the lock
// A dropped `PgCheckoutTx` rolls back when sqlx returns the connection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use shop_checkout::{
    CheckoutStore, CheckoutTx, LockedProduct, OrderFilter, OrderHeader, OrderId, OrderLedger,
    OrderLineRecord, OrderRecord, OrderStatus, PricedLine, ProductId, Quantity, StoreError,
    UserId,
};

/// Postgres SQLSTATEs that mean "gave up waiting".
const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";
const SQLSTATE_QUERY_CANCELED: &str = "57014";

fn store_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if let Some(code) = db.code() {
            if code == SQLSTATE_LOCK_NOT_AVAILABLE || code == SQLSTATE_QUERY_CANCELED {
                return StoreError::LockTimeout(db.message().to_string());
            }
        }
    }
    StoreError::Backend(e.to_string())
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgOrderStore {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Checkout transaction
// ---------------------------------------------------------------------------

struct PgCheckoutTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CheckoutStore for PgOrderStore {
    async fn begin(&self) -> Result<Box<dyn CheckoutTx>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query("select set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        Ok(Box::new(PgCheckoutTx { tx }))
    }
}

#[async_trait]
impl CheckoutTx for PgCheckoutTx {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<LockedProduct>, StoreError> {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();

        let rows = sqlx::query(
            r#"
            select id, price, stock
            from products
            where id = any($1)
            order by id
            for update
            "#,
        )
        .bind(&raw[..])
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(LockedProduct {
                id: ProductId(row.try_get("id").map_err(store_err)?),
                price: row.try_get("price").map_err(store_err)?,
                stock: row.try_get("stock").map_err(store_err)?,
            });
        }
        debug!(requested = ids.len(), locked = out.len(), "product rows locked");
        Ok(out)
    }

    async fn insert_order(
        &mut self,
        user: UserId,
        status: OrderStatus,
        total_amount: Decimal,
    ) -> Result<OrderHeader, StoreError> {
        let row = sqlx::query(
            r#"
            insert into orders (user_id, status, total_amount)
            values ($1, $2, $3)
            returning id, created_at
            "#,
        )
        .bind(user.0)
        .bind(status.as_str())
        .bind(total_amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(store_err)?;

        Ok(OrderHeader {
            id: OrderId(row.try_get("id").map_err(store_err)?),
            created_at: row.try_get("created_at").map_err(store_err)?,
        })
    }

    async fn insert_line(&mut self, order_id: OrderId, line: &PricedLine) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            insert into order_items (order_id, product_id, quantity, unit_price)
            values ($1, $2, $3, $4)
            "#,
        )
        .bind(order_id.0)
        .bind(line.product_id.0)
        .bind(line.quantity.get())
        .bind(line.unit_price)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn decrement_stock(&mut self, id: ProductId, qty: Quantity) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            update products
            set stock = stock - $1,
                updated_at = now()
            where id = $2
              and stock >= $1
            "#,
        )
        .bind(qty.get())
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        Ok(res.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(store_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(store_err)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<OrderRecord, StoreError> {
    let status: String = row.try_get("status").map_err(store_err)?;
    let status = OrderStatus::parse(&status)
        .ok_or_else(|| StoreError::Backend(format!("unknown order status in db: {status}")))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(store_err)?;

    Ok(OrderRecord {
        id: OrderId(row.try_get("id").map_err(store_err)?),
        user_id: UserId(row.try_get("user_id").map_err(store_err)?),
        status,
        total_amount: row.try_get("total_amount").map_err(store_err)?,
        created_at,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
        items: Vec::new(),
    })
}

impl PgOrderStore {
    async fn fetch_lines(&self, order_ids: &[i64]) -> Result<Vec<OrderLineRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            select oi.id, oi.order_id, oi.product_id, p.name as product_name,
                   oi.quantity, oi.unit_price
            from order_items oi
            join products p on p.id = oi.product_id
            where oi.order_id = any($1)
            order by oi.order_id, oi.product_id
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(OrderLineRecord {
                id: row.try_get("id").map_err(store_err)?,
                order_id: OrderId(row.try_get("order_id").map_err(store_err)?),
                product_id: ProductId(row.try_get("product_id").map_err(store_err)?),
                product_name: row.try_get("product_name").map_err(store_err)?,
                quantity: row.try_get("quantity").map_err(store_err)?,
                unit_price: row.try_get("unit_price").map_err(store_err)?,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl OrderLedger for PgOrderStore {
    async fn fetch_order(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            select id, user_id, status, total_amount, created_at, updated_at
            from orders
            where id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = order_from_row(&row)?;
        order.items = self.fetch_lines(&[id.0]).await?;
        Ok(Some(order))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            select id, user_id, status, total_amount, created_at, updated_at
            from orders
            where ($1::bigint is null or user_id = $1)
            order by created_at desc, id desc
            "#,
        )
        .bind(filter.user.map(|u| u.0))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        if filter.include_items && !orders.is_empty() {
            let ids: Vec<i64> = orders.iter().map(|o| o.id.0).collect();
            let mut by_order: BTreeMap<OrderId, Vec<OrderLineRecord>> = BTreeMap::new();
            for line in self.fetch_lines(&ids).await? {
                by_order.entry(line.order_id).or_default().push(line);
            }
            for order in &mut orders {
                order.items = by_order.remove(&order.id).unwrap_or_default();
            }
        }
        Ok(orders)
    }

    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            update orders
            set status = $1,
                updated_at = now()
            where id = $2
            "#,
        )
        .bind(status.as_str())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(res.rows_affected() == 1)
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool, StoreError> {
        // order_items go with it (on delete cascade).
        let res = sqlx::query("delete from orders where id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(res.rows_affected() == 1)
    }
}
