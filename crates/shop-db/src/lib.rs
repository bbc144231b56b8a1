use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::Row;
use sqlx::{postgres::PgPoolOptions, PgPool};

use shop_checkout::ProductId;

mod orders;

pub use orders::PgOrderStore;

pub const ENV_DB_URL: &str = "SHOP_DATABASE_URL";

/// Connect to Postgres with an explicit URL.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Connect to Postgres using SHOP_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_orders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

// ---------------------------------------------------------------------------
// Product tooling (seeding / external restocking)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRow {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

pub async fn insert_product(pool: &PgPool, p: &NewProduct) -> Result<ProductId> {
    if p.price.is_sign_negative() {
        return Err(anyhow!("product price must be >= 0 (got {})", p.price));
    }
    if p.stock < 0 {
        return Err(anyhow!("product stock must be >= 0 (got {})", p.stock));
    }

    let (id,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into products (name, price, stock)
        values ($1, $2, $3)
        returning id
        "#,
    )
    .bind(&p.name)
    .bind(p.price)
    .bind(p.stock)
    .fetch_one(pool)
    .await
    .context("insert_product failed")?;

    Ok(ProductId(id))
}

pub async fn fetch_product(pool: &PgPool, id: ProductId) -> Result<Option<ProductRow>> {
    let row = sqlx::query(
        r#"
        select id, name, price, stock
        from products
        where id = $1
        "#,
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await
    .context("fetch_product failed")?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(ProductRow {
        id: ProductId(row.try_get("id")?),
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        stock: row.try_get("stock")?,
    }))
}

/// Add stock to a product. The update takes the row lock, so it queues behind
/// any checkout holding the row. Returns false when the product does not exist.
pub async fn restock_product(pool: &PgPool, id: ProductId, qty: i32) -> Result<bool> {
    if qty <= 0 {
        return Err(anyhow!("restock quantity must be > 0 (got {qty})"));
    }

    let res = sqlx::query(
        r#"
        update products
        set stock = stock + $1,
            updated_at = now()
        where id = $2
        "#,
    )
    .bind(qty)
    .bind(id.0)
    .execute(pool)
    .await
    .context("restock_product failed")?;

    Ok(res.rows_affected() == 1)
}
