//! `shop product ...` handlers. Seeding and external restocking only; the
//! catalog itself is served elsewhere.

use anyhow::{anyhow, bail, Result};
use rust_decimal::Decimal;
use shop_checkout::ProductId;
use shop_config::Settings;
use shop_db::NewProduct;

use super::connect;

pub async fn product_add(settings: &Settings, name: String, price: Decimal, stock: i32) -> Result<()> {
    if name.trim().is_empty() {
        bail!("--name must not be empty");
    }
    let pool = connect(settings).await?;
    let id = shop_db::insert_product(&pool, &NewProduct { name, price, stock }).await?;
    println!("product_id={id}");
    Ok(())
}

pub async fn product_show(settings: &Settings, id: i64) -> Result<()> {
    let pool = connect(settings).await?;
    let p = shop_db::fetch_product(&pool, ProductId(id))
        .await?
        .ok_or_else(|| anyhow!("product {id} not found"))?;
    println!("product_id={}", p.id);
    println!("name={}", p.name);
    println!("price={}", p.price);
    println!("stock={}", p.stock);
    Ok(())
}

pub async fn product_restock(settings: &Settings, id: i64, qty: i32) -> Result<()> {
    if qty <= 0 {
        bail!("invalid --qty {qty}: must be > 0");
    }
    let pool = connect(settings).await?;
    if !shop_db::restock_product(&pool, ProductId(id), qty).await? {
        bail!("product {id} not found");
    }
    let p = shop_db::fetch_product(&pool, ProductId(id))
        .await?
        .ok_or_else(|| anyhow!("product {id} not found"))?;
    println!("product_id={}", p.id);
    println!("stock={}", p.stock);
    Ok(())
}
