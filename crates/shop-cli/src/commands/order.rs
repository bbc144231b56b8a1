//! `shop order ...` handlers.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use shop_checkout::{
    normalize_cart, CheckoutEngine, OrderFilter, OrderId, OrderLedger, OrderRecord, OrderStatus,
    RawCartItem, Settlement, UserId,
};
use shop_config::Settings;
use shop_db::PgOrderStore;

use super::connect;

/// Parse one `--item <product_id>:<quantity>` argument.
///
/// Only the shape is checked here; value rules (positive ids/quantities,
/// overflow on merge) belong to `normalize_cart`.
pub fn parse_item_arg(raw: &str) -> Result<RawCartItem> {
    let (pid, qty) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid --item '{raw}': expected <product_id>:<quantity>"))?;
    let pid: i64 = pid
        .trim()
        .parse()
        .with_context(|| format!("invalid --item '{raw}': product_id is not an integer"))?;
    let qty: i64 = qty
        .trim()
        .parse()
        .with_context(|| format!("invalid --item '{raw}': quantity is not an integer"))?;
    Ok(RawCartItem::new(pid, qty))
}

fn store(settings: &Settings, pool: sqlx::PgPool) -> PgOrderStore {
    PgOrderStore::new(pool, settings.database.lock_timeout_ms)
}

// ---------------------------------------------------------------------------
// order place
// ---------------------------------------------------------------------------

pub async fn order_place(settings: &Settings, user: i64, item_args: &[String]) -> Result<()> {
    if user <= 0 {
        bail!("invalid --user {user}: must be a positive integer");
    }
    let items = item_args
        .iter()
        .map(|a| parse_item_arg(a))
        .collect::<Result<Vec<_>>>()?;
    // Reject bad carts before touching the database.
    normalize_cart(&items)?;

    let settlement = Settlement::parse(&settings.checkout.settlement)
        .ok_or_else(|| anyhow!("unknown settlement '{}'", settings.checkout.settlement))?;

    let pool = connect(settings).await?;
    let engine = CheckoutEngine::new(Arc::new(store(settings, pool)), settlement);

    let placed = engine.place_order(Some(UserId(user)), &items).await?;

    println!("order_id={}", placed.id);
    println!("user_id={}", placed.user_id);
    println!("status={}", placed.status);
    println!("total_amount={}", placed.total_amount);
    for line in &placed.lines {
        println!(
            "line product_id={} quantity={} unit_price={} line_total={}",
            line.product_id,
            line.quantity.get(),
            line.unit_price,
            line.line_total
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// order show / list
// ---------------------------------------------------------------------------

fn print_order(o: &OrderRecord) {
    println!(
        "order_id={} user_id={} status={} total_amount={} created_at={}",
        o.id,
        o.user_id,
        o.status,
        o.total_amount,
        o.created_at.to_rfc3339()
    );
    for it in &o.items {
        println!(
            "  item product_id={} name={:?} quantity={} unit_price={}",
            it.product_id, it.product_name, it.quantity, it.unit_price
        );
    }
}

pub async fn order_show(settings: &Settings, id: i64) -> Result<()> {
    let pool = connect(settings).await?;
    let order = store(settings, pool)
        .fetch_order(OrderId(id))
        .await?
        .ok_or_else(|| anyhow!("order {id} not found"))?;
    print_order(&order);
    Ok(())
}

pub async fn order_list(settings: &Settings, user: Option<i64>, include_items: bool) -> Result<()> {
    let pool = connect(settings).await?;
    let filter = OrderFilter {
        user: user.map(UserId),
        include_items,
    };
    let orders = store(settings, pool).list_orders(&filter).await?;
    println!("orders={}", orders.len());
    for o in &orders {
        print_order(o);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// order set-status / delete
// ---------------------------------------------------------------------------

pub async fn order_set_status(settings: &Settings, id: i64, status: &str) -> Result<()> {
    let status = OrderStatus::parse(status)
        .ok_or_else(|| anyhow!("invalid --status '{status}'. expected one of: pending | paid"))?;

    let pool = connect(settings).await?;
    if !store(settings, pool)
        .set_order_status(OrderId(id), status)
        .await?
    {
        bail!("order {id} not found");
    }
    println!("order_id={id}");
    println!("status={status}");
    Ok(())
}

pub async fn order_delete(settings: &Settings, id: i64) -> Result<()> {
    let pool = connect(settings).await?;
    if !store(settings, pool).delete_order(OrderId(id)).await? {
        bail!("order {id} not found");
    }
    println!("order_id={id}");
    println!("deleted=true");
    Ok(())
}
