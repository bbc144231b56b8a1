use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CheckoutError;

/// Largest integer a JSON client can represent exactly as a float.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Product primary key. Always positive once constructed through the cart.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated caller identity, as resolved by the session layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested unit count for one product. Always > 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(i32);

impl Quantity {
    pub fn new(n: i32) -> Option<Self> {
        (n > 0).then_some(Self(n))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Raw request shape
// ---------------------------------------------------------------------------

/// One cart line exactly as the client sent it.
///
/// Fields stay as raw JSON so that validation can name the offending value
/// instead of failing inside the deserializer.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RawCartItem {
    #[serde(default)]
    pub product_id: Value,
    #[serde(default)]
    pub quantity: Value,
}

impl RawCartItem {
    pub fn new(product_id: impl Into<Value>, quantity: impl Into<Value>) -> Self {
        Self {
            product_id: product_id.into(),
            quantity: quantity.into(),
        }
    }

    /// Non-object entries become an item with null fields and fail validation.
    fn from_json(v: &Value) -> Self {
        Self {
            product_id: v.get("product_id").cloned().unwrap_or(Value::Null),
            quantity: v.get("quantity").cloned().unwrap_or(Value::Null),
        }
    }
}

/// Extract the `items` array from a checkout request body.
pub fn parse_items_payload(body: &Value) -> Result<Vec<RawCartItem>, CheckoutError> {
    let items = match body.get("items") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(CheckoutError::InvalidItem("cart has no items".to_string())),
    };
    Ok(items.iter().map(RawCartItem::from_json).collect())
}

// ---------------------------------------------------------------------------
// Validated cart
// ---------------------------------------------------------------------------

/// A validated cart: distinct product ids (ascending) with merged quantities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cart {
    lines: BTreeMap<ProductId, Quantity>,
}

impl Cart {
    /// Distinct product ids in ascending order (the row-lock order).
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.lines.keys().copied().collect()
    }

    pub fn quantity_of(&self, id: ProductId) -> Option<Quantity> {
        self.lines.get(&id).copied()
    }

    pub fn lines(&self) -> impl Iterator<Item = (ProductId, Quantity)> + '_ {
        self.lines.iter().map(|(id, q)| (*id, *q))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Validate every raw line and merge duplicates by product id.
///
/// One bad line rejects the whole cart; nothing is partially accepted.
pub fn normalize_cart(items: &[RawCartItem]) -> Result<Cart, CheckoutError> {
    if items.is_empty() {
        return Err(CheckoutError::InvalidItem("cart has no items".to_string()));
    }

    let mut lines: BTreeMap<ProductId, Quantity> = BTreeMap::new();
    for item in items {
        let pid = positive_integer(&item.product_id).ok_or_else(|| {
            CheckoutError::InvalidItem(format!("invalid product_id: {}", describe(&item.product_id)))
        })?;
        let pid = ProductId(pid);

        let qty = positive_integer(&item.quantity)
            .and_then(|n| i32::try_from(n).ok())
            .and_then(Quantity::new)
            .ok_or_else(|| {
                CheckoutError::InvalidItem(format!(
                    "invalid quantity for product_id {pid}: {}",
                    describe(&item.quantity)
                ))
            })?;

        let merged = match lines.get(&pid) {
            None => qty,
            Some(prev) => prev
                .get()
                .checked_add(qty.get())
                .and_then(Quantity::new)
                .ok_or_else(|| {
                    CheckoutError::InvalidItem(format!("quantity overflow for product_id {pid}"))
                })?,
        };
        lines.insert(pid, merged);
    }

    Ok(Cart { lines })
}

/// Accepts JSON integers, integral floats and numeric strings; > 0 only.
fn positive_integer(v: &Value) -> Option<i64> {
    let n = match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }?;
    (n > 0).then_some(n)
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER).then_some(f as i64)
}

fn describe(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_duplicate_lines_by_summing() {
        let cart = normalize_cart(&[RawCartItem::new(1, 2), RawCartItem::new(1, 3)]).unwrap();
        let single = normalize_cart(&[RawCartItem::new(1, 5)]).unwrap();
        assert_eq!(cart, single);
        assert_eq!(cart.quantity_of(ProductId(1)).map(Quantity::get), Some(5));
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn product_ids_are_ascending_and_distinct() {
        let cart = normalize_cart(&[
            RawCartItem::new(9, 1),
            RawCartItem::new(3, 1),
            RawCartItem::new(9, 1),
            RawCartItem::new(5, 2),
        ])
        .unwrap();
        assert_eq!(
            cart.product_ids(),
            vec![ProductId(3), ProductId(5), ProductId(9)]
        );
    }

    #[test]
    fn accepts_numeric_strings_and_integral_floats() {
        let cart = normalize_cart(&[
            RawCartItem::new("7", json!(2.0)),
            RawCartItem::new(json!(8.0), " 3 "),
        ])
        .unwrap();
        assert_eq!(cart.quantity_of(ProductId(7)).map(Quantity::get), Some(2));
        assert_eq!(cart.quantity_of(ProductId(8)).map(Quantity::get), Some(3));
    }

    #[test]
    fn one_bad_line_rejects_the_whole_cart() {
        let err = normalize_cart(&[RawCartItem::new(1, 1), RawCartItem::new(-4, 1)]).unwrap_err();
        assert_eq!(
            err,
            CheckoutError::InvalidItem("invalid product_id: -4".to_string())
        );
    }

    #[test]
    fn rejects_zero_fractional_and_missing_quantities() {
        for bad in [json!(0), json!(1.5), Value::Null, json!("two"), json!(true)] {
            let err = normalize_cart(&[RawCartItem::new(3, bad.clone())]).unwrap_err();
            match err {
                CheckoutError::InvalidItem(detail) => {
                    assert!(detail.starts_with("invalid quantity for product_id 3"), "{detail}")
                }
                other => panic!("expected InvalidItem for {bad}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_quantity_outside_i32() {
        let err = normalize_cart(&[RawCartItem::new(1, json!(3_000_000_000i64))]).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidItem(_)));
    }

    #[test]
    fn merged_overflow_is_invalid_item() {
        let err = normalize_cart(&[
            RawCartItem::new(1, i32::MAX),
            RawCartItem::new(1, 1),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            CheckoutError::InvalidItem("quantity overflow for product_id 1".to_string())
        );
    }

    #[test]
    fn empty_cart_is_invalid() {
        assert!(matches!(
            normalize_cart(&[]),
            Err(CheckoutError::InvalidItem(_))
        ));
    }

    #[test]
    fn payload_requires_non_empty_items_array() {
        for body in [json!({}), json!({"items": []}), json!({"items": "x"}), json!(null)] {
            assert_eq!(
                parse_items_payload(&body).unwrap_err(),
                CheckoutError::InvalidItem("cart has no items".to_string())
            );
        }

        let items = parse_items_payload(&json!({"items": [{"product_id": 4, "quantity": 1}, 17]}))
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], RawCartItem::new(4, 1));
        assert_eq!(items[1], RawCartItem::default());
    }
}
