//! Display payloads for carts and orders.
//!
//! `PurchaseView` is a tagged sum: consumers branch on the serialized `kind`
//! discriminant, never on which fields happen to be present.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartStatus, Order, OrderStatus};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseView {
    Cart(CartView),
    Order(OrderView),
}

impl PurchaseView {
    pub fn total(&self) -> &Money {
        match self {
            Self::Cart(v) => &v.total,
            Self::Order(v) => &v.total,
        }
    }

    pub fn line_count(&self) -> usize {
        match self {
            Self::Cart(v) => v.lines.len(),
            Self::Order(v) => v.lines.len(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    /// None until the user's first add-to-cart materializes a cart.
    pub id: Option<Uuid>,
    pub status: CartStatus,
    pub lines: Vec<CartLineView>,
    pub total: Money,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartLineView {
    pub item_id: Uuid,
    pub variation_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    /// Soft stock feedback for the UI; never authoritative.
    pub available: Option<u32>,
    pub insufficient: bool,
}

impl CartView {
    pub fn empty(currency: &str) -> Self {
        Self {
            id: None,
            status: CartStatus::Active,
            lines: vec![],
            total: Money::zero(currency),
        }
    }

    pub fn from_cart(cart: &Cart) -> Self {
        Self {
            id: Some(cart.id()),
            status: cart.status(),
            lines: cart
                .items()
                .iter()
                .map(|i| CartLineView {
                    item_id: i.id,
                    variation_id: i.variation_id,
                    quantity: i.quantity,
                    unit_price: i.unit_price.clone(),
                    line_total: i.line_total(),
                    available: None,
                    insufficient: false,
                })
                .collect(),
            total: cart.total(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLineView>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderLineView {
    pub variation_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl OrderView {
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id(),
            order_number: order.order_number().to_string(),
            status: order.status(),
            lines: order
                .items()
                .iter()
                .map(|i| OrderLineView {
                    variation_id: i.variation_id,
                    quantity: i.quantity,
                    unit_price: i.unit_price.clone(),
                    line_total: i.line_total(),
                })
                .collect(),
            total: order.total().clone(),
            created_at: order.created_at(),
        }
    }
}
