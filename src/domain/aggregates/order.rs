//! Order Aggregate
//!
//! Orders are write-once: every field is snapshotted from the cart at
//! conversion time, so later catalog or cart mutations never reach back into
//! a placed order. There are no mutating operations on purpose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::cart::Cart;
use crate::domain::value_objects::Money;
use crate::error::Error;

/// Fulfillment beyond `Placed` is handled by downstream services.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placed => "placed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "placed" => Some(Self::Placed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub variation_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    status: OrderStatus,
    items: Vec<OrderItem>,
    total: Money,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Snapshot a cart into an order. The cart is read, not consumed; the
    /// caller transitions the cart separately as part of the conversion unit.
    pub fn from_cart(cart: &Cart, order_number: String) -> Result<Self, Error> {
        if cart.is_empty() {
            return Err(Error::EmptyCart);
        }
        let items = cart
            .items()
            .iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4(),
                variation_id: line.variation_id,
                quantity: line.quantity,
                unit_price: line.unit_price.clone(),
            })
            .collect();
        Ok(Self {
            id: Uuid::new_v4(),
            order_number,
            user_id: cart.user_id(),
            status: OrderStatus::Placed,
            items,
            total: cart.total(),
            created_at: Utc::now(),
        })
    }

    /// Rehydrate an order from stored fields. Store-layer use only.
    pub fn from_parts(
        id: Uuid,
        order_number: String,
        user_id: Uuid,
        status: OrderStatus,
        items: Vec<OrderItem>,
        total: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { id, order_number, user_id, status, items, total, created_at }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total(&self) -> &Money {
        &self.total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn price(units: i64) -> Money {
        Money::new(Decimal::new(units, 0), "USD")
    }

    #[test]
    fn snapshot_copies_lines_and_total() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        let variation = Uuid::new_v4();
        cart.merge_item(variation, 3, price(12)).unwrap();

        let order = Order::from_cart(&cart, "ORD-00000001".into()).unwrap();
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].variation_id, variation);
        assert_eq!(order.items()[0].quantity, 3);
        assert_eq!(order.total().amount(), Decimal::new(36, 0));
        assert_eq!(order.status(), OrderStatus::Placed);
    }

    #[test]
    fn snapshot_is_decoupled_from_later_cart_mutations() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        let item = cart.merge_item(Uuid::new_v4(), 2, price(10)).unwrap();
        let order = Order::from_cart(&cart, "ORD-00000002".into()).unwrap();

        cart.set_item_quantity(item, 9).unwrap();
        assert_eq!(order.items()[0].quantity, 2);
        assert_eq!(order.total().amount(), Decimal::new(20, 0));
    }

    #[test]
    fn empty_cart_cannot_become_an_order() {
        let cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        assert!(matches!(Order::from_cart(&cart, "ORD-0".into()), Err(Error::EmptyCart)));
    }
}
