//! Domain events
//!
//! Published best-effort on the NATS stream after a mutation commits. Events
//! are advisory for downstream consumers and never part of the store's
//! transactional unit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartEvent {
    ItemAdded { cart_id: Uuid, variation_id: Uuid, quantity: u32 },
    ItemUpdated { cart_id: Uuid, item_id: Uuid, quantity: u32 },
    ItemRemoved { cart_id: Uuid, item_id: Uuid },
    Cleared { cart_id: Uuid },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Decimal },
}

impl DomainEvent {
    /// NATS subject this event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Cart(CartEvent::ItemAdded { .. }) => "carts.item_added",
            Self::Cart(CartEvent::ItemUpdated { .. }) => "carts.item_updated",
            Self::Cart(CartEvent::ItemRemoved { .. }) => "carts.item_removed",
            Self::Cart(CartEvent::Cleared { .. }) => "carts.cleared",
            Self::Order(OrderEvent::Placed { .. }) => "orders.placed",
        }
    }
}
