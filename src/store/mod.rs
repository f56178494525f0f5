//! Store traits.
//!
//! Every collaborator the engine touches is an explicitly constructed,
//! dependency-injected handle behind one of these traits; there is no
//! ambient global store. Two backends ship with the crate: an in-memory one
//! (tests, DB-less runs) and a Postgres one.
//!
//! Each backend is responsible for serializing conflicting writes to the
//! same variation's stock (`check_and_decrement`) and to the same cart's
//! status (`transition`); the conversion engine composes those primitives
//! and never performs a read-modify-write across the store boundary.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartStatus, Order, ProductVariation};
use crate::domain::value_objects::Money;
use crate::error::Result;

/// Outcome of an atomic compare-and-decrement on one variation's stock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StockDecrement {
    Applied { remaining: u32 },
    Insufficient { available: u32 },
    Missing,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn variation(&self, id: Uuid) -> Result<Option<ProductVariation>>;

    /// Atomically verify `stock >= amount` and subtract it, as one
    /// serializable step per variation.
    async fn check_and_decrement(&self, id: Uuid, amount: u32) -> Result<StockDecrement>;

    /// Add stock back; receiving inventory and conversion compensation.
    async fn restock(&self, id: Uuid, amount: u32) -> Result<()>;

    async fn insert_variation(&self, variation: &ProductVariation) -> Result<()>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// The user's Active cart, creating one if none exists. Must preserve
    /// the at-most-one-Active-cart-per-user invariant under concurrency.
    async fn get_or_create_active(&self, user_id: Uuid, currency: &str) -> Result<Cart>;

    async fn active_cart(&self, user_id: Uuid) -> Result<Option<Cart>>;

    /// The cart `place_order` should consider: the Active cart when one
    /// exists, otherwise the user's most recently updated cart of any
    /// status (so a repeat submission of a converted cart is observable).
    async fn current_cart(&self, user_id: Uuid) -> Result<Option<Cart>>;

    /// Atomic merge-on-add: quantities for an existing line with the same
    /// variation are summed, not duplicated. Returns the updated cart.
    async fn merge_item(
        &self,
        cart_id: Uuid,
        variation_id: Uuid,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Cart>;

    /// Set a line's quantity; zero removes the line.
    async fn set_item_quantity(&self, cart_id: Uuid, item_id: Uuid, quantity: u32) -> Result<Cart>;

    /// Idempotent removal.
    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<Cart>;

    /// Idempotent clear.
    async fn clear(&self, cart_id: Uuid) -> Result<Cart>;

    /// Compare-and-set on the cart's status. `false` means the cart was not
    /// in `from` (somebody else won); no write happens in that case.
    async fn transition(&self, cart_id: Uuid, from: CartStatus, to: CartStatus) -> Result<bool>;

    /// Strip a converted cart of its lines so it can never be re-submitted.
    async fn detach_items(&self, cart_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Newest first.
    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;

    /// Newest first, every owner. Authorization happens above this layer.
    async fn all_orders(&self) -> Result<Vec<Order>>;
}

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user(&self, id: Uuid) -> Result<Option<UserRecord>>;
}

/// Resolves a pre-validated bearer credential to an account id. The core
/// never parses credentials itself.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn resolve(&self, bearer: &str) -> Result<Option<Uuid>>;
}
