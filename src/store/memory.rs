//! In-memory store backend.
//!
//! One `RwLock` over the whole state: every mutating operation holds the
//! write lock for its full duration, which makes `check_and_decrement`,
//! `transition` and `merge_item` serializable with respect to each other.
//! Used by the test suites and by DB-less runs of the service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartStatus, Order, ProductVariation};
use crate::domain::value_objects::Money;
use crate::error::{Error, Result};
use crate::store::{
    Authenticator, CartStore, CatalogStore, OrderStore, StockDecrement, UserDirectory, UserRecord,
};

#[derive(Default)]
struct Inner {
    variations: HashMap<Uuid, ProductVariation>,
    carts: HashMap<Uuid, Cart>,
    orders: Vec<Order>,
    users: HashMap<Uuid, UserRecord>,
    tokens: HashMap<String, Uuid>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| Error::Store("store lock poisoned (read)".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| Error::Store("store lock poisoned (write)".into()))
    }

    /// Register a directory user with an API token. Seeding helper for
    /// tests and DB-less runs.
    pub fn add_user(&self, email: &str, is_admin: bool, token: &str) -> Result<UserRecord> {
        let record = UserRecord { id: Uuid::new_v4(), email: email.to_string(), is_admin };
        let mut inner = self.write()?;
        inner.tokens.insert(token.to_string(), record.id);
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    /// Current stock for a variation; test inspection helper.
    pub fn stock_of(&self, variation_id: Uuid) -> Result<Option<u32>> {
        Ok(self.read()?.variations.get(&variation_id).map(|v| v.stock.value()))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn variation(&self, id: Uuid) -> Result<Option<ProductVariation>> {
        Ok(self.read()?.variations.get(&id).cloned())
    }

    async fn check_and_decrement(&self, id: Uuid, amount: u32) -> Result<StockDecrement> {
        let mut inner = self.write()?;
        let Some(variation) = inner.variations.get_mut(&id) else {
            return Ok(StockDecrement::Missing);
        };
        match variation.decrement_stock(amount) {
            Ok(remaining) => Ok(StockDecrement::Applied { remaining }),
            Err(Error::InsufficientStock { available, .. }) => {
                Ok(StockDecrement::Insufficient { available })
            }
            Err(other) => Err(other),
        }
    }

    async fn restock(&self, id: Uuid, amount: u32) -> Result<()> {
        let mut inner = self.write()?;
        let variation = inner
            .variations
            .get_mut(&id)
            .ok_or(Error::VariationNotFound { variation_id: id })?;
        variation.restock(amount);
        Ok(())
    }

    async fn insert_variation(&self, variation: &ProductVariation) -> Result<()> {
        self.write()?.variations.insert(variation.id, variation.clone());
        Ok(())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn get_or_create_active(&self, user_id: Uuid, currency: &str) -> Result<Cart> {
        let mut inner = self.write()?;
        if let Some(cart) = inner
            .carts
            .values()
            .find(|c| c.user_id() == user_id && c.status() == CartStatus::Active)
        {
            return Ok(cart.clone());
        }
        let cart = Cart::new_for_user(user_id, currency);
        inner.carts.insert(cart.id(), cart.clone());
        Ok(cart)
    }

    async fn active_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
        Ok(self
            .read()?
            .carts
            .values()
            .find(|c| c.user_id() == user_id && c.status() == CartStatus::Active)
            .cloned())
    }

    async fn current_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
        let inner = self.read()?;
        let active = inner
            .carts
            .values()
            .find(|c| c.user_id() == user_id && c.status() == CartStatus::Active);
        if let Some(cart) = active {
            return Ok(Some(cart.clone()));
        }
        Ok(inner
            .carts
            .values()
            .filter(|c| c.user_id() == user_id)
            .max_by_key(|c| c.updated_at())
            .cloned())
    }

    async fn merge_item(
        &self,
        cart_id: Uuid,
        variation_id: Uuid,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Cart> {
        let mut inner = self.write()?;
        let cart = inner.carts.get_mut(&cart_id).ok_or(Error::CartNotFound)?;
        cart.merge_item(variation_id, quantity, unit_price)?;
        Ok(cart.clone())
    }

    async fn set_item_quantity(&self, cart_id: Uuid, item_id: Uuid, quantity: u32) -> Result<Cart> {
        let mut inner = self.write()?;
        let cart = inner.carts.get_mut(&cart_id).ok_or(Error::CartNotFound)?;
        cart.set_item_quantity(item_id, quantity)?;
        Ok(cart.clone())
    }

    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<Cart> {
        let mut inner = self.write()?;
        let cart = inner.carts.get_mut(&cart_id).ok_or(Error::CartNotFound)?;
        cart.remove_item(item_id)?;
        Ok(cart.clone())
    }

    async fn clear(&self, cart_id: Uuid) -> Result<Cart> {
        let mut inner = self.write()?;
        let cart = inner.carts.get_mut(&cart_id).ok_or(Error::CartNotFound)?;
        cart.clear()?;
        Ok(cart.clone())
    }

    async fn transition(&self, cart_id: Uuid, from: CartStatus, to: CartStatus) -> Result<bool> {
        let mut inner = self.write()?;
        let cart = inner.carts.get_mut(&cart_id).ok_or(Error::CartNotFound)?;
        Ok(cart.transition(from, to))
    }

    async fn detach_items(&self, cart_id: Uuid) -> Result<()> {
        let mut inner = self.write()?;
        let cart = inner.carts.get_mut(&cart_id).ok_or(Error::CartNotFound)?;
        cart.detach_items();
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        self.write()?.orders.push(order.clone());
        Ok(())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .read()?
            .orders
            .iter()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let mut orders = self.read()?.orders.clone();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user(&self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.read()?.users.get(&id).cloned())
    }
}

#[async_trait]
impl Authenticator for MemoryStore {
    async fn resolve(&self, bearer: &str) -> Result<Option<Uuid>> {
        Ok(self.read()?.tokens.get(bearer).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Sku;
    use rust_decimal::Decimal;

    async fn seed_variation(store: &MemoryStore, stock: u32) -> Uuid {
        let variation = ProductVariation::new(
            Uuid::new_v4(),
            Sku::new("VAR-MEM").unwrap(),
            Money::new(Decimal::new(10, 0), "USD"),
            stock,
        );
        let id = variation.id;
        store.insert_variation(&variation).await.unwrap();
        id
    }

    #[tokio::test]
    async fn check_and_decrement_is_exact() {
        let store = MemoryStore::new();
        let id = seed_variation(&store, 5).await;
        assert_eq!(
            store.check_and_decrement(id, 3).await.unwrap(),
            StockDecrement::Applied { remaining: 2 }
        );
        assert_eq!(
            store.check_and_decrement(id, 3).await.unwrap(),
            StockDecrement::Insufficient { available: 2 }
        );
        assert_eq!(store.stock_of(id).unwrap(), Some(2));
    }

    #[tokio::test]
    async fn decrement_of_unknown_variation_is_missing() {
        let store = MemoryStore::new();
        assert_eq!(
            store.check_and_decrement(Uuid::new_v4(), 1).await.unwrap(),
            StockDecrement::Missing
        );
    }

    #[tokio::test]
    async fn one_active_cart_per_user() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = store.get_or_create_active(user, "USD").await.unwrap();
        let second = store.get_or_create_active(user, "USD").await.unwrap();
        assert_eq!(first.id(), second.id());
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let cart = store.get_or_create_active(user, "USD").await.unwrap();
        assert!(store
            .transition(cart.id(), CartStatus::Active, CartStatus::Converted)
            .await
            .unwrap());
        // second claim loses
        assert!(!store
            .transition(cart.id(), CartStatus::Active, CartStatus::Converted)
            .await
            .unwrap());
        // and the user has no active cart anymore
        assert!(store.active_cart(user).await.unwrap().is_none());
    }
}
