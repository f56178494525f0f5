//! Cart Aggregate
//!
//! A cart is the mutable half of the purchase lifecycle: lines merge, change
//! and disappear freely while the cart is `Active`. Conversion flips it to
//! `Converted` exactly once and detaches the lines; after that the cart is
//! inert history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Money;
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Active,
    Converted,
    Abandoned,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Converted => "converted",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "converted" => Some(Self::Converted),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub variation_id: Uuid,
    pub quantity: u32,
    /// Price captured when the line was added. Authoritative for a pending
    /// cart; re-validated against the catalog only at conversion.
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    id: Uuid,
    user_id: Uuid,
    status: CartStatus,
    items: Vec<CartItem>,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new_for_user(user_id: Uuid, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            status: CartStatus::Active,
            items: vec![],
            currency: currency.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate a cart from stored fields. Store-layer use only.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        user_id: Uuid,
        status: CartStatus,
        items: Vec<CartItem>,
        currency: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, user_id, status, items, currency, created_at, updated_at }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn status(&self) -> CartStatus {
        self.status
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find_item(&self, item_id: Uuid) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Sum of line totals. Always recomputed, never stored.
    pub fn total(&self) -> Money {
        self.items
            .iter()
            .fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()).unwrap_or(acc))
    }

    /// Add a line, merging quantities with an existing line for the same
    /// variation instead of duplicating it. Returns the id of the touched line.
    pub fn merge_item(&mut self, variation_id: Uuid, quantity: u32, unit_price: Money) -> Result<Uuid, Error> {
        if quantity == 0 {
            return Err(Error::InvalidQuantity { quantity: 0 });
        }
        self.ensure_active()?;
        let id = if let Some(existing) = self.items.iter_mut().find(|i| i.variation_id == variation_id) {
            existing.quantity = existing.quantity.saturating_add(quantity);
            existing.id
        } else {
            let item = CartItem { id: Uuid::new_v4(), variation_id, quantity, unit_price };
            let id = item.id;
            self.items.push(item);
            id
        };
        self.touch();
        Ok(id)
    }

    /// Set a line's quantity. Zero removes the line.
    pub fn set_item_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<(), Error> {
        self.ensure_active()?;
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(Error::ItemNotFound { item_id })?;
        if quantity == 0 {
            self.items.retain(|i| i.id != item_id);
        } else {
            item.quantity = quantity;
        }
        self.touch();
        Ok(())
    }

    /// Remove a line. Removing an absent line is not an error.
    pub fn remove_item(&mut self, item_id: Uuid) -> Result<bool, Error> {
        self.ensure_active()?;
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        let removed = self.items.len() != before;
        if removed {
            self.touch();
        }
        Ok(removed)
    }

    /// Drop every line. Clearing an empty cart is a no-op, not an error.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.ensure_active()?;
        if !self.items.is_empty() {
            self.items.clear();
            self.touch();
        }
        Ok(())
    }

    /// Compare-and-set on the status field. Returns false (and writes
    /// nothing) when the cart is not in `from`.
    pub fn transition(&mut self, from: CartStatus, to: CartStatus) -> bool {
        if self.status != from {
            return false;
        }
        self.status = to;
        self.touch();
        true
    }

    /// Active -> Converted. The one-way door of the lifecycle; callers that
    /// lose the race get `AlreadyConverted`.
    pub fn mark_converted(&mut self) -> Result<(), Error> {
        match self.status {
            CartStatus::Active => {
                self.transition(CartStatus::Active, CartStatus::Converted);
                Ok(())
            }
            CartStatus::Converted => Err(Error::AlreadyConverted),
            CartStatus::Abandoned => Err(Error::EmptyCart),
        }
    }

    /// Take the lines off a converted cart so it can never be re-submitted.
    pub fn detach_items(&mut self) -> Vec<CartItem> {
        self.touch();
        std::mem::take(&mut self.items)
    }

    fn ensure_active(&self) -> Result<(), Error> {
        match self.status {
            CartStatus::Active => Ok(()),
            CartStatus::Converted => Err(Error::AlreadyConverted),
            CartStatus::Abandoned => Err(Error::CartNotFound),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
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
    fn merge_sums_quantities_for_same_variation() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        let variation = Uuid::new_v4();
        let first = cart.merge_item(variation, 2, price(10)).unwrap();
        let second = cart.merge_item(variation, 3, price(10)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 5);
    }

    #[test]
    fn distinct_variations_get_distinct_lines() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        cart.merge_item(Uuid::new_v4(), 1, price(10)).unwrap();
        cart.merge_item(Uuid::new_v4(), 1, price(20)).unwrap();
        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.total().amount(), Decimal::new(30, 0));
    }

    #[test]
    fn total_tracks_every_mutation() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        let item = cart.merge_item(Uuid::new_v4(), 2, price(15)).unwrap();
        assert_eq!(cart.total().amount(), Decimal::new(30, 0));
        cart.set_item_quantity(item, 4).unwrap();
        assert_eq!(cart.total().amount(), Decimal::new(60, 0));
        cart.remove_item(item).unwrap();
        assert_eq!(cart.total().amount(), Decimal::ZERO);
    }

    #[test]
    fn zero_quantity_update_removes_the_line() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        let item = cart.merge_item(Uuid::new_v4(), 2, price(10)).unwrap();
        cart.set_item_quantity(item, 0).unwrap();
        assert!(cart.is_empty());
        assert!(cart.total().is_zero());
    }

    #[test]
    fn update_of_unknown_item_is_an_error() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        let missing = Uuid::new_v4();
        assert!(matches!(
            cart.set_item_quantity(missing, 1),
            Err(Error::ItemNotFound { item_id }) if item_id == missing
        ));
    }

    #[test]
    fn remove_and_clear_are_idempotent() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        assert!(!cart.remove_item(Uuid::new_v4()).unwrap());
        cart.clear().unwrap();
        cart.clear().unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn conversion_is_one_way() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        cart.merge_item(Uuid::new_v4(), 1, price(10)).unwrap();
        cart.mark_converted().unwrap();
        assert_eq!(cart.status(), CartStatus::Converted);
        assert!(matches!(cart.mark_converted(), Err(Error::AlreadyConverted)));
        assert!(matches!(cart.merge_item(Uuid::new_v4(), 1, price(10)), Err(Error::AlreadyConverted)));
    }

    #[test]
    fn detached_items_leave_the_cart_empty() {
        let mut cart = Cart::new_for_user(Uuid::new_v4(), "USD");
        cart.merge_item(Uuid::new_v4(), 2, price(10)).unwrap();
        cart.mark_converted().unwrap();
        let items = cart.detach_items();
        assert_eq!(items.len(), 1);
        assert!(cart.is_empty());
    }
}
