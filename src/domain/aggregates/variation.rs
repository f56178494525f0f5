//! Product Variation Aggregate
//!
//! The catalog owns variations; this engine only reads them and moves their
//! stock counters. Stock is a `Quantity`, so a negative count is
//! unrepresentable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductVariation {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: Sku,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub stock: Quantity,
    pub size: Option<String>,
    pub color: Option<String>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductVariation {
    pub fn new(product_id: Uuid, sku: Sku, price: Money, stock: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product_id,
            sku,
            price,
            sale_price: None,
            stock: Quantity::new(stock),
            size: None,
            color: None,
            images: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// The price a cart line captures: the sale price when one is set.
    pub fn effective_price(&self) -> &Money {
        self.sale_price.as_ref().unwrap_or(&self.price)
    }

    pub fn is_in_stock(&self) -> bool {
        !self.stock.is_zero()
    }

    pub fn covers(&self, requested: u32) -> bool {
        self.stock.covers(requested)
    }

    /// Decrement stock by exactly `quantity`. The in-memory store calls this
    /// under its write lock; the whole check-and-decrement is one step.
    pub fn decrement_stock(&mut self, quantity: u32) -> Result<u32, Error> {
        match self.stock.subtract(quantity) {
            Some(remaining) => {
                self.stock = remaining;
                self.touch();
                Ok(remaining.value())
            }
            None => Err(Error::InsufficientStock {
                variation_id: self.id,
                requested: quantity,
                available: self.stock.value(),
            }),
        }
    }

    /// Put stock back, used for receiving inventory and for compensating a
    /// conversion that could not complete.
    pub fn restock(&mut self, quantity: u32) {
        self.stock = self.stock.add(quantity);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
