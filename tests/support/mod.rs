//! Shared fixtures for the integration suites: services wired over the
//! in-memory store backend.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use storefront::domain::aggregates::ProductVariation;
use storefront::domain::value_objects::{Money, Sku};
use storefront::service::{CartService, CheckoutService, OrderQueryService};
use storefront::store::memory::MemoryStore;
use storefront::store::CatalogStore;

pub struct Harness {
    pub store: MemoryStore,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderQueryService>,
}

pub fn harness() -> Harness {
    let store = MemoryStore::new();
    let shared = Arc::new(store.clone());
    Harness {
        cart: Arc::new(CartService::new(shared.clone(), shared.clone(), "USD")),
        checkout: Arc::new(CheckoutService::new(shared.clone(), shared.clone(), shared.clone())),
        orders: Arc::new(OrderQueryService::new(shared.clone(), shared)),
        store,
    }
}

pub async fn seed_variation(
    store: &MemoryStore,
    sku: &str,
    price_units: i64,
    stock: u32,
) -> ProductVariation {
    let variation = ProductVariation::new(
        Uuid::new_v4(),
        Sku::new(sku).unwrap(),
        Money::new(Decimal::new(price_units, 0), "USD"),
        stock,
    );
    store.insert_variation(&variation).await.unwrap();
    variation
}
