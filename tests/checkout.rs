//! Conversion engine behavior: the atomic cart-to-order path, oversell
//! prevention, idempotency and the admin listing gate.

mod support;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use storefront::domain::aggregates::{CartStatus, ProductVariation};
use storefront::error::{Error, Result};
use storefront::service::CheckoutService;
use storefront::store::memory::MemoryStore;
use storefront::store::{CatalogStore, StockDecrement};
use support::{harness, seed_variation};

#[tokio::test]
async fn conversion_decrements_stock_and_freezes_the_cart() {
    let h = harness();
    let user = Uuid::new_v4();
    let variation = seed_variation(&h.store, "BOOK-001", 20, 5).await;
    h.cart.add_item(user, variation.id, 3).await.unwrap();

    let order = h.checkout.place_order(user).await.unwrap();

    assert!(order.order_number().starts_with("ORD-"));
    assert_eq!(order.items().len(), 1);
    assert_eq!(order.items()[0].quantity, 3);
    assert_eq!(order.total().amount(), Decimal::new(60, 0));
    assert_eq!(h.store.stock_of(variation.id).unwrap(), Some(2));

    // the cart is converted: no active cart remains and the next attempt
    // trips the idempotency guard
    let view = h.cart.get_cart(user).await.unwrap();
    assert!(view.id.is_none());
    assert!(matches!(h.checkout.place_order(user).await.unwrap_err(), Error::AlreadyConverted));
    assert_eq!(h.store.stock_of(variation.id).unwrap(), Some(2));
}

#[tokio::test]
async fn insufficient_stock_aborts_without_side_effects() {
    let h = harness();
    let user = Uuid::new_v4();
    let variation = seed_variation(&h.store, "BOOK-002", 20, 2).await;
    h.cart.add_item(user, variation.id, 3).await.unwrap();

    let err = h.checkout.place_order(user).await.unwrap_err();
    match err {
        Error::InsufficientStock { variation_id, requested, available } => {
            assert_eq!(variation_id, variation.id);
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(h.store.stock_of(variation.id).unwrap(), Some(2));
    // cart stays active and re-submittable after stock recovers
    let view = h.cart.get_cart(user).await.unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.status, CartStatus::Active);
}

#[tokio::test]
async fn one_failing_line_aborts_the_whole_order() {
    let h = harness();
    let user = Uuid::new_v4();
    let plenty = seed_variation(&h.store, "BOOK-003", 10, 50).await;
    let scarce = seed_variation(&h.store, "BOOK-004", 10, 1).await;
    h.cart.add_item(user, plenty.id, 2).await.unwrap();
    h.cart.add_item(user, scarce.id, 2).await.unwrap();

    let err = h.checkout.place_order(user).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientStock { .. }));

    // neither line was applied
    assert_eq!(h.store.stock_of(plenty.id).unwrap(), Some(50));
    assert_eq!(h.store.stock_of(scarce.id).unwrap(), Some(1));
    assert!(h.orders.list_for_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_or_absent_carts_cannot_convert() {
    let h = harness();
    let user = Uuid::new_v4();
    assert!(matches!(h.checkout.place_order(user).await.unwrap_err(), Error::EmptyCart));

    // a cart emptied by its owner is just as unconvertible
    let variation = seed_variation(&h.store, "BOOK-005", 10, 5).await;
    h.cart.add_item(user, variation.id, 1).await.unwrap();
    h.cart.clear(user).await.unwrap();
    assert!(matches!(h.checkout.place_order(user).await.unwrap_err(), Error::EmptyCart));
    assert_eq!(h.store.stock_of(variation.id).unwrap(), Some(5));
}

#[tokio::test]
async fn concurrent_conversions_never_oversell_a_shared_variation() {
    let h = harness();
    let variation = seed_variation(&h.store, "DROP-001", 99, 5).await;

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    h.cart.add_item(alice, variation.id, 3).await.unwrap();
    h.cart.add_item(bob, variation.id, 3).await.unwrap();

    let a = tokio::spawn({
        let checkout = h.checkout.clone();
        async move { checkout.place_order(alice).await }
    });
    let b = tokio::spawn({
        let checkout = h.checkout.clone();
        async move { checkout.place_order(bob).await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of two 3-of-5 orders may win");
    assert_eq!(h.store.stock_of(variation.id).unwrap(), Some(2));

    // the loser saw a clean business failure, not a partial write
    let loser = results.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        loser.as_ref().unwrap_err(),
        Error::InsufficientStock { .. } | Error::Conflict
    ));
}

/// Catalog double that reports healthy stock but refuses to decrement one
/// designated variation, forcing the engine down its race-recovery path.
struct RiggedCatalog {
    inner: MemoryStore,
    rigged: Uuid,
}

#[async_trait]
impl CatalogStore for RiggedCatalog {
    async fn variation(&self, id: Uuid) -> Result<Option<ProductVariation>> {
        self.inner.variation(id).await
    }

    async fn check_and_decrement(&self, id: Uuid, amount: u32) -> Result<StockDecrement> {
        if id == self.rigged {
            return Ok(StockDecrement::Insufficient { available: 0 });
        }
        self.inner.check_and_decrement(id, amount).await
    }

    async fn restock(&self, id: Uuid, amount: u32) -> Result<()> {
        self.inner.restock(id, amount).await
    }

    async fn insert_variation(&self, variation: &ProductVariation) -> Result<()> {
        self.inner.insert_variation(variation).await
    }
}

#[tokio::test]
async fn a_persistently_raced_decrement_surfaces_conflict_with_state_restored() {
    let h = harness();
    let user = Uuid::new_v4();
    let normal = seed_variation(&h.store, "RACE-001", 10, 50).await;
    let rigged = seed_variation(&h.store, "RACE-002", 10, 50).await;
    h.cart.add_item(user, normal.id, 2).await.unwrap();
    h.cart.add_item(user, rigged.id, 1).await.unwrap();

    let checkout = CheckoutService::new(
        Arc::new(h.store.clone()),
        Arc::new(RiggedCatalog { inner: h.store.clone(), rigged: rigged.id }),
        Arc::new(h.store.clone()),
    );

    let err = checkout.place_order(user).await.unwrap_err();
    assert!(matches!(err, Error::Conflict));

    // compensation put the partially-decremented line back and released the
    // claim: the cart is active with both lines and stock is untouched
    assert_eq!(h.store.stock_of(normal.id).unwrap(), Some(50));
    assert_eq!(h.store.stock_of(rigged.id).unwrap(), Some(50));
    let view = h.cart.get_cart(user).await.unwrap();
    assert_eq!(view.status, CartStatus::Active);
    assert_eq!(view.lines.len(), 2);
    assert!(h.orders.list_for_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn order_listings_are_newest_first_and_scoped_to_the_caller() {
    let h = harness();
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();
    let variation = seed_variation(&h.store, "LIST-001", 5, 50).await;

    h.cart.add_item(user, variation.id, 1).await.unwrap();
    h.checkout.place_order(user).await.unwrap();
    h.cart.add_item(user, variation.id, 2).await.unwrap();
    h.checkout.place_order(user).await.unwrap();
    h.cart.add_item(other, variation.id, 1).await.unwrap();
    h.checkout.place_order(other).await.unwrap();

    let mine = h.orders.list_for_user(user).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine[0].created_at >= mine[1].created_at);
    assert_eq!(mine[0].lines[0].quantity, 2);
}

#[tokio::test]
async fn admin_listing_is_gated_by_the_directory_flag() {
    let h = harness();
    let admin = h.store.add_user("admin@example.com", true, "admin-token").unwrap();
    let shopper = h.store.add_user("shopper@example.com", false, "shopper-token").unwrap();
    let variation = seed_variation(&h.store, "ADMIN-001", 5, 50).await;

    h.cart.add_item(shopper.id, variation.id, 1).await.unwrap();
    h.checkout.place_order(shopper.id).await.unwrap();

    // non-admin and unknown callers are rejected before any data access
    assert!(matches!(h.orders.list_all(shopper.id).await.unwrap_err(), Error::Unauthorized));
    assert!(matches!(h.orders.list_all(Uuid::new_v4()).await.unwrap_err(), Error::Unauthorized));

    // the admin sees every order regardless of owner
    let all = h.orders.list_all(admin.id).await.unwrap();
    assert_eq!(all.len(), 1);
}
