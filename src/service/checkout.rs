//! The Conversion Engine: turns a mutable cart into an immutable order.
//!
//! `place_order` is the one path from Active to Converted. The sequence is
//!
//!   1. load the user's current cart and reject empty/converted ones,
//!   2. validate every line against live stock (read-only),
//!   3. claim the cart with a status compare-and-set,
//!   4. apply one atomic check-and-decrement per line, compensating
//!      (restock + claim release) if any line loses a race,
//!   5. snapshot and insert the order, then detach the cart's lines.
//!
//! A raced decrement triggers exactly one internal retry of steps 2-4; a
//! failure on the retry surfaces as `Conflict` with all state restored.
//! Business failures from the first validation pass are never retried.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartStatus, Order};
use crate::error::{Error, Result};
use crate::store::{CartStore, CatalogStore, OrderStore, StockDecrement};

pub struct CheckoutService {
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn CatalogStore>,
    orders: Arc<dyn OrderStore>,
}

/// Internal split between failures that mean "a concurrent conversion got
/// there first" (worth one retry) and everything else.
enum ConvertFailure {
    Raced(Error),
    Fatal(Error),
}

impl CheckoutService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn CatalogStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        Self { carts, catalog, orders }
    }

    pub async fn place_order(&self, user_id: Uuid) -> Result<Order> {
        let cart = self.carts.current_cart(user_id).await?.ok_or(Error::EmptyCart)?;
        match cart.status() {
            CartStatus::Converted => return Err(Error::AlreadyConverted),
            CartStatus::Abandoned => return Err(Error::EmptyCart),
            CartStatus::Active => {}
        }
        if cart.is_empty() {
            return Err(Error::EmptyCart);
        }

        match self.convert(&cart).await {
            Ok(order) => {
                tracing::info!(
                    order_id = %order.id(),
                    order_number = order.order_number(),
                    %user_id,
                    total = %order.total(),
                    "order placed"
                );
                Ok(order)
            }
            Err(ConvertFailure::Fatal(err)) => Err(err),
            Err(ConvertFailure::Raced(cause)) => {
                tracing::warn!(%user_id, cart_id = %cart.id(), %cause, "conversion raced, retrying once");
                match self.convert(&cart).await {
                    Ok(order) => {
                        tracing::info!(
                            order_id = %order.id(),
                            order_number = order.order_number(),
                            %user_id,
                            "order placed on retry"
                        );
                        Ok(order)
                    }
                    // The first validation pass succeeded, so any stock
                    // shortfall now is the aftermath of a lost race.
                    Err(ConvertFailure::Raced(_))
                    | Err(ConvertFailure::Fatal(Error::InsufficientStock { .. }))
                    | Err(ConvertFailure::Fatal(Error::VariationNotFound { .. })) => {
                        Err(Error::Conflict)
                    }
                    Err(ConvertFailure::Fatal(err)) => Err(err),
                }
            }
        }
    }

    /// One full conversion attempt over a cart known to have been Active
    /// with items when loaded.
    async fn convert(&self, cart: &Cart) -> std::result::Result<Order, ConvertFailure> {
        self.validate_stock(cart).await.map_err(ConvertFailure::Fatal)?;

        let claimed = self
            .carts
            .transition(cart.id(), CartStatus::Active, CartStatus::Converted)
            .await
            .map_err(ConvertFailure::Fatal)?;
        if !claimed {
            return Err(ConvertFailure::Fatal(Error::AlreadyConverted));
        }

        let mut applied: Vec<(Uuid, u32)> = Vec::with_capacity(cart.items().len());
        for item in cart.items() {
            match self.catalog.check_and_decrement(item.variation_id, item.quantity).await {
                Ok(StockDecrement::Applied { remaining }) => {
                    tracing::debug!(variation_id = %item.variation_id, quantity = item.quantity, remaining, "stock decremented");
                    applied.push((item.variation_id, item.quantity));
                }
                Ok(StockDecrement::Insufficient { available }) => {
                    self.compensate(cart, &applied).await.map_err(ConvertFailure::Fatal)?;
                    return Err(ConvertFailure::Raced(Error::InsufficientStock {
                        variation_id: item.variation_id,
                        requested: item.quantity,
                        available,
                    }));
                }
                Ok(StockDecrement::Missing) => {
                    self.compensate(cart, &applied).await.map_err(ConvertFailure::Fatal)?;
                    return Err(ConvertFailure::Raced(Error::VariationNotFound {
                        variation_id: item.variation_id,
                    }));
                }
                Err(err) => {
                    if let Err(comp) = self.compensate(cart, &applied).await {
                        tracing::error!(%comp, "compensation failed after store error");
                    }
                    return Err(ConvertFailure::Fatal(err));
                }
            }
        }

        let order_number = format!("ORD-{:08}", rand::random::<u32>());
        let order = Order::from_cart(cart, order_number).map_err(ConvertFailure::Fatal)?;
        if let Err(err) = self.orders.insert(&order).await {
            if let Err(comp) = self.compensate(cart, &applied).await {
                tracing::error!(%comp, "compensation failed after order insert error");
            }
            return Err(ConvertFailure::Fatal(err));
        }
        self.carts.detach_items(cart.id()).await.map_err(ConvertFailure::Fatal)?;
        Ok(order)
    }

    /// Step 2: read-only verification that every line is coverable.
    async fn validate_stock(&self, cart: &Cart) -> Result<()> {
        for item in cart.items() {
            let variation = self
                .catalog
                .variation(item.variation_id)
                .await?
                .ok_or(Error::VariationNotFound { variation_id: item.variation_id })?;
            if !variation.covers(item.quantity) {
                return Err(Error::InsufficientStock {
                    variation_id: item.variation_id,
                    requested: item.quantity,
                    available: variation.stock.value(),
                });
            }
        }
        Ok(())
    }

    /// Undo a partial conversion: put decremented stock back, then release
    /// the claim so the cart is Active again with its lines intact.
    async fn compensate(&self, cart: &Cart, applied: &[(Uuid, u32)]) -> Result<()> {
        for (variation_id, quantity) in applied {
            self.catalog.restock(*variation_id, *quantity).await?;
        }
        self.carts
            .transition(cart.id(), CartStatus::Converted, CartStatus::Active)
            .await?;
        tracing::warn!(cart_id = %cart.id(), restored_lines = applied.len(), "conversion compensated");
        Ok(())
    }
}
