//! Cart mutation operations.
//!
//! Everything here reads stock only as a soft check for UI feedback; nothing
//! reserves inventory. The authoritative stock check happens once, at
//! conversion, in [`crate::service::checkout`].

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::aggregates::Cart;
use crate::domain::view::CartView;
use crate::error::{Error, Result};
use crate::store::{CartStore, CatalogStore};

pub struct CartService {
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn CatalogStore>,
    currency: String,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartStore>, catalog: Arc<dyn CatalogStore>, currency: &str) -> Self {
        Self { carts, catalog, currency: currency.to_string() }
    }

    /// The caller's cart as the UI sees it. No cart yet (or an emptied one)
    /// is a present, empty view, never an error.
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView> {
        match self.carts.active_cart(user_id).await? {
            Some(cart) => self.annotated_view(&cart).await,
            None => Ok(CartView::empty(&self.currency)),
        }
    }

    /// Add `quantity` of a variation, merging with an existing line for the
    /// same variation. Creates the Active cart lazily on first use.
    pub async fn add_item(&self, user_id: Uuid, variation_id: Uuid, quantity: u32) -> Result<CartView> {
        if quantity == 0 {
            return Err(Error::InvalidQuantity { quantity: 0 });
        }
        let variation = self
            .catalog
            .variation(variation_id)
            .await?
            .ok_or(Error::VariationNotFound { variation_id })?;
        let cart = self.carts.get_or_create_active(user_id, &self.currency).await?;
        let cart = self
            .carts
            .merge_item(cart.id(), variation_id, quantity, variation.effective_price().clone())
            .await?;
        tracing::debug!(%user_id, %variation_id, quantity, cart_id = %cart.id(), "cart line merged");
        self.annotated_view(&cart).await
    }

    /// Set a line's quantity; zero removes the line.
    pub async fn update_item(&self, user_id: Uuid, item_id: Uuid, quantity: u32) -> Result<CartView> {
        let cart = self.carts.active_cart(user_id).await?.ok_or(Error::CartNotFound)?;
        let cart = self.carts.set_item_quantity(cart.id(), item_id, quantity).await?;
        self.annotated_view(&cart).await
    }

    /// Idempotent: removing an absent item, or from an absent cart, succeeds.
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<CartView> {
        match self.carts.active_cart(user_id).await? {
            Some(cart) => {
                let cart = self.carts.remove_item(cart.id(), item_id).await?;
                self.annotated_view(&cart).await
            }
            None => Ok(CartView::empty(&self.currency)),
        }
    }

    /// Idempotent: clearing an empty or absent cart succeeds.
    pub async fn clear(&self, user_id: Uuid) -> Result<CartView> {
        match self.carts.active_cart(user_id).await? {
            Some(cart) => {
                let cart = self.carts.clear(cart.id()).await?;
                self.annotated_view(&cart).await
            }
            None => Ok(CartView::empty(&self.currency)),
        }
    }

    /// Annotate each line with current catalog stock. UI feedback only;
    /// a line flagged `insufficient` still converts if stock recovers by
    /// checkout time.
    async fn annotated_view(&self, cart: &Cart) -> Result<CartView> {
        let mut view = CartView::from_cart(cart);
        for line in &mut view.lines {
            match self.catalog.variation(line.variation_id).await? {
                Some(variation) => {
                    line.available = Some(variation.stock.value());
                    line.insufficient = !variation.covers(line.quantity);
                }
                None => {
                    line.available = Some(0);
                    line.insufficient = true;
                }
            }
        }
        Ok(view)
    }
}
