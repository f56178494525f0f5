//! Postgres store backend (sqlx).
//!
//! Stock movement and cart status changes are single conditional statements,
//! so the database serializes them: `check_and_decrement` is one
//! `UPDATE ... WHERE stock >= n`, the conversion claim is one
//! `UPDATE ... WHERE status = 'active'`, and merge-on-add is an
//! `ON CONFLICT ... DO UPDATE` upsert inside a transaction that row-locks
//! the owning cart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::cart::{Cart, CartItem, CartStatus};
use crate::domain::aggregates::order::{Order, OrderItem, OrderStatus};
use crate::domain::aggregates::variation::ProductVariation;
use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::error::{Error, Result};
use crate::store::{
    Authenticator, CartStore, CatalogStore, OrderStore, StockDecrement, UserDirectory, UserRecord,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_cart(&self, row: CartRow) -> Result<Cart> {
        let items = sqlx::query_as::<_, CartItemRow>(
            "SELECT id, variation_id, quantity, unit_price FROM cart_items WHERE cart_id = $1 ORDER BY created_at",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        row.into_cart(items)
    }

    async fn cart_by_id(&self, cart_id: Uuid) -> Result<Cart> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE id = $1")
            .bind(cart_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::CartNotFound)?;
        self.load_cart(row).await
    }

    /// Row-lock the cart inside `tx` and require it to be Active.
    async fn lock_active_cart(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        cart_id: Uuid,
    ) -> Result<()> {
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM carts WHERE id = $1 FOR UPDATE")
                .bind(cart_id)
                .fetch_optional(&mut **tx)
                .await?;
        match status.as_ref().map(|(s,)| s.as_str()) {
            Some("active") => Ok(()),
            Some("converted") => Err(Error::AlreadyConverted),
            Some(_) | None => Err(Error::CartNotFound),
        }
    }
}

#[derive(sqlx::FromRow)]
struct VariationRow {
    id: Uuid,
    product_id: Uuid,
    sku: String,
    price: Decimal,
    sale_price: Option<Decimal>,
    currency: String,
    stock: i32,
    size: Option<String>,
    color: Option<String>,
    images: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VariationRow {
    fn into_variation(self) -> Result<ProductVariation> {
        let sku = Sku::new(&self.sku).map_err(|e| Error::Store(format!("bad sku in catalog: {e}")))?;
        Ok(ProductVariation {
            id: self.id,
            product_id: self.product_id,
            sku,
            price: Money::new(self.price, &self.currency),
            sale_price: self.sale_price.map(|p| Money::new(p, &self.currency)),
            stock: Quantity::new(self.stock.max(0) as u32),
            size: self.size,
            color: self.color,
            images: self.images,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: Uuid,
    variation_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
}

impl CartRow {
    fn into_cart(self, items: Vec<CartItemRow>) -> Result<Cart> {
        let status = CartStatus::parse(&self.status)
            .ok_or_else(|| Error::Store(format!("unknown cart status: {}", self.status)))?;
        let items = items
            .into_iter()
            .map(|i| CartItem {
                id: i.id,
                variation_id: i.variation_id,
                quantity: i.quantity.max(0) as u32,
                unit_price: Money::new(i.unit_price, &self.currency),
            })
            .collect();
        Ok(Cart::from_parts(
            self.id,
            self.user_id,
            status,
            items,
            self.currency,
            self.created_at,
            self.updated_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    status: String,
    total: Decimal,
    currency: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    variation_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        let status = OrderStatus::parse(&self.status)
            .ok_or_else(|| Error::Store(format!("unknown order status: {}", self.status)))?;
        Ok(Order::from_parts(
            self.id,
            self.order_number,
            self.user_id,
            status,
            items,
            Money::new(self.total, &self.currency),
            self.created_at,
        ))
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn variation(&self, id: Uuid) -> Result<Option<ProductVariation>> {
        let row = sqlx::query_as::<_, VariationRow>("SELECT * FROM product_variations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(VariationRow::into_variation).transpose()
    }

    async fn check_and_decrement(&self, id: Uuid, amount: u32) -> Result<StockDecrement> {
        let updated: Option<(i32,)> = sqlx::query_as(
            "UPDATE product_variations SET stock = stock - $2, updated_at = NOW() \
             WHERE id = $1 AND stock >= $2 RETURNING stock",
        )
        .bind(id)
        .bind(amount as i32)
        .fetch_optional(&self.pool)
        .await?;
        if let Some((remaining,)) = updated {
            return Ok(StockDecrement::Applied { remaining: remaining.max(0) as u32 });
        }
        let current: Option<(i32,)> =
            sqlx::query_as("SELECT stock FROM product_variations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match current {
            Some((available,)) => StockDecrement::Insufficient { available: available.max(0) as u32 },
            None => StockDecrement::Missing,
        })
    }

    async fn restock(&self, id: Uuid, amount: u32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE product_variations SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(amount as i32)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::VariationNotFound { variation_id: id });
        }
        Ok(())
    }

    async fn insert_variation(&self, variation: &ProductVariation) -> Result<()> {
        sqlx::query(
            "INSERT INTO product_variations \
             (id, product_id, sku, price, sale_price, currency, stock, size, color, images, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(variation.id)
        .bind(variation.product_id)
        .bind(variation.sku.as_str())
        .bind(variation.price.amount())
        .bind(variation.sale_price.as_ref().map(Money::amount))
        .bind(variation.price.currency())
        .bind(variation.stock.value() as i32)
        .bind(&variation.size)
        .bind(&variation.color)
        .bind(&variation.images)
        .bind(variation.created_at)
        .bind(variation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn get_or_create_active(&self, user_id: Uuid, currency: &str) -> Result<Cart> {
        // The partial unique index on (user_id) WHERE status = 'active'
        // makes this race-free: the losing insert is a no-op.
        sqlx::query(
            "INSERT INTO carts (id, user_id, status, currency, created_at, updated_at) \
             VALUES ($1, $2, 'active', $3, NOW(), NOW()) \
             ON CONFLICT (user_id) WHERE status = 'active' DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(currency)
        .execute(&self.pool)
        .await?;
        self.active_cart(user_id).await?.ok_or(Error::CartNotFound)
    }

    async fn active_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            "SELECT * FROM carts WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.load_cart(row).await?)),
            None => Ok(None),
        }
    }

    async fn current_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            "SELECT * FROM carts WHERE user_id = $1 \
             ORDER BY (status = 'active') DESC, updated_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.load_cart(row).await?)),
            None => Ok(None),
        }
    }

    async fn merge_item(
        &self,
        cart_id: Uuid,
        variation_id: Uuid,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        Self::lock_active_cart(&mut tx, cart_id).await?;
        sqlx::query(
            "INSERT INTO cart_items (id, cart_id, variation_id, quantity, unit_price, created_at) \
             VALUES ($1, $2, $3, $4, $5, NOW()) \
             ON CONFLICT (cart_id, variation_id) \
             DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity",
        )
        .bind(Uuid::new_v4())
        .bind(cart_id)
        .bind(variation_id)
        .bind(quantity as i32)
        .bind(unit_price.amount())
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.cart_by_id(cart_id).await
    }

    async fn set_item_quantity(&self, cart_id: Uuid, item_id: Uuid, quantity: u32) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        Self::lock_active_cart(&mut tx, cart_id).await?;
        let result = if quantity == 0 {
            sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
                .bind(item_id)
                .bind(cart_id)
                .execute(&mut *tx)
                .await?
        } else {
            sqlx::query("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND cart_id = $2")
                .bind(item_id)
                .bind(cart_id)
                .bind(quantity as i32)
                .execute(&mut *tx)
                .await?
        };
        if result.rows_affected() == 0 {
            return Err(Error::ItemNotFound { item_id });
        }
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.cart_by_id(cart_id).await
    }

    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        Self::lock_active_cart(&mut tx, cart_id).await?;
        sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id)
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.cart_by_id(cart_id).await
    }

    async fn clear(&self, cart_id: Uuid) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        Self::lock_active_cart(&mut tx, cart_id).await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.cart_by_id(cart_id).await
    }

    async fn transition(&self, cart_id: Uuid, from: CartStatus, to: CartStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE carts SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(cart_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn detach_items(&self, cart_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, status, total, currency, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id())
        .bind(order.order_number())
        .bind(order.user_id())
        .bind(order.status().as_str())
        .bind(order.total().amount())
        .bind(order.total().currency())
        .bind(order.created_at())
        .execute(&mut *tx)
        .await?;
        for item in order.items() {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, variation_id, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(item.id)
            .bind(order.id())
            .bind(item.variation_id)
            .bind(item.quantity as i32)
            .bind(item.unit_price.amount())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.attach_items(rows).await
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        self.attach_items(rows).await
    }
}

impl PgStore {
    async fn attach_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, variation_id, quantity, unit_price \
             FROM order_items WHERE order_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let mut by_order: std::collections::HashMap<Uuid, Vec<OrderItemRow>> =
            std::collections::HashMap::new();
        for item in item_rows {
            by_order.entry(item.order_id).or_default().push(item);
        }
        rows.into_iter()
            .map(|row| {
                let currency = row.currency.clone();
                let items = by_order
                    .remove(&row.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|i| OrderItem {
                        id: i.id,
                        variation_id: i.variation_id,
                        quantity: i.quantity.max(0) as u32,
                        unit_price: Money::new(i.unit_price, &currency),
                    })
                    .collect();
                row.into_order(items)
            })
            .collect()
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn user(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let row: Option<(Uuid, String, bool)> =
            sqlx::query_as("SELECT id, email, is_admin FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, email, is_admin)| UserRecord { id, email, is_admin }))
    }
}

#[async_trait]
impl Authenticator for PgStore {
    async fn resolve(&self, bearer: &str) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE api_token = $1")
            .bind(bearer)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }
}
