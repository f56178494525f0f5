//! Order queries.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::view::OrderView;
use crate::error::{Error, Result};
use crate::store::{OrderStore, UserDirectory};

pub struct OrderQueryService {
    orders: Arc<dyn OrderStore>,
    users: Arc<dyn UserDirectory>,
}

impl OrderQueryService {
    pub fn new(orders: Arc<dyn OrderStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { orders, users }
    }

    /// The caller's own orders, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderView>> {
        let orders = self.orders.orders_for_user(user_id).await?;
        Ok(orders.iter().map(OrderView::from_order).collect())
    }

    /// Every order in the store, newest first. The admin check here is the
    /// single authoritative gate; callers must not pre-filter and nothing
    /// upstream may substitute for it.
    pub async fn list_all(&self, caller_id: Uuid) -> Result<Vec<OrderView>> {
        let caller = self.users.user(caller_id).await?.ok_or(Error::Unauthorized)?;
        if !caller.is_admin {
            tracing::debug!(%caller_id, "admin order listing denied");
            return Err(Error::Unauthorized);
        }
        let orders = self.orders.all_orders().await?;
        Ok(orders.iter().map(OrderView::from_order).collect())
    }
}
