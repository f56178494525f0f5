//! HTTP boundary.
//!
//! Authentication happens here (bearer token -> user id via the injected
//! `Authenticator`); authorization does not — the admin gate lives inside
//! `OrderQueryService::list_all`. This layer also owns the translation of
//! the error taxonomy to status codes and the best-effort event publishing.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::domain::events::{CartEvent, DomainEvent, OrderEvent};
use crate::domain::view::{OrderView, PurchaseView};
use crate::error::Error;
use crate::service::{CartService, CheckoutService, OrderQueryService};
use crate::store::Authenticator;

#[derive(Clone)]
pub struct AppState {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderQueryService>,
    pub auth: Arc<dyn Authenticator>,
    pub nats: Option<async_nats::Client>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({"status": "healthy", "service": "storefront"})) }),
        )
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_to_cart))
        .route("/api/v1/cart/items/:id", put(update_cart_item).delete(remove_cart_item))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders", get(list_my_orders))
        .route("/api/v1/admin/orders", get(list_all_orders))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A request principal: the bearer credential resolved to an account id
/// before any core operation runs.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| unauthorized("missing bearer credential"))?;
        match state.auth.resolve(token).await {
            Ok(Some(user_id)) => Ok(AuthUser(user_id)),
            Ok(None) => Err(unauthorized("unknown credential")),
            Err(err) => {
                tracing::error!(%err, "credential resolution failed");
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal error"})),
                ))
            }
        }
    }
}

fn unauthorized(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": message})))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
            Error::CartNotFound
            | Error::ItemNotFound { .. }
            | Error::VariationNotFound { .. }
            | Error::EmptyCart => StatusCode::NOT_FOUND,
            Error::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::AlreadyConverted | Error::Conflict => StatusCode::CONFLICT,
            Error::Unauthorized => StatusCode::FORBIDDEN,
            Error::Database(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            Error::InsufficientStock { variation_id, requested, available } => json!({
                "error": self.to_string(),
                "variation_id": variation_id,
                "requested": requested,
                "available": available,
            }),
            Error::Conflict => json!({"error": self.to_string(), "retryable": true}),
            Error::Database(err) => {
                tracing::error!(%err, "database error");
                json!({"error": "internal error"})
            }
            Error::Store(err) => {
                tracing::error!(%err, "store error");
                json!({"error": "internal error"})
            }
            _ => json!({"error": self.to_string()}),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub variation_id: Uuid,
    #[validate(range(min = 1, max = 1_000_000))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 0, max = 1_000_000))]
    pub quantity: i64,
}

async fn get_cart(State(s): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<PurchaseView>, Error> {
    Ok(Json(PurchaseView::Cart(s.cart.get_cart(user).await?)))
}

async fn add_to_cart(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Json(r): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<PurchaseView>), Error> {
    r.validate().map_err(|_| Error::InvalidQuantity { quantity: r.quantity })?;
    let quantity = r.quantity as u32;
    let view = s.cart.add_item(user, r.variation_id, quantity).await?;
    if let Some(cart_id) = view.id {
        publish(
            &s.nats,
            DomainEvent::Cart(CartEvent::ItemAdded {
                cart_id,
                variation_id: r.variation_id,
                quantity,
            }),
        )
        .await;
    }
    Ok((StatusCode::CREATED, Json(PurchaseView::Cart(view))))
}

async fn update_cart_item(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
    Json(r): Json<UpdateCartItemRequest>,
) -> Result<Json<PurchaseView>, Error> {
    r.validate().map_err(|_| Error::InvalidQuantity { quantity: r.quantity })?;
    let view = s.cart.update_item(user, item_id, r.quantity as u32).await?;
    if let Some(cart_id) = view.id {
        publish(
            &s.nats,
            DomainEvent::Cart(CartEvent::ItemUpdated {
                cart_id,
                item_id,
                quantity: r.quantity as u32,
            }),
        )
        .await;
    }
    Ok(Json(PurchaseView::Cart(view)))
}

async fn remove_cart_item(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<PurchaseView>, Error> {
    let view = s.cart.remove_item(user, item_id).await?;
    if let Some(cart_id) = view.id {
        publish(&s.nats, DomainEvent::Cart(CartEvent::ItemRemoved { cart_id, item_id })).await;
    }
    Ok(Json(PurchaseView::Cart(view)))
}

async fn clear_cart(State(s): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<PurchaseView>, Error> {
    let view = s.cart.clear(user).await?;
    if let Some(cart_id) = view.id {
        publish(&s.nats, DomainEvent::Cart(CartEvent::Cleared { cart_id })).await;
    }
    Ok(Json(PurchaseView::Cart(view)))
}

async fn checkout(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<(StatusCode, Json<PurchaseView>), Error> {
    let order = s.checkout.place_order(user).await?;
    publish(
        &s.nats,
        DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id(),
            user_id: user,
            total: order.total().amount(),
        }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(PurchaseView::Order(OrderView::from_order(&order)))))
}

async fn list_my_orders(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<OrderView>>, Error> {
    Ok(Json(s.orders.list_for_user(user).await?))
}

async fn list_all_orders(
    State(s): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<OrderView>>, Error> {
    // no pre-check here: list_all owns the admin gate
    Ok(Json(s.orders.list_all(caller).await?))
}

/// Best-effort event publishing; failures are logged, never surfaced.
async fn publish(nats: &Option<async_nats::Client>, event: DomainEvent) {
    let Some(client) = nats else { return };
    let subject = event.subject();
    match serde_json::to_vec(&event) {
        Ok(payload) => {
            if let Err(err) = client.publish(subject, payload.into()).await {
                tracing::warn!(%err, subject, "event publish failed");
            }
        }
        Err(err) => tracing::warn!(%err, subject, "event serialization failed"),
    }
}
