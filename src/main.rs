//! Storefront - self-hosted cart & checkout service

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::config::Config;
use storefront::http::{self, AppState};
use storefront::service::{CartService, CheckoutService, OrderQueryService};
use storefront::store::memory::MemoryStore;
use storefront::store::postgres::PgStore;
use storefront::store::{Authenticator, CartStore, CatalogStore, OrderStore, UserDirectory};

type Stores = (
    Arc<dyn CatalogStore>,
    Arc<dyn CartStore>,
    Arc<dyn OrderStore>,
    Arc<dyn UserDirectory>,
    Arc<dyn Authenticator>,
);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (catalog, carts, orders, users, auth): Stores = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            let store = Arc::new(PgStore::new(pool));
            (
                store.clone() as Arc<dyn CatalogStore>,
                store.clone() as Arc<dyn CartStore>,
                store.clone() as Arc<dyn OrderStore>,
                store.clone() as Arc<dyn UserDirectory>,
                store as Arc<dyn Authenticator>,
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores, state is not durable");
            let store = Arc::new(MemoryStore::new());
            (
                store.clone() as Arc<dyn CatalogStore>,
                store.clone() as Arc<dyn CartStore>,
                store.clone() as Arc<dyn OrderStore>,
                store.clone() as Arc<dyn UserDirectory>,
                store as Arc<dyn Authenticator>,
            )
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(%err, "NATS connect failed; event publishing disabled");
                None
            }
        },
        None => None,
    };

    let state = AppState {
        cart: Arc::new(CartService::new(carts.clone(), catalog.clone(), &config.currency)),
        checkout: Arc::new(CheckoutService::new(carts, catalog, orders.clone())),
        orders: Arc::new(OrderQueryService::new(orders, users)),
        auth,
        nats,
    };

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(listener, app).await?;
    Ok(())
}
