//! Storefront Cart & Checkout Service
//!
//! A self-hosted storefront backend centered on the cart lifecycle: carts
//! mutate freely while active, then convert atomically into immutable
//! orders without ever overselling inventory.
//!
//! ## Features
//! - Shopping cart operations with merge-on-add and soft stock feedback
//! - Atomic cart-to-order conversion with per-variation compare-and-decrement
//! - Admin-gated order listing
//! - Pluggable store backends (Postgres, in-memory)
//! - Best-effort NATS domain events

pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod service;
pub mod store;

pub use error::{Error, Result};
