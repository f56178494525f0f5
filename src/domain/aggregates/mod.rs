//! Aggregates module
pub mod cart;
pub mod order;
pub mod variation;

pub use cart::{Cart, CartItem, CartStatus};
pub use order::{Order, OrderItem, OrderStatus};
pub use variation::ProductVariation;
