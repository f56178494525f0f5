//! Application services: cart mutation, checkout conversion, order queries.
pub mod cart;
pub mod checkout;
pub mod orders;

pub use cart::CartService;
pub use checkout::CheckoutService;
pub use orders::OrderQueryService;
