//! Application coordinator - wires together all components.
//!
//! This module provides the main application structure that coordinates:
//! - REST client (shop backend)
//! - Event bus (live shop feed)
//! - Domain stores (catalog, selection, cart, checkout, sales)
//! - Cart persistence

mod coordinator;

pub use coordinator::{AddToCartOutcome, AppError, ShopApp};
