//! Cyclery Storefront - client-side engine for a made-to-order bicycle shop
//!
//! This crate drives the storefront and admin console of the Cyclery shop
//! against a REST backend and a Redpanda event feed. It covers:
//!
//! - **Catalog**: products and parts cached from the backend, kept live by feed events
//! - **Selection**: per-category part picks validated against compatibility rules
//! - **Cart**: persisted lines reconciled against every inventory event
//! - **Checkout**: a saga that verifies stock, records sales, and decrements inventory
//! - **Sales**: sold-product history for the admin console
//!
//! # Architecture
//!
//! ```text
//!              ┌─────────────────┐         ┌─────────────────┐
//!              │  Shop Backend   │         │    Event Bus    │
//!              │   (REST API)    │         │   (Redpanda)    │
//!              └─────────────────┘         └─────────────────┘
//!                      ▲                           │
//!                fetch │ write            "shop-events" topic
//!                      │                           ▼
//! ┌────────────────────┴────────────────────────────────────────────┐
//! │                            ShopApp                              │
//! │                                                                 │
//! │  ┌─────────┐  ┌───────────┐  ┌───────┐  ┌──────────┐  ┌──────┐ │
//! │  │ Catalog │  │ Selection │  │ Cart  │  │ Checkout │  │Sales │ │
//! │  │  Store  │  │   Store   │  │ Store │  │  (saga)  │  │Store │ │
//! │  └─────────┘  └───────────┘  └───────┘  └──────────┘  └──────┘ │
//! │                                  │                              │
//! │                           JSON cart file                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every store receives every feed event; each reacts only to what concerns
//! it. The cart store is the single writer of the persisted cart file.
//!
//! # Key Behaviors
//!
//! ## 1. Live Inventory Reconciliation
//!
//! A part running low evicts exactly the cart lines that no longer fit:
//!
//! ```text
//! partUpdated(quantity 3 → 1), two cart lines reference the part
//!   → evict the most recently added line until the rest fits
//!   → one notice per evicted line, cart persisted, UI redirected
//! ```
//!
//! ## 2. Verified Add-to-Cart
//!
//! Adding a configuration re-fetches the product and every selected part, so
//! the decision uses backend-fresh stock rather than the cached copies:
//!
//! ```text
//! 1. Choose parts (compatibility rules applied synchronously)
//! 2. Verify → re-fetch the product and every selected part
//! 3. Condemned → Blocked with the first reason found
//! 4. Clean → appended to the cart, low-stock notices attached
//! ```
//!
//! ## 3. Checkout Saga
//!
//! ```text
//! Begin → re-verify every referenced product and part
//!   condemned lines → evict them, abort with notices
//!   clean → one sale POST per line (a rejected sale skips only its line)
//!         → customProductCreated published per recorded sale
//!         → cart cleared
//!         → one inventory decrement per distinct part (failures parked in a DLQ)
//! ```
//!
//! # Usage
//!
//! See [`ShopApp`] for the application surface and the [`stores`] module for
//! the individual reducers and their tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod app;
pub mod compatibility;
pub mod config;
pub mod events;
pub mod storage;
pub mod stores;
pub mod types;

pub use api::{HttpShopApi, InMemoryShopApi, ShopApi, ShopApiError};
pub use app::{AddToCartOutcome, AppError, ShopApp};
pub use config::ShopConfig;
pub use events::ShopEvent;
pub use types::*;
