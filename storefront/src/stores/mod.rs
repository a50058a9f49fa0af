//! One store per storefront domain.
//!
//! Each submodule follows the same shape: a state struct, an action enum
//! covering user commands, fetch results, and live feed events, an
//! environment with injected dependencies, and a reducer. The app
//! coordinator wires one `Store` around each and routes feed events to all
//! of them.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod sales;
pub mod selection;

use crate::types::{CartLineId, ConfiguredProduct};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`CartHandle`] methods.
pub type CartFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// The narrow cart surface handed to the selection store and checkout saga.
///
/// Both need to mutate the cart from inside effects without owning the cart
/// store's types, and tests substitute a recording handle. Implementations
/// resolve once the cart change is applied and persisted.
pub trait CartHandle: Send + Sync {
    /// Appends a verified configuration as a new cart line.
    fn add_item(&self, item: ConfiguredProduct) -> CartFuture<'_>;

    /// Removes the given lines, quietly. The caller owns the user-facing
    /// messaging for these evictions.
    fn evict_lines(&self, line_ids: Vec<CartLineId>) -> CartFuture<'_>;

    /// Empties the cart.
    fn clear(&self) -> CartFuture<'_>;
}

/// Loading and error surface for one fetchable resource.
///
/// A failed refresh keeps stale data on display; the error here lets the UI
/// say so.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchSurface {
    /// Whether a fetch is in flight.
    pub loading: bool,
    /// The last fetch error, cleared by the next success.
    pub error: Option<String>,
}

impl FetchSurface {
    /// Marks a fetch as started.
    pub fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    /// Marks the in-flight fetch as succeeded.
    pub fn succeed(&mut self) {
        self.loading = false;
        self.error = None;
    }

    /// Marks the in-flight fetch as failed.
    pub fn fail(&mut self, error: String) {
        self.loading = false;
        self.error = Some(error);
    }
}
