//! Cart store: ordered lines of configured products, persisted across runs.
//!
//! Cart mutations are total: add, remove, and clear always succeed and each
//! schedules a durable save of the whole collection. The interesting work is
//! live reconciliation: feed events about products and parts evict or refresh
//! lines so the cart never quietly holds something the shop can no longer
//! build.

use crate::events::ShopEvent;
use crate::storage::CartStorage;
use crate::types::{
    CartItem, CartLineId, ConfiguredProduct, Money, NavigationTarget, Notice, PartId, ProductId,
    VAT_RATE_PERCENT, part_occurrences,
};
use cyclery_core::{Effect, Reducer, SmallVec, async_effect, smallvec};
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// The persisted cart plus pending user messaging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartState {
    /// Cart lines in the order they were added.
    pub items: Vec<CartItem>,
    /// Next line id to assign. Monotonic for the life of the cart.
    pub next_line_id: u64,
    /// Accumulated notices about evictions and refreshed snapshots.
    pub notices: Vec<Notice>,
    /// Set when an eviction should move the UI somewhere else.
    pub redirect: Option<NavigationTarget>,
    /// Whether the persisted cart has been loaded.
    pub hydrated: bool,
}

impl CartState {
    /// Creates an empty, not-yet-hydrated cart.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            next_line_id: 1,
            notices: Vec::new(),
            redirect: None,
            hydrated: false,
        }
    }

    /// Sum of line prices.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::price).sum()
    }

    /// VAT on the subtotal.
    #[must_use]
    pub fn vat(&self) -> Money {
        self.subtotal().percent(VAT_RATE_PERCENT)
    }

    /// Subtotal plus VAT.
    #[must_use]
    pub fn total(&self) -> Money {
        self.subtotal() + self.vat()
    }
}

impl Default for CartState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Everything the cart store reacts to.
#[derive(Clone, Debug)]
pub enum CartAction {
    /// Load the persisted cart. Sent once at startup.
    Hydrate,
    /// The persisted cart arrived.
    Hydrated {
        /// Stored lines, empty when nothing was persisted.
        items: Vec<CartItem>,
    },
    /// Append a verified configuration as a new line.
    Add {
        /// The configuration to add.
        item: ConfiguredProduct,
    },
    /// Remove every line with this product id.
    RemoveProduct {
        /// The product whose lines go.
        product_id: ProductId,
    },
    /// Remove specific lines without notices. The checkout saga owns the
    /// messaging for these.
    RemoveLines {
        /// Lines to drop.
        line_ids: Vec<CartLineId>,
    },
    /// Empty the cart.
    Clear,
    /// The UI consumed the pending notices and redirect.
    AcknowledgeNotices,
    /// A live feed event to reconcile the cart with.
    ApplyEvent {
        /// The decoded feed event.
        event: ShopEvent,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Injected dependencies for the cart store.
#[derive(Clone)]
pub struct CartEnvironment {
    /// Durable cart location.
    pub storage: Arc<dyn CartStorage>,
}

impl CartEnvironment {
    /// Creates the environment.
    #[must_use]
    pub fn new(storage: Arc<dyn CartStorage>) -> Self {
        Self { storage }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the cart store.
#[derive(Clone, Debug)]
pub struct CartReducer;

impl CartReducer {
    /// Creates the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Schedules a durable save of the current lines.
    fn persist(env: &CartEnvironment, items: &[CartItem]) -> Effect<CartAction> {
        let storage = Arc::clone(&env.storage);
        let items = items.to_vec();
        async_effect! {
            storage.save(&items).await;
            None
        }
    }

    /// Removes every line matching the predicate, returning the removed
    /// lines in cart order.
    fn evict_where<F>(state: &mut CartState, predicate: F) -> Vec<CartItem>
    where
        F: Fn(&CartItem) -> bool,
    {
        let mut evicted = Vec::new();
        state.items.retain(|item| {
            if predicate(item) {
                evicted.push(item.clone());
                false
            } else {
                true
            }
        });
        for _ in &evicted {
            metrics::counter!("cart.evictions.total").increment(1);
        }
        evicted
    }

    /// One evicted line points the UI at that product; several point it back
    /// at the catalog.
    fn redirect_for(state: &mut CartState, evicted: &[CartItem]) {
        state.redirect = Some(if evicted.len() == 1 {
            NavigationTarget::ProductDetail(evicted[0].product_id.clone())
        } else {
            NavigationTarget::CatalogRoot
        });
    }

    /// Notices and redirect for lines evicted over a single part.
    fn notate_part_evictions(
        state: &mut CartState,
        evicted: &[CartItem],
        part_value: &str,
        shortage: bool,
    ) {
        if evicted.is_empty() {
            return;
        }
        for item in evicted {
            let notice = if shortage {
                Notice::InsufficientStock {
                    product_name: item.product_name.clone(),
                    part_value: part_value.to_string(),
                }
            } else {
                Notice::PartUnavailable {
                    product_name: item.product_name.clone(),
                    part_value: part_value.to_string(),
                }
            };
            state.notices.push(notice);
        }
        Self::redirect_for(state, evicted);
        tracing::info!(
            count = evicted.len(),
            part_value,
            "Evicted cart lines over a part change"
        );
    }

    /// Evicts most-recently-added lines using the part until the cart fits
    /// inside `quantity`.
    fn shrink_to_quantity(state: &mut CartState, part_id: &PartId, quantity: u32) -> Vec<CartItem> {
        let mut evicted = Vec::new();
        while part_occurrences(&state.items, part_id) > quantity {
            let Some(newest) = state
                .items
                .iter()
                .filter(|item| item.uses_part(part_id))
                .map(|item| item.line_id)
                .max()
            else {
                break;
            };
            if let Some(position) = state.items.iter().position(|item| item.line_id == newest) {
                evicted.push(state.items.remove(position));
                metrics::counter!("cart.evictions.total").increment(1);
            }
        }
        evicted
    }

    /// Applies a feed event. Returns whether the cart changed and therefore
    /// needs persisting; duplicate deliveries return `false`.
    #[allow(clippy::too_many_lines)] // Complex business logic required
    fn reconcile(state: &mut CartState, event: ShopEvent) -> bool {
        match event {
            ShopEvent::ProductUpdated { product } => {
                if !state.items.iter().any(|item| item.product_id == product.id) {
                    return false;
                }
                if product.is_available {
                    let mut changed = false;
                    for item in state
                        .items
                        .iter_mut()
                        .filter(|item| item.product_id == product.id)
                    {
                        if item.product_name != product.name
                            || item.base_price != product.base_price
                            || item.type_product != product.type_product
                        {
                            item.product_name = product.name.clone();
                            item.base_price = product.base_price;
                            item.type_product = product.type_product.clone();
                            changed = true;
                        }
                    }
                    if changed {
                        tracing::info!(
                            product_name = %product.name,
                            "Refreshed cart snapshots after a product update"
                        );
                        state.notices.push(Notice::ProductChanged {
                            product_name: product.name,
                        });
                    }
                    changed
                } else {
                    let evicted =
                        Self::evict_where(state, |item| item.product_id == product.id);
                    tracing::info!(
                        product_name = %product.name,
                        count = evicted.len(),
                        "Evicted cart lines, product withdrawn from sale"
                    );
                    state.notices.push(Notice::ProductUnavailable {
                        product_name: product.name,
                    });
                    state.redirect = Some(NavigationTarget::CatalogRoot);
                    true
                }
            }

            ShopEvent::ProductDeleted { product_id } => {
                let evicted = Self::evict_where(state, |item| item.product_id == product_id);
                if evicted.is_empty() {
                    return false;
                }
                tracing::info!(
                    %product_id,
                    count = evicted.len(),
                    "Evicted cart lines, product deleted"
                );
                state.notices.push(Notice::ProductUnavailable {
                    product_name: evicted[0].product_name.clone(),
                });
                state.redirect = Some(NavigationTarget::CatalogRoot);
                true
            }

            ShopEvent::PartUpdated { part } => {
                if part.in_stock() {
                    let evicted = Self::shrink_to_quantity(state, &part.id, part.quantity);
                    Self::notate_part_evictions(state, &evicted, &part.value, true);
                    !evicted.is_empty()
                } else {
                    let evicted = Self::evict_where(state, |item| item.uses_part(&part.id));
                    Self::notate_part_evictions(state, &evicted, &part.value, false);
                    !evicted.is_empty()
                }
            }

            ShopEvent::PartDeleted { part_id } => {
                let evicted = Self::evict_where(state, |item| item.uses_part(&part_id));
                if evicted.is_empty() {
                    return false;
                }
                for item in &evicted {
                    let part_value = item
                        .parts
                        .iter()
                        .find(|part| part.id == part_id)
                        .map_or_else(|| part_id.to_string(), |part| part.value.clone());
                    state.notices.push(Notice::PartUnavailable {
                        product_name: item.product_name.clone(),
                        part_value,
                    });
                }
                Self::redirect_for(state, &evicted);
                tracing::info!(%part_id, count = evicted.len(), "Evicted cart lines, part deleted");
                true
            }

            ShopEvent::ProductCreated { .. }
            | ShopEvent::PartCreated { .. }
            | ShopEvent::CustomProductCreated { .. }
            | ShopEvent::CustomProductDeleted { .. } => false,
        }
    }
}

impl Default for CartReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for CartReducer {
    type State = CartState;
    type Action = CartAction;
    type Environment = CartEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            CartAction::Hydrate => {
                let storage = Arc::clone(&env.storage);
                smallvec![async_effect! {
                    let items = storage.load().await.unwrap_or_default();
                    Some(CartAction::Hydrated { items })
                }]
            }

            CartAction::Hydrated { items } => {
                state.next_line_id = items
                    .iter()
                    .map(|item| item.line_id.value())
                    .max()
                    .map_or(1, |max| max + 1);
                state.items = items;
                state.hydrated = true;
                tracing::info!(lines = state.items.len(), "Cart hydrated from storage");
                SmallVec::new()
            }

            CartAction::Add { item } => {
                let line = CartItem::new(CartLineId::new(state.next_line_id), item);
                state.next_line_id += 1;
                tracing::debug!(
                    line_id = %line.line_id,
                    product_name = %line.product_name,
                    "Cart line added"
                );
                state.items.push(line);
                smallvec![Self::persist(env, &state.items)]
            }

            CartAction::RemoveProduct { product_id } => {
                let before = state.items.len();
                state.items.retain(|item| item.product_id != product_id);
                if state.items.len() == before {
                    return SmallVec::new();
                }
                tracing::debug!(%product_id, "Cart lines removed");
                smallvec![Self::persist(env, &state.items)]
            }

            CartAction::RemoveLines { line_ids } => {
                let before = state.items.len();
                state.items.retain(|item| !line_ids.contains(&item.line_id));
                if state.items.len() == before {
                    return SmallVec::new();
                }
                smallvec![Self::persist(env, &state.items)]
            }

            CartAction::Clear => {
                if state.items.is_empty() {
                    return SmallVec::new();
                }
                state.items.clear();
                tracing::debug!("Cart cleared");
                smallvec![Self::persist(env, &state.items)]
            }

            CartAction::AcknowledgeNotices => {
                state.notices.clear();
                state.redirect = None;
                SmallVec::new()
            }

            CartAction::ApplyEvent { event } => {
                if Self::reconcile(state, event) {
                    smallvec![Self::persist(env, &state.items)]
                } else {
                    SmallVec::new()
                }
            }
        }
    }
}
