//! Selection store: one product being customized.
//!
//! Holds the open product, its parts, and the current picks per category.
//! Choices are validated synchronously against the compatibility rules; a
//! blocked choice is a no-op. Adding to the cart is guarded by a re-fetch of
//! the product and every selected part, so the decision uses backend-fresh
//! stock rather than the cached copies. The cache can be minutes old on a
//! busy feed; the cart deserves better.

use crate::api::ShopApi;
use crate::compatibility;
use crate::events::ShopEvent;
use crate::stores::CartHandle;
use crate::types::{
    CartItem, ChosenPart, ConfiguredProduct, Money, NavigationTarget, Notice, Part, PartId,
    Product, part_occurrences,
};
use cyclery_core::{Effect, Reducer, SmallVec, async_effect, smallvec};
use std::collections::HashMap;
use std::sync::Arc;

/// Stock level at or below which an add-to-cart reports a low-stock notice.
const LOW_STOCK_THRESHOLD: u32 = 5;

// ============================================================================
// State
// ============================================================================

/// Why the last verification refused to add the selection to the cart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyBlock {
    /// The product no longer exists.
    ProductGone,
    /// The product was withdrawn from sale.
    ProductUnavailable,
    /// Not every category has a pick yet.
    IncompleteSelection {
        /// Categories still missing a pick, in display order.
        missing: Vec<String>,
    },
    /// A selected part is gone, flagged unavailable, or drained to zero.
    OutOfStock {
        /// Option name of the offending part.
        part_value: String,
    },
    /// Stock exists but not enough to cover the cart plus this selection.
    InsufficientStock {
        /// Option name of the offending part.
        part_value: String,
    },
    /// The verification fetch itself failed; nothing was decided.
    FetchFailed {
        /// Failure description.
        error: String,
    },
}

/// Where the current selection stands with respect to the cart.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum VerificationStatus {
    /// No verification requested since the last edit.
    #[default]
    Idle,
    /// A verification fetch is in flight.
    Verifying,
    /// The selection was verified and handed to the cart.
    Passed,
    /// The selection was refused.
    Blocked(VerifyBlock),
}

/// The product currently being customized, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionState {
    /// The open product.
    pub product: Option<Product>,
    /// Parts for the product's type, kept live by feed events.
    pub parts: Vec<Part>,
    /// Current pick per category.
    pub selection: HashMap<String, Part>,
    /// Add-to-cart verification state.
    pub verification: VerificationStatus,
    /// Messages for the customer (low stock, reverted picks).
    pub notices: Vec<Notice>,
    /// Set when the open product disappeared and the UI should leave.
    pub redirect: Option<NavigationTarget>,
}

impl SelectionState {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The option matrix for rendering, empty when no product is open.
    #[must_use]
    pub fn options(&self) -> Vec<compatibility::CategoryOptions> {
        self.product.as_ref().map_or_else(Vec::new, |product| {
            compatibility::options_for(product, &self.parts, &self.selection)
        })
    }

    /// Whether every category has a pick.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.product.as_ref().is_some_and(|product| {
            compatibility::is_ready(&product.type_product, &self.parts, &self.selection)
        })
    }

    /// Running price of the selection: base plus current picks.
    #[must_use]
    pub fn total_price(&self) -> Option<Money> {
        self.product.as_ref().map(|product| {
            product.base_price + self.selection.values().map(|p| p.price).sum()
        })
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Everything the selection store reacts to.
#[derive(Clone, Debug)]
pub enum SelectionAction {
    /// Open a product for customization, resetting any previous session.
    Open {
        /// The product to customize.
        product: Product,
        /// Parts for its type, from the catalog cache.
        parts: Vec<Part>,
    },
    /// Pick a part for its category. A blocked pick is a no-op.
    Choose {
        /// Category the pick belongs to.
        category: String,
        /// The part to pick.
        part_id: PartId,
    },
    /// Verify the selection against fresh backend state and, if it holds,
    /// hand it to the cart. Carries the cart lines the decision is made
    /// against.
    VerifyForCart {
        /// Snapshot of the cart at request time.
        cart: Vec<CartItem>,
    },
    /// The verification fetch finished.
    VerificationFetched {
        /// The cart snapshot the verification started with.
        cart: Vec<CartItem>,
        /// The fresh product record, `None` when the backend answered 404.
        product: Option<Product>,
        /// Fresh records for the selected parts that still exist.
        parts: Vec<Part>,
        /// Selected part ids the backend no longer knows.
        missing: Vec<PartId>,
    },
    /// The selection was refused.
    VerificationBlocked {
        /// Why it was refused.
        reason: VerifyBlock,
    },
    /// The verification fetch failed; nothing was decided.
    VerificationFailed {
        /// Failure description.
        error: String,
    },
    /// The cart accepted the verified selection.
    AddedToCart {
        /// Low-stock notices gathered during verification.
        notices: Vec<Notice>,
    },
    /// The UI consumed the pending notices and redirect.
    AcknowledgeNotices,
    /// A live feed event to reconcile the open selection with.
    ApplyEvent {
        /// The decoded feed event.
        event: ShopEvent,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Injected dependencies for the selection store.
#[derive(Clone)]
pub struct SelectionEnvironment {
    /// Backend REST client.
    pub api: Arc<dyn ShopApi>,
    /// Cart surface for handing over verified selections.
    pub cart: Arc<dyn CartHandle>,
}

impl SelectionEnvironment {
    /// Creates the environment.
    #[must_use]
    pub fn new(api: Arc<dyn ShopApi>, cart: Arc<dyn CartHandle>) -> Self {
        Self { api, cart }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the selection store.
#[derive(Clone, Debug)]
pub struct SelectionReducer;

impl SelectionReducer {
    /// Creates the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Categories of the open product that still have no pick.
    fn missing_categories(state: &SelectionState) -> Vec<String> {
        let Some(product) = &state.product else {
            return Vec::new();
        };
        compatibility::ordered_categories(&product.type_product, &state.parts)
            .into_iter()
            .filter(|category| !state.selection.contains_key(category))
            .collect()
    }

    /// Finds the refusal reason in the fresh records, if any.
    ///
    /// Checked in order: product gone, product withdrawn, a selected part
    /// gone or out of stock, then the cart already claiming the remaining
    /// units.
    fn condemn(
        product: Option<&Product>,
        fresh_parts: &[Part],
        missing: &[PartId],
        selection: &HashMap<String, Part>,
        cart: &[CartItem],
    ) -> Option<VerifyBlock> {
        let Some(product) = product else {
            return Some(VerifyBlock::ProductGone);
        };
        if !product.is_available {
            return Some(VerifyBlock::ProductUnavailable);
        }
        if let Some(gone) = missing.first() {
            let part_value = selection
                .values()
                .find(|p| &p.id == gone)
                .map_or_else(|| gone.to_string(), |p| p.value.clone());
            return Some(VerifyBlock::OutOfStock { part_value });
        }
        for part in fresh_parts {
            if !part.in_stock() {
                return Some(VerifyBlock::OutOfStock {
                    part_value: part.value.clone(),
                });
            }
            if part_occurrences(cart, &part.id) + 1 > part.quantity {
                return Some(VerifyBlock::InsufficientStock {
                    part_value: part.value.clone(),
                });
            }
        }
        None
    }

    /// Builds the cart hand-off from the fresh records, parts in category
    /// display order.
    fn configured(state: &SelectionState, product: &Product, fresh_parts: &[Part]) -> ConfiguredProduct {
        let chosen: Vec<ChosenPart> =
            compatibility::ordered_categories(&product.type_product, &state.parts)
                .iter()
                .filter_map(|category| state.selection.get(category))
                .filter_map(|pick| fresh_parts.iter().find(|fresh| fresh.id == pick.id))
                .map(ChosenPart::from_part)
                .collect();
        ConfiguredProduct {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            type_product: product.type_product.clone(),
            base_price: product.base_price,
            parts: chosen,
        }
    }

    /// Low-stock notices for what remains after this selection joins the
    /// cart.
    fn low_stock_notices(fresh_parts: &[Part], cart: &[CartItem]) -> Vec<Notice> {
        fresh_parts
            .iter()
            .filter_map(|part| {
                let remaining = part
                    .quantity
                    .saturating_sub(part_occurrences(cart, &part.id) + 1);
                (remaining > 0 && remaining <= LOW_STOCK_THRESHOLD).then(|| Notice::LowStock {
                    part_value: part.value.clone(),
                    remaining,
                })
            })
            .collect()
    }

    /// Removes a reverted pick and drops any stale verification verdict.
    fn revert_category(state: &mut SelectionState, category: &str) {
        state.selection.remove(category);
        state.verification = VerificationStatus::Idle;
    }

    fn apply_event(state: &mut SelectionState, event: ShopEvent) {
        let Some(product) = state.product.clone() else {
            return;
        };
        match event {
            ShopEvent::PartCreated { part } | ShopEvent::PartUpdated { part } => {
                if part.type_product == product.type_product {
                    let selected = state
                        .selection
                        .get(&part.category)
                        .is_some_and(|p| p.id == part.id);
                    match state.parts.iter_mut().find(|p| p.id == part.id) {
                        Some(existing) => *existing = part.clone(),
                        None => state.parts.push(part.clone()),
                    }
                    if selected {
                        if part.in_stock() {
                            state.selection.insert(part.category.clone(), part);
                        } else {
                            tracing::info!(
                                part_value = %part.value,
                                "Selected part went out of stock, reverting the pick"
                            );
                            Self::revert_category(state, &part.category);
                        }
                    }
                } else {
                    // The part moved to another type; it no longer belongs here.
                    state.parts.retain(|p| p.id != part.id);
                    if let Some(category) = state
                        .selection
                        .iter()
                        .find(|(_, p)| p.id == part.id)
                        .map(|(category, _)| category.clone())
                    {
                        Self::revert_category(state, &category);
                    }
                }
            }
            ShopEvent::PartDeleted { part_id } => {
                state.parts.retain(|p| p.id != part_id);
                if let Some(category) = state
                    .selection
                    .iter()
                    .find(|(_, p)| p.id == part_id)
                    .map(|(category, _)| category.clone())
                {
                    tracing::info!(%part_id, "Selected part was deleted, reverting the pick");
                    Self::revert_category(state, &category);
                }
            }
            ShopEvent::ProductUpdated { product: updated } => {
                if updated.id == product.id {
                    state.product = Some(updated);
                }
            }
            ShopEvent::ProductDeleted { product_id } => {
                if product_id == product.id {
                    tracing::info!(%product_id, "Open product was deleted, leaving the page");
                    state.product = None;
                    state.selection.clear();
                    state.verification = VerificationStatus::Idle;
                    state.redirect = Some(NavigationTarget::CatalogRoot);
                }
            }
            ShopEvent::ProductCreated { .. }
            | ShopEvent::CustomProductCreated { .. }
            | ShopEvent::CustomProductDeleted { .. } => {}
        }
    }
}

impl Default for SelectionReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for SelectionReducer {
    type State = SelectionState;
    type Action = SelectionAction;
    type Environment = SelectionEnvironment;

    #[allow(clippy::too_many_lines)] // Complex business logic required
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            SelectionAction::Open { product, parts } => {
                state.product = Some(product);
                state.parts = parts;
                state.selection.clear();
                state.verification = VerificationStatus::Idle;
                state.notices.clear();
                state.redirect = None;
                SmallVec::new()
            }

            SelectionAction::Choose { category, part_id } => {
                let Some(product) = &state.product else {
                    return SmallVec::new();
                };
                let Some(part) = state
                    .parts
                    .iter()
                    .find(|p| p.id == part_id && p.category == category)
                    .cloned()
                else {
                    return SmallVec::new();
                };
                if let Some(reason) = compatibility::evaluate(product, &part, &state.selection) {
                    tracing::debug!(part_value = %part.value, ?reason, "Choice blocked");
                    return SmallVec::new();
                }
                compatibility::apply_choice(&mut state.selection, &part);
                state.verification = VerificationStatus::Idle;
                SmallVec::new()
            }

            SelectionAction::VerifyForCart { cart } => {
                if state.verification == VerificationStatus::Verifying {
                    return SmallVec::new();
                }
                let Some(product) = &state.product else {
                    state.verification = VerificationStatus::Verifying;
                    return smallvec![async_effect! {
                        Some(SelectionAction::VerificationBlocked {
                            reason: VerifyBlock::ProductGone,
                        })
                    }];
                };

                let missing = Self::missing_categories(state);
                state.verification = VerificationStatus::Verifying;
                if !missing.is_empty() {
                    return smallvec![async_effect! {
                        Some(SelectionAction::VerificationBlocked {
                            reason: VerifyBlock::IncompleteSelection { missing },
                        })
                    }];
                }

                let api = Arc::clone(&env.api);
                let product_id = product.id.clone();
                let selected_ids: Vec<PartId> =
                    compatibility::ordered_categories(&product.type_product, &state.parts)
                        .iter()
                        .filter_map(|category| state.selection.get(category))
                        .map(|p| p.id.clone())
                        .collect();

                smallvec![async_effect! {
                    let fresh_product = match api.fetch_product(&product_id).await {
                        Ok(product) => Some(product),
                        Err(error) if error.is_not_found() => None,
                        Err(error) => {
                            return Some(SelectionAction::VerificationFailed {
                                error: error.to_string(),
                            });
                        }
                    };

                    let mut parts = Vec::new();
                    let mut missing = Vec::new();
                    for id in &selected_ids {
                        match api.fetch_part(id).await {
                            Ok(part) => parts.push(part),
                            Err(error) if error.is_not_found() => missing.push(id.clone()),
                            Err(error) => {
                                return Some(SelectionAction::VerificationFailed {
                                    error: error.to_string(),
                                });
                            }
                        }
                    }

                    Some(SelectionAction::VerificationFetched {
                        cart,
                        product: fresh_product,
                        parts,
                        missing,
                    })
                }]
            }

            SelectionAction::VerificationFetched {
                cart,
                product,
                parts,
                missing,
            } => {
                if state.verification != VerificationStatus::Verifying {
                    return SmallVec::new();
                }
                // A re-opened product invalidates an older verification.
                if let (Some(fresh), Some(open)) = (&product, &state.product) {
                    if fresh.id != open.id {
                        return SmallVec::new();
                    }
                }

                if let Some(reason) = Self::condemn(
                    product.as_ref(),
                    &parts,
                    &missing,
                    &state.selection,
                    &cart,
                ) {
                    return smallvec![async_effect! {
                        Some(SelectionAction::VerificationBlocked { reason })
                    }];
                }

                let Some(product) = product else {
                    return SmallVec::new();
                };
                let configured = Self::configured(state, &product, &parts);
                let notices = Self::low_stock_notices(&parts, &cart);
                let cart_handle = Arc::clone(&env.cart);

                smallvec![async_effect! {
                    cart_handle.add_item(configured).await;
                    Some(SelectionAction::AddedToCart { notices })
                }]
            }

            SelectionAction::VerificationBlocked { reason } => {
                tracing::info!(?reason, "Selection refused for the cart");
                state.verification = VerificationStatus::Blocked(reason);
                SmallVec::new()
            }

            SelectionAction::VerificationFailed { error } => {
                tracing::warn!(%error, "Verification fetch failed");
                state.verification =
                    VerificationStatus::Blocked(VerifyBlock::FetchFailed { error });
                SmallVec::new()
            }

            SelectionAction::AddedToCart { notices } => {
                state.verification = VerificationStatus::Passed;
                state.notices.extend(notices);
                SmallVec::new()
            }

            SelectionAction::AcknowledgeNotices => {
                state.notices.clear();
                state.redirect = None;
                SmallVec::new()
            }

            SelectionAction::ApplyEvent { event } => {
                Self::apply_event(state, event);
                SmallVec::new()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap and panic
mod tests {
    use super::*;
    use crate::api::InMemoryShopApi;
    use crate::stores::CartFuture;
    use crate::types::{CartLineId, ProductId};
    use cyclery_runtime::Store;
    use cyclery_testing::{ReducerTest, assertions};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingCartHandle {
        added: Mutex<Vec<ConfiguredProduct>>,
        evicted: Mutex<Vec<Vec<CartLineId>>>,
        cleared: Mutex<u32>,
    }

    impl RecordingCartHandle {
        fn added(&self) -> Vec<ConfiguredProduct> {
            self.added.lock().unwrap().clone()
        }
    }

    impl CartHandle for RecordingCartHandle {
        fn add_item(&self, item: ConfiguredProduct) -> CartFuture<'_> {
            self.added.lock().unwrap().push(item);
            Box::pin(async move {})
        }

        fn evict_lines(&self, line_ids: Vec<CartLineId>) -> CartFuture<'_> {
            self.evicted.lock().unwrap().push(line_ids);
            Box::pin(async move {})
        }

        fn clear(&self) -> CartFuture<'_> {
            *self.cleared.lock().unwrap() += 1;
            Box::pin(async move {})
        }
    }

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::new(id.to_string()),
            name: "Trail Bike".to_string(),
            type_product: "bicycle".to_string(),
            base_price: Money::from_cents(50_000),
            is_available: true,
            restrictions: HashMap::new(),
        }
    }

    fn part(id: &str, category: &str, value: &str, quantity: u32) -> Part {
        Part {
            id: PartId::new(id.to_string()),
            type_product: "bicycle".to_string(),
            category: category.to_string(),
            value: value.to_string(),
            price: Money::from_cents(8_000),
            quantity,
            is_available: true,
        }
    }

    fn bicycle_parts() -> Vec<Part> {
        vec![
            part("w1", "Wheels", "road wheels", 10),
            part("w2", "Wheels", "mountain wheels", 10),
            part("f1", "Frame Type", "full-suspension", 10),
            part("f2", "Frame Type", "diamond", 10),
        ]
    }

    fn open_state() -> SelectionState {
        let mut state = SelectionState::new();
        state.product = Some(product("bike-1"));
        state.parts = bicycle_parts();
        state
    }

    fn env_with(api: Arc<InMemoryShopApi>, cart: Arc<RecordingCartHandle>) -> SelectionEnvironment {
        SelectionEnvironment::new(api, cart)
    }

    fn test_env() -> SelectionEnvironment {
        env_with(
            Arc::new(InMemoryShopApi::new()),
            Arc::new(RecordingCartHandle::default()),
        )
    }

    #[test]
    fn open_resets_previous_session() {
        let mut state = open_state();
        state.selection.insert(
            "Wheels".to_string(),
            part("w1", "Wheels", "road wheels", 10),
        );
        state.verification = VerificationStatus::Passed;
        state.notices.push(Notice::CartEmpty);

        ReducerTest::new(SelectionReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SelectionAction::Open {
                product: product("bike-2"),
                parts: bicycle_parts(),
            })
            .then_state(|state| {
                assert_eq!(state.product.as_ref().unwrap().id.as_str(), "bike-2");
                assert!(state.selection.is_empty());
                assert_eq!(state.verification, VerificationStatus::Idle);
                assert!(state.notices.is_empty());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn choose_applies_an_allowed_part() {
        ReducerTest::new(SelectionReducer::new())
            .with_env(test_env())
            .given_state(open_state())
            .when_action(SelectionAction::Choose {
                category: "Wheels".to_string(),
                part_id: PartId::new("w1".to_string()),
            })
            .then_state(|state| {
                assert_eq!(state.selection.get("Wheels").unwrap().value, "road wheels");
            })
            .run();
    }

    #[test]
    fn blocked_choice_is_a_noop() {
        let mut state = open_state();
        state.selection.insert(
            "Frame Type".to_string(),
            part("f2", "Frame Type", "diamond", 10),
        );

        // Mountain wheels demand a full-suspension frame.
        ReducerTest::new(SelectionReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SelectionAction::Choose {
                category: "Wheels".to_string(),
                part_id: PartId::new("w2".to_string()),
            })
            .then_state(|state| {
                assert!(!state.selection.contains_key("Wheels"));
                assert_eq!(state.selection.get("Frame Type").unwrap().value, "diamond");
            })
            .run();
    }

    #[test]
    fn part_update_out_of_stock_reverts_the_pick() {
        let mut state = open_state();
        state.selection.insert(
            "Wheels".to_string(),
            part("w1", "Wheels", "road wheels", 10),
        );

        ReducerTest::new(SelectionReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SelectionAction::ApplyEvent {
                event: ShopEvent::PartUpdated {
                    part: part("w1", "Wheels", "road wheels", 0),
                },
            })
            .then_state(|state| {
                assert!(!state.selection.contains_key("Wheels"));
                // The option stays listed, just no longer choosable.
                assert!(state.parts.iter().any(|p| p.id.as_str() == "w1"));
            })
            .run();
    }

    #[test]
    fn part_deleted_reverts_and_removes_the_option() {
        let mut state = open_state();
        state.selection.insert(
            "Wheels".to_string(),
            part("w1", "Wheels", "road wheels", 10),
        );

        ReducerTest::new(SelectionReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SelectionAction::ApplyEvent {
                event: ShopEvent::PartDeleted {
                    part_id: PartId::new("w1".to_string()),
                },
            })
            .then_state(|state| {
                assert!(!state.selection.contains_key("Wheels"));
                assert!(state.parts.iter().all(|p| p.id.as_str() != "w1"));
            })
            .run();
    }

    #[test]
    fn product_deleted_clears_and_redirects() {
        ReducerTest::new(SelectionReducer::new())
            .with_env(test_env())
            .given_state(open_state())
            .when_action(SelectionAction::ApplyEvent {
                event: ShopEvent::ProductDeleted {
                    product_id: ProductId::new("bike-1".to_string()),
                },
            })
            .then_state(|state| {
                assert!(state.product.is_none());
                assert_eq!(state.redirect, Some(NavigationTarget::CatalogRoot));
            })
            .run();
    }

    #[test]
    fn added_to_cart_marks_passed_and_keeps_notices() {
        let mut state = open_state();
        state.verification = VerificationStatus::Verifying;

        ReducerTest::new(SelectionReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SelectionAction::AddedToCart {
                notices: vec![Notice::LowStock {
                    part_value: "road wheels".to_string(),
                    remaining: 2,
                }],
            })
            .then_state(|state| {
                assert_eq!(state.verification, VerificationStatus::Passed);
                assert_eq!(state.notices.len(), 1);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn incomplete_selection_is_blocked_before_any_fetch() {
        let store = Store::new(open_state(), SelectionReducer::new(), test_env());

        let result = store
            .send_and_wait_for(
                SelectionAction::VerifyForCart { cart: Vec::new() },
                |a| matches!(a, SelectionAction::VerificationBlocked { .. }),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        match result {
            SelectionAction::VerificationBlocked {
                reason: VerifyBlock::IncompleteSelection { missing },
            } => {
                assert_eq!(missing, vec!["Wheels".to_string(), "Frame Type".to_string()]);
            }
            other => panic!("expected IncompleteSelection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verified_selection_reaches_the_cart_with_low_stock_notice() {
        let api = Arc::new(InMemoryShopApi::with_catalog(
            vec![product("bike-1")],
            vec![
                part("w1", "Wheels", "road wheels", 3),
                part("f1", "Frame Type", "full-suspension", 10),
            ],
        ));
        let cart = Arc::new(RecordingCartHandle::default());

        let mut state = SelectionState::new();
        state.product = Some(product("bike-1"));
        state.parts = vec![
            part("w1", "Wheels", "road wheels", 3),
            part("f1", "Frame Type", "full-suspension", 10),
        ];
        state.selection.insert(
            "Wheels".to_string(),
            part("w1", "Wheels", "road wheels", 3),
        );
        state.selection.insert(
            "Frame Type".to_string(),
            part("f1", "Frame Type", "full-suspension", 10),
        );

        let store = Store::new(
            state,
            SelectionReducer::new(),
            env_with(api, Arc::clone(&cart)),
        );

        let result = store
            .send_and_wait_for(
                SelectionAction::VerifyForCart { cart: Vec::new() },
                |a| {
                    matches!(
                        a,
                        SelectionAction::AddedToCart { .. }
                            | SelectionAction::VerificationBlocked { .. }
                            | SelectionAction::VerificationFailed { .. }
                    )
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        match result {
            SelectionAction::AddedToCart { notices } => {
                assert!(notices.iter().any(|n| matches!(
                    n,
                    Notice::LowStock { part_value, remaining: 2 } if part_value == "road wheels"
                )));
            }
            other => panic!("expected AddedToCart, got {other:?}"),
        }

        let added = cart.added();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].parts.len(), 2);
        assert_eq!(added[0].parts[0].category, "Wheels");
        assert_eq!(added[0].price(), Money::from_cents(66_000));

        // The Passed transition lands via the store's feedback send, which
        // can trail the reply broadcast by a beat.
        let mut status = store.state(|s| s.verification.clone()).await;
        for _ in 0..50 {
            if status == VerificationStatus::Passed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = store.state(|s| s.verification.clone()).await;
        }
        assert_eq!(status, VerificationStatus::Passed);
    }

    #[tokio::test]
    async fn cart_occurrences_count_against_fresh_stock() {
        let api = Arc::new(InMemoryShopApi::with_catalog(
            vec![product("bike-1")],
            vec![
                part("w1", "Wheels", "road wheels", 1),
                part("f1", "Frame Type", "full-suspension", 10),
            ],
        ));
        let cart_handle = Arc::new(RecordingCartHandle::default());

        let mut state = SelectionState::new();
        state.product = Some(product("bike-1"));
        state.parts = vec![
            part("w1", "Wheels", "road wheels", 1),
            part("f1", "Frame Type", "full-suspension", 10),
        ];
        state.selection.insert(
            "Wheels".to_string(),
            part("w1", "Wheels", "road wheels", 1),
        );
        state.selection.insert(
            "Frame Type".to_string(),
            part("f1", "Frame Type", "full-suspension", 10),
        );

        // One cart line already claims the only unit of w1.
        let existing_line = CartItem::new(
            CartLineId::new(1),
            ConfiguredProduct {
                product_id: ProductId::new("bike-1".to_string()),
                product_name: "Trail Bike".to_string(),
                type_product: "bicycle".to_string(),
                base_price: Money::from_cents(50_000),
                parts: vec![ChosenPart::from_part(&part("w1", "Wheels", "road wheels", 1))],
            },
        );

        let store = Store::new(
            state,
            SelectionReducer::new(),
            env_with(api, Arc::clone(&cart_handle)),
        );

        let result = store
            .send_and_wait_for(
                SelectionAction::VerifyForCart {
                    cart: vec![existing_line],
                },
                |a| {
                    matches!(
                        a,
                        SelectionAction::AddedToCart { .. }
                            | SelectionAction::VerificationBlocked { .. }
                    )
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        match result {
            SelectionAction::VerificationBlocked {
                reason: VerifyBlock::InsufficientStock { part_value },
            } => assert_eq!(part_value, "road wheels"),
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert!(cart_handle.added().is_empty());
    }
}
