//! Checkout saga: verify, record sales, clear the cart, decrement stock.
//!
//! A phased state machine driven by its own effects. Verification re-fetches
//! everything the cart references and aborts while any line cannot be built;
//! after that the saga never rolls back: a failed sale skips its line, a
//! failed decrement lands in the dead-letter queue, and the machine still
//! reaches a terminal phase carrying the full outcome.
//!
//! Stock is proven before any write, but only against this session. Two
//! clients racing the same last unit can both pass verification; the backend
//! remains the final arbiter.

use crate::api::{PartPatch, ShopApi, SoldProductDraft};
use crate::events::ShopEvent;
use crate::stores::CartHandle;
use crate::types::{
    CartItem, CartLineId, NavigationTarget, Notice, Part, PartId, Product, ProductId, SoldProduct,
    part_occurrences,
};
use cyclery_core::environment::Clock;
use cyclery_core::event::SerializedEvent;
use cyclery_core::event_bus::EventBus;
use cyclery_core::{Effect, Reducer, SmallVec, async_effect, publish_event, smallvec};
use cyclery_runtime::DeadLetterQueue;
use futures::future::join_all;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// One planned inventory write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartDecrement {
    /// The part to patch.
    pub part_id: PartId,
    /// The quantity to write, already clamped at zero.
    pub new_quantity: u32,
}

/// A cart line whose sale the backend rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleFailure {
    /// The line that failed.
    pub line_id: CartLineId,
    /// Its product name, for messaging.
    pub product_name: String,
    /// What the backend said.
    pub error: String,
}

/// An inventory write that failed and was parked in the dead-letter queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecrementFailure {
    /// The part whose patch failed.
    pub part_id: PartId,
    /// What the backend said.
    pub error: String,
}

/// Everything a finished checkout reports back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckoutOutcome {
    /// Sales the backend accepted.
    pub sold: Vec<SoldProduct>,
    /// Lines whose sale was rejected.
    pub sale_failures: Vec<SaleFailure>,
    /// Inventory writes that failed.
    pub decrement_failures: Vec<DecrementFailure>,
    /// Messages for the customer.
    pub notices: Vec<Notice>,
    /// Where the UI should go, set on aborts that evicted lines.
    pub redirect: Option<NavigationTarget>,
}

/// The saga's phases. Effects move the machine forward; nothing else does.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CheckoutPhase {
    /// No checkout running.
    #[default]
    Idle,
    /// Re-fetching every product and part the snapshot references.
    Verifying {
        /// The cart snapshot being checked out.
        items: Vec<CartItem>,
    },
    /// Posting one sale per line.
    RecordingSales {
        /// The cart snapshot being checked out.
        items: Vec<CartItem>,
        /// Fresh part records from verification, the decrement baseline.
        parts: Vec<Part>,
    },
    /// Announcing sales, clearing the cart, then patching quantities.
    Decrementing {
        /// The outcome so far.
        outcome: CheckoutOutcome,
        /// Planned inventory writes.
        decrements: Vec<PartDecrement>,
    },
    /// The saga finished with sales recorded.
    Completed {
        /// The final outcome.
        outcome: CheckoutOutcome,
    },
    /// The saga stopped before recording any sale.
    Aborted {
        /// The final outcome.
        outcome: CheckoutOutcome,
    },
}

/// Store state wrapping the phase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckoutState {
    /// Where the saga stands.
    pub phase: CheckoutPhase,
}

impl CheckoutState {
    /// Creates an idle checkout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: CheckoutPhase::Idle,
        }
    }

    /// The terminal outcome, if the saga has reached one.
    #[must_use]
    pub fn resolution(&self) -> Option<CheckoutResolution> {
        match &self.phase {
            CheckoutPhase::Completed { outcome } => {
                Some(CheckoutResolution::Completed(outcome.clone()))
            }
            CheckoutPhase::Aborted { outcome } => {
                Some(CheckoutResolution::Aborted(outcome.clone()))
            }
            _ => None,
        }
    }
}

/// How a checkout ended, for callers awaiting the saga.
#[derive(Clone, Debug, PartialEq)]
pub enum CheckoutResolution {
    /// Sales were recorded; the outcome may still carry per-line failures.
    Completed(CheckoutOutcome),
    /// Nothing was sold.
    Aborted(CheckoutOutcome),
}

// ============================================================================
// Actions
// ============================================================================

/// Everything the checkout store reacts to.
#[derive(Clone, Debug)]
pub enum CheckoutAction {
    /// Start a checkout over a cart snapshot.
    Begin {
        /// The lines to check out.
        items: Vec<CartItem>,
    },
    /// The verification fetch finished.
    VerificationFetched {
        /// Fresh product records that still exist.
        products: Vec<Product>,
        /// Product ids the backend no longer knows.
        missing_products: Vec<ProductId>,
        /// Fresh part records that still exist.
        parts: Vec<Part>,
        /// Part ids the backend no longer knows.
        missing_parts: Vec<PartId>,
    },
    /// The verification fetch failed; nothing was decided.
    VerificationFailed {
        /// Failure description.
        error: String,
    },
    /// Sale recording finished.
    SalesRecorded {
        /// Sales the backend accepted, in line order.
        sold: Vec<SoldProduct>,
        /// Lines whose sale was rejected.
        failures: Vec<SaleFailure>,
    },
    /// The cart store confirmed the clear.
    CartCleared,
    /// All inventory patches resolved.
    DecrementsApplied {
        /// Patches that failed.
        failures: Vec<DecrementFailure>,
    },
    /// Terminal: the saga completed.
    Completed {
        /// The final outcome.
        outcome: CheckoutOutcome,
    },
    /// Terminal: the saga aborted.
    Aborted {
        /// The final outcome.
        outcome: CheckoutOutcome,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Injected dependencies for the checkout store.
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// Backend REST client.
    pub api: Arc<dyn ShopApi>,
    /// Cart surface for evictions and the post-sale clear.
    pub cart: Arc<dyn CartHandle>,
    /// Feed publisher for `customProductCreated`.
    pub event_bus: Arc<dyn EventBus>,
    /// Clock for sale timestamps.
    pub clock: Arc<dyn Clock>,
    /// Feed topic.
    pub topic: String,
    /// Parking lot for failed inventory writes.
    pub dlq: DeadLetterQueue<String>,
}

impl CheckoutEnvironment {
    /// Creates the environment.
    #[must_use]
    pub fn new(
        api: Arc<dyn ShopApi>,
        cart: Arc<dyn CartHandle>,
        event_bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        topic: impl Into<String>,
        dlq: DeadLetterQueue<String>,
    ) -> Self {
        Self {
            api,
            cart,
            event_bus,
            clock,
            topic: topic.into(),
            dlq,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the checkout saga.
#[derive(Clone, Debug)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn distinct_product_ids(items: &[CartItem]) -> Vec<ProductId> {
        let mut ids = Vec::new();
        for item in items {
            if !ids.contains(&item.product_id) {
                ids.push(item.product_id.clone());
            }
        }
        ids
    }

    fn distinct_part_ids(items: &[CartItem]) -> Vec<PartId> {
        let mut ids = Vec::new();
        for item in items {
            for part in &item.parts {
                if !ids.contains(&part.id) {
                    ids.push(part.id.clone());
                }
            }
        }
        ids
    }

    /// Splits the snapshot into condemned lines and survivors against the
    /// fresh records, collecting a notice per removal.
    ///
    /// Order of severity: product gone or withdrawn, part gone or out of
    /// stock, then stock shortages resolved newest line first.
    fn condemn(
        items: &[CartItem],
        products: &[Product],
        parts: &[Part],
        missing_parts: &[PartId],
    ) -> (Vec<CartItem>, Vec<Notice>) {
        let mut remaining: Vec<CartItem> = items.to_vec();
        let mut condemned: Vec<CartItem> = Vec::new();
        let mut notices: Vec<Notice> = Vec::new();

        let mut doomed_products: Vec<ProductId> = Vec::new();
        for item in &remaining {
            let fresh = products.iter().find(|p| p.id == item.product_id);
            if fresh.is_none_or(|p| !p.is_available)
                && !doomed_products.contains(&item.product_id)
            {
                doomed_products.push(item.product_id.clone());
                notices.push(Notice::ProductUnavailable {
                    product_name: item.product_name.clone(),
                });
            }
        }
        if !doomed_products.is_empty() {
            let mut kept = Vec::new();
            for item in remaining {
                if doomed_products.contains(&item.product_id) {
                    condemned.push(item);
                } else {
                    kept.push(item);
                }
            }
            remaining = kept;
        }

        let mut dead_parts: Vec<(PartId, String)> = Vec::new();
        for item in &remaining {
            for chosen in &item.parts {
                if dead_parts.iter().any(|(id, _)| *id == chosen.id) {
                    continue;
                }
                let fresh = parts.iter().find(|p| p.id == chosen.id);
                if missing_parts.contains(&chosen.id) || fresh.is_none_or(|p| !p.in_stock()) {
                    dead_parts.push((chosen.id.clone(), chosen.value.clone()));
                }
            }
        }
        for (part_id, part_value) in &dead_parts {
            let mut kept = Vec::new();
            for item in remaining {
                if item.uses_part(part_id) {
                    notices.push(Notice::PartUnavailable {
                        product_name: item.product_name.clone(),
                        part_value: part_value.clone(),
                    });
                    condemned.push(item);
                } else {
                    kept.push(item);
                }
            }
            remaining = kept;
        }

        for part in parts {
            if !part.in_stock() {
                continue;
            }
            while part_occurrences(&remaining, &part.id) > part.quantity {
                let Some(newest) = remaining
                    .iter()
                    .filter(|item| item.uses_part(&part.id))
                    .map(|item| item.line_id)
                    .max()
                else {
                    break;
                };
                if let Some(position) =
                    remaining.iter().position(|item| item.line_id == newest)
                {
                    let item = remaining.remove(position);
                    notices.push(Notice::InsufficientStock {
                        product_name: item.product_name.clone(),
                        part_value: part.value.clone(),
                    });
                    condemned.push(item);
                }
            }
        }

        (condemned, notices)
    }
}

impl Default for CheckoutReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    #[allow(clippy::too_many_lines)] // Complex business logic required
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let phase = state.phase.clone();
        match (phase, action) {
            // ----------------------------------------------------------------
            // Begin
            // ----------------------------------------------------------------
            (
                CheckoutPhase::Idle
                | CheckoutPhase::Completed { .. }
                | CheckoutPhase::Aborted { .. },
                CheckoutAction::Begin { items },
            ) => {
                if items.is_empty() {
                    tracing::info!("Checkout refused, the cart is empty");
                    state.phase = CheckoutPhase::Idle;
                    let outcome = CheckoutOutcome {
                        notices: vec![Notice::CartEmpty],
                        ..CheckoutOutcome::default()
                    };
                    return smallvec![async_effect! {
                        Some(CheckoutAction::Aborted { outcome })
                    }];
                }

                tracing::info!(lines = items.len(), "Checkout started");
                let product_ids = Self::distinct_product_ids(&items);
                let part_ids = Self::distinct_part_ids(&items);
                state.phase = CheckoutPhase::Verifying { items };

                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    let mut products = Vec::new();
                    let mut missing_products = Vec::new();
                    for id in &product_ids {
                        match api.fetch_product(id).await {
                            Ok(product) => products.push(product),
                            Err(error) if error.is_not_found() => {
                                missing_products.push(id.clone());
                            }
                            Err(error) => {
                                return Some(CheckoutAction::VerificationFailed {
                                    error: error.to_string(),
                                });
                            }
                        }
                    }

                    let mut parts = Vec::new();
                    let mut missing_parts = Vec::new();
                    for id in &part_ids {
                        match api.fetch_part(id).await {
                            Ok(part) => parts.push(part),
                            Err(error) if error.is_not_found() => missing_parts.push(id.clone()),
                            Err(error) => {
                                return Some(CheckoutAction::VerificationFailed {
                                    error: error.to_string(),
                                });
                            }
                        }
                    }

                    Some(CheckoutAction::VerificationFetched {
                        products,
                        missing_products,
                        parts,
                        missing_parts,
                    })
                }]
            }

            (
                CheckoutPhase::Verifying { .. }
                | CheckoutPhase::RecordingSales { .. }
                | CheckoutPhase::Decrementing { .. },
                CheckoutAction::Begin { .. },
            ) => {
                tracing::warn!("Checkout already in progress, ignoring a second begin");
                SmallVec::new()
            }

            // ----------------------------------------------------------------
            // Verification
            // ----------------------------------------------------------------
            (
                CheckoutPhase::Verifying { items },
                CheckoutAction::VerificationFetched {
                    products,
                    missing_products,
                    parts,
                    missing_parts,
                },
            ) => {
                if !missing_products.is_empty() || !missing_parts.is_empty() {
                    tracing::info!(
                        missing_products = missing_products.len(),
                        missing_parts = missing_parts.len(),
                        "Verification found records the backend no longer knows"
                    );
                }

                let (condemned, notices) =
                    Self::condemn(&items, &products, &parts, &missing_parts);

                if condemned.is_empty() {
                    tracing::info!(lines = items.len(), "Verification passed, recording sales");
                    let lines = items.clone();
                    state.phase = CheckoutPhase::RecordingSales { items, parts };

                    let api = Arc::clone(&env.api);
                    let clock = Arc::clone(&env.clock);
                    return smallvec![async_effect! {
                        let mut sold = Vec::new();
                        let mut failures = Vec::new();
                        for line in &lines {
                            let draft = SoldProductDraft {
                                name: line.product_name.clone(),
                                type_product: line.type_product.clone(),
                                price: line.price(),
                                created_at: clock.now(),
                                part_ids: line.parts.iter().map(|p| p.id.clone()).collect(),
                            };
                            match api.create_sold_product(&draft).await {
                                Ok(record) => sold.push(record),
                                Err(error) => {
                                    tracing::warn!(
                                        line_id = %line.line_id,
                                        %error,
                                        "Sale rejected, skipping the line"
                                    );
                                    failures.push(SaleFailure {
                                        line_id: line.line_id,
                                        product_name: line.product_name.clone(),
                                        error: error.to_string(),
                                    });
                                }
                            }
                        }
                        Some(CheckoutAction::SalesRecorded { sold, failures })
                    }];
                }

                let line_ids: Vec<CartLineId> =
                    condemned.iter().map(|item| item.line_id).collect();
                let redirect = if condemned.len() == 1 {
                    NavigationTarget::ProductDetail(condemned[0].product_id.clone())
                } else {
                    NavigationTarget::CatalogRoot
                };
                tracing::info!(
                    evicted = condemned.len(),
                    "Verification condemned cart lines, aborting checkout"
                );
                let outcome = CheckoutOutcome {
                    notices,
                    redirect: Some(redirect),
                    ..CheckoutOutcome::default()
                };

                let cart = Arc::clone(&env.cart);
                smallvec![async_effect! {
                    cart.evict_lines(line_ids).await;
                    Some(CheckoutAction::Aborted { outcome })
                }]
            }

            (CheckoutPhase::Verifying { .. }, CheckoutAction::VerificationFailed { error }) => {
                tracing::warn!(%error, "Checkout verification fetch failed");
                let outcome = CheckoutOutcome {
                    notices: vec![Notice::CheckoutFailed { reason: error }],
                    ..CheckoutOutcome::default()
                };
                smallvec![async_effect! {
                    Some(CheckoutAction::Aborted { outcome })
                }]
            }

            // ----------------------------------------------------------------
            // Sale recording
            // ----------------------------------------------------------------
            (
                CheckoutPhase::RecordingSales { items, parts },
                CheckoutAction::SalesRecorded { sold, failures },
            ) => {
                // Decrements cover the entire snapshot: a line whose sale was
                // rejected still had its stock promised to this checkout.
                let mut decrements = Vec::new();
                for part in &parts {
                    let used = part_occurrences(&items, &part.id);
                    if used > 0 {
                        decrements.push(PartDecrement {
                            part_id: part.id.clone(),
                            new_quantity: part.quantity.saturating_sub(used),
                        });
                    }
                }

                let notices: Vec<Notice> = failures
                    .iter()
                    .map(|failure| Notice::SaleFailed {
                        product_name: failure.product_name.clone(),
                        reason: failure.error.clone(),
                    })
                    .collect();
                let outcome = CheckoutOutcome {
                    sold: sold.clone(),
                    sale_failures: failures,
                    decrement_failures: Vec::new(),
                    notices,
                    redirect: None,
                };
                tracing::info!(
                    sold = sold.len(),
                    failed = outcome.sale_failures.len(),
                    "Sales recorded, announcing and clearing the cart"
                );
                state.phase = CheckoutPhase::Decrementing { outcome, decrements };

                let mut effects: SmallVec<[Effect<CheckoutAction>; 4]> = SmallVec::new();
                for record in sold {
                    let sold_id = record.id.clone();
                    let event = ShopEvent::CustomProductCreated { sold: record };
                    let Ok(serialized) = SerializedEvent::from_event(&event, None) else {
                        tracing::warn!(%sold_id, "Failed to serialize the sale event");
                        continue;
                    };
                    effects.push(publish_event! {
                        bus: env.event_bus,
                        topic: &env.topic,
                        event: serialized,
                        on_success: || None,
                        on_error: |error| {
                            tracing::warn!(%error, "Failed to announce a sale on the feed");
                            None
                        }
                    });
                }

                let cart = Arc::clone(&env.cart);
                effects.push(async_effect! {
                    cart.clear().await;
                    Some(CheckoutAction::CartCleared)
                });
                effects
            }

            // ----------------------------------------------------------------
            // Decrements
            // ----------------------------------------------------------------
            (
                CheckoutPhase::Decrementing { decrements, .. },
                CheckoutAction::CartCleared,
            ) => {
                tracing::info!(parts = decrements.len(), "Cart cleared, patching inventory");
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    let calls = decrements.into_iter().map(|decrement| {
                        let api = Arc::clone(&api);
                        async move {
                            let patch = PartPatch {
                                quantity: Some(decrement.new_quantity),
                                skip_availability_check: Some(true),
                                ..PartPatch::default()
                            };
                            let result = api.patch_part(&decrement.part_id, &patch).await;
                            (decrement.part_id, result)
                        }
                    });
                    let failures: Vec<DecrementFailure> = join_all(calls)
                        .await
                        .into_iter()
                        .filter_map(|(part_id, result)| {
                            result.err().map(|error| DecrementFailure {
                                part_id,
                                error: error.to_string(),
                            })
                        })
                        .collect();
                    Some(CheckoutAction::DecrementsApplied { failures })
                }]
            }

            (
                CheckoutPhase::Decrementing { outcome, decrements },
                CheckoutAction::DecrementsApplied { failures },
            ) => {
                for failure in &failures {
                    let target = decrements
                        .iter()
                        .find(|d| d.part_id == failure.part_id)
                        .map_or(0, |d| d.new_quantity);
                    tracing::error!(
                        part_id = %failure.part_id,
                        error = %failure.error,
                        "Inventory decrement failed, parked for review"
                    );
                    env.dlq.push(
                        format!("PATCH parts/{} quantity={target}", failure.part_id),
                        failure.error.clone(),
                        0,
                    );
                }
                let outcome = CheckoutOutcome {
                    decrement_failures: failures,
                    ..outcome
                };
                smallvec![async_effect! {
                    Some(CheckoutAction::Completed { outcome })
                }]
            }

            // ----------------------------------------------------------------
            // Terminal
            // ----------------------------------------------------------------
            (CheckoutPhase::Decrementing { .. }, CheckoutAction::Completed { outcome }) => {
                metrics::counter!("checkout.completed.total").increment(1);
                tracing::info!(
                    sold = outcome.sold.len(),
                    sale_failures = outcome.sale_failures.len(),
                    decrement_failures = outcome.decrement_failures.len(),
                    "Checkout completed"
                );
                state.phase = CheckoutPhase::Completed { outcome };
                SmallVec::new()
            }

            (
                CheckoutPhase::Idle | CheckoutPhase::Verifying { .. },
                CheckoutAction::Aborted { outcome },
            ) => {
                metrics::counter!("checkout.aborted.total").increment(1);
                tracing::info!(notices = outcome.notices.len(), "Checkout aborted");
                state.phase = CheckoutPhase::Aborted { outcome };
                SmallVec::new()
            }

            (_, _) => {
                tracing::debug!("Checkout action arrived out of phase, ignoring");
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
    use crate::types::{ChosenPart, ConfiguredProduct, Money, SoldProductId};
    use cyclery_runtime::Store;
    use cyclery_testing::{InMemoryEventBus, ReducerTest, assertions, test_clock};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingCartHandle {
        evicted: Mutex<Vec<Vec<CartLineId>>>,
        cleared: Mutex<u32>,
    }

    impl RecordingCartHandle {
        fn evicted(&self) -> Vec<Vec<CartLineId>> {
            self.evicted.lock().unwrap().clone()
        }

        fn cleared(&self) -> u32 {
            *self.cleared.lock().unwrap()
        }
    }

    impl CartHandle for RecordingCartHandle {
        fn add_item(&self, _item: ConfiguredProduct) -> CartFuture<'_> {
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
            name: format!("Product {id}"),
            type_product: "bicycle".to_string(),
            base_price: Money::from_cents(50_000),
            is_available: true,
            restrictions: HashMap::new(),
        }
    }

    fn part(id: &str, value: &str, quantity: u32) -> Part {
        Part {
            id: PartId::new(id.to_string()),
            type_product: "bicycle".to_string(),
            category: "Wheels".to_string(),
            value: value.to_string(),
            price: Money::from_cents(8_000),
            quantity,
            is_available: true,
        }
    }

    fn line(line_id: u64, product_id: &str, part_ids: &[&str]) -> CartItem {
        CartItem::new(
            CartLineId::new(line_id),
            ConfiguredProduct {
                product_id: ProductId::new(product_id.to_string()),
                product_name: format!("Product {product_id}"),
                type_product: "bicycle".to_string(),
                base_price: Money::from_cents(50_000),
                parts: part_ids
                    .iter()
                    .map(|id| ChosenPart {
                        id: PartId::new((*id).to_string()),
                        category: "Wheels".to_string(),
                        value: format!("value {id}"),
                        price: Money::from_cents(8_000),
                    })
                    .collect(),
            },
        )
    }

    fn env_with(
        api: Arc<InMemoryShopApi>,
        cart: Arc<RecordingCartHandle>,
        dlq: DeadLetterQueue<String>,
    ) -> CheckoutEnvironment {
        CheckoutEnvironment::new(
            api,
            cart,
            Arc::new(InMemoryEventBus::new()),
            Arc::new(test_clock()),
            "shop-events",
            dlq,
        )
    }

    fn terminal(action: &CheckoutAction) -> bool {
        matches!(
            action,
            CheckoutAction::Completed { .. } | CheckoutAction::Aborted { .. }
        )
    }

    #[test]
    fn begin_moves_to_verifying_with_one_fetch() {
        let env = env_with(
            Arc::new(InMemoryShopApi::new()),
            Arc::new(RecordingCartHandle::default()),
            DeadLetterQueue::new(16),
        );

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env)
            .given_state(CheckoutState::new())
            .when_action(CheckoutAction::Begin {
                items: vec![line(1, "bike-1", &["w1"])],
            })
            .then_state(|state| {
                assert!(matches!(state.phase, CheckoutPhase::Verifying { .. }));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn second_begin_is_ignored_while_running() {
        let env = env_with(
            Arc::new(InMemoryShopApi::new()),
            Arc::new(RecordingCartHandle::default()),
            DeadLetterQueue::new(16),
        );
        let running = CheckoutState {
            phase: CheckoutPhase::Verifying {
                items: vec![line(1, "bike-1", &["w1"])],
            },
        };

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env)
            .given_state(running)
            .when_action(CheckoutAction::Begin {
                items: vec![line(9, "bike-9", &["w9"])],
            })
            .then_state(|state| {
                assert!(matches!(
                    &state.phase,
                    CheckoutPhase::Verifying { items } if items.len() == 1
                        && items[0].line_id == CartLineId::new(1)
                ));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn sales_recorded_plans_decrements_and_publishes() {
        let env = env_with(
            Arc::new(InMemoryShopApi::new()),
            Arc::new(RecordingCartHandle::default()),
            DeadLetterQueue::new(16),
        );
        let items = vec![line(1, "bike-1", &["w1"]), line(2, "bike-2", &["w1"])];
        let recording = CheckoutState {
            phase: CheckoutPhase::RecordingSales {
                items,
                parts: vec![part("w1", "road wheels", 3)],
            },
        };
        let record = SoldProduct {
            id: SoldProductId::new("sold-1".to_string()),
            name: "Product bike-1".to_string(),
            type_product: "bicycle".to_string(),
            price: Money::from_cents(58_000),
            created_at: test_clock().now(),
            part_ids: vec![PartId::new("w1".to_string())],
        };

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env)
            .given_state(recording)
            .when_action(CheckoutAction::SalesRecorded {
                sold: vec![record],
                failures: Vec::new(),
            })
            .then_state(|state| {
                let CheckoutPhase::Decrementing { outcome, decrements } = &state.phase else {
                    panic!("expected Decrementing, got {:?}", state.phase);
                };
                assert_eq!(outcome.sold.len(), 1);
                assert_eq!(
                    decrements.as_slice(),
                    [PartDecrement {
                        part_id: PartId::new("w1".to_string()),
                        new_quantity: 1,
                    }]
                );
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_publish_event_effect(effects);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[tokio::test]
    async fn empty_cart_checkout_aborts() {
        let env = env_with(
            Arc::new(InMemoryShopApi::new()),
            Arc::new(RecordingCartHandle::default()),
            DeadLetterQueue::new(16),
        );
        let store = Store::new(CheckoutState::new(), CheckoutReducer::new(), env);

        let result = store
            .send_and_wait_for(
                CheckoutAction::Begin { items: Vec::new() },
                terminal,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let CheckoutAction::Aborted { outcome } = result else {
            panic!("expected Aborted, got {result:?}");
        };
        assert_eq!(outcome.notices, vec![Notice::CartEmpty]);
        assert!(outcome.redirect.is_none());
    }

    #[tokio::test]
    async fn happy_path_sells_clears_and_decrements() {
        let api = Arc::new(InMemoryShopApi::with_catalog(
            vec![product("bike-1")],
            vec![part("w1", "road wheels", 5), part("f1", "full-suspension", 9)],
        ));
        let cart = Arc::new(RecordingCartHandle::default());
        let bus = Arc::new(InMemoryEventBus::new());
        let dlq = DeadLetterQueue::new(16);
        let env = CheckoutEnvironment::new(
            Arc::clone(&api) as Arc<dyn ShopApi>,
            Arc::clone(&cart) as Arc<dyn CartHandle>,
            Arc::clone(&bus) as Arc<dyn EventBus>,
            Arc::new(test_clock()),
            "shop-events",
            dlq.clone(),
        );
        let store = Store::new(CheckoutState::new(), CheckoutReducer::new(), env);

        let items = vec![
            line(1, "bike-1", &["w1", "f1"]),
            line(2, "bike-1", &["w1"]),
        ];
        let result = store
            .send_and_wait_for(
                CheckoutAction::Begin { items },
                terminal,
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let CheckoutAction::Completed { outcome } = result else {
            panic!("expected Completed, got {result:?}");
        };
        assert_eq!(outcome.sold.len(), 2);
        assert!(outcome.sale_failures.is_empty());
        assert!(outcome.decrement_failures.is_empty());

        assert_eq!(api.sold_products().len(), 2);
        assert_eq!(cart.cleared(), 1);
        assert_eq!(dlq.len(), 0);

        // Publishes run concurrently with the clear and decrement chain.
        let mut published = bus.published_count();
        for _ in 0..50 {
            if published == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            published = bus.published_count();
        }
        assert_eq!(published, 2);

        // One patch per distinct part, quantity reduced by total usage.
        assert_eq!(api.part_quantity(&PartId::new("w1".to_string())), Some(3));
        assert_eq!(api.part_quantity(&PartId::new("f1".to_string())), Some(8));
        let patches = api.part_patches();
        assert_eq!(patches.len(), 2);
        assert!(patches
            .iter()
            .all(|(_, patch)| patch.skip_availability_check == Some(true)));
    }

    #[tokio::test]
    async fn zero_stock_aborts_and_evicts_only_the_offending_line() {
        let api = Arc::new(InMemoryShopApi::with_catalog(
            vec![product("bike-1"), product("bike-2")],
            vec![part("w1", "road wheels", 0), part("w2", "street wheels", 5)],
        ));
        let cart = Arc::new(RecordingCartHandle::default());
        let dlq = DeadLetterQueue::new(16);
        let env = env_with(Arc::clone(&api), Arc::clone(&cart), dlq);
        let store = Store::new(CheckoutState::new(), CheckoutReducer::new(), env);

        let items = vec![line(1, "bike-1", &["w1"]), line(2, "bike-2", &["w2"])];
        let result = store
            .send_and_wait_for(
                CheckoutAction::Begin { items },
                terminal,
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let CheckoutAction::Aborted { outcome } = result else {
            panic!("expected Aborted, got {result:?}");
        };
        assert!(matches!(
            outcome.notices.as_slice(),
            [Notice::PartUnavailable { product_name, .. }] if product_name == "Product bike-1"
        ));
        assert_eq!(
            outcome.redirect,
            Some(NavigationTarget::ProductDetail(ProductId::new(
                "bike-1".to_string()
            )))
        );

        assert_eq!(cart.evicted(), vec![vec![CartLineId::new(1)]]);
        assert_eq!(cart.cleared(), 0);
        assert!(api.sold_products().is_empty());
        assert!(api.part_patches().is_empty());
    }

    #[tokio::test]
    async fn rejected_sale_skips_the_line_but_still_decrements() {
        let api = Arc::new(InMemoryShopApi::with_catalog(
            vec![product("bike-1"), product("bike-2")],
            vec![part("w1", "road wheels", 5), part("w2", "street wheels", 5)],
        ));
        api.fail_sales_for("Product bike-1");
        let cart = Arc::new(RecordingCartHandle::default());
        let dlq = DeadLetterQueue::new(16);
        let env = env_with(Arc::clone(&api), Arc::clone(&cart), dlq);
        let store = Store::new(CheckoutState::new(), CheckoutReducer::new(), env);

        let items = vec![line(1, "bike-1", &["w1"]), line(2, "bike-2", &["w2"])];
        let result = store
            .send_and_wait_for(
                CheckoutAction::Begin { items },
                terminal,
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let CheckoutAction::Completed { outcome } = result else {
            panic!("expected Completed, got {result:?}");
        };
        assert_eq!(outcome.sold.len(), 1);
        assert_eq!(outcome.sold[0].name, "Product bike-2");
        assert!(matches!(
            outcome.sale_failures.as_slice(),
            [SaleFailure { line_id, .. }] if *line_id == CartLineId::new(1)
        ));
        assert!(outcome
            .notices
            .iter()
            .any(|n| matches!(n, Notice::SaleFailed { product_name, .. } if product_name == "Product bike-1")));

        // The failed line's stock was still promised to this checkout.
        assert_eq!(api.part_quantity(&PartId::new("w1".to_string())), Some(4));
        assert_eq!(api.part_quantity(&PartId::new("w2".to_string())), Some(4));
        assert_eq!(cart.cleared(), 1);
    }
}
