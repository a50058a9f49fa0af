//! Sales store: the admin-facing history of finalized sales.
//!
//! Deleting a sale edits history only. Stock already left the shelf when the
//! sale was recorded, so no quantity moves back.

use crate::api::ShopApi;
use crate::events::ShopEvent;
use crate::stores::FetchSurface;
use crate::types::{SoldProduct, SoldProductId};
use cyclery_core::event::SerializedEvent;
use cyclery_core::event_bus::EventBus;
use cyclery_core::{Effect, Reducer, SmallVec, async_effect, publish_event, smallvec};
use std::sync::Arc;

/// Sales history plus its fetch surface.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SalesState {
    /// Known sales, in backend order with feed arrivals appended.
    pub sold: Vec<SoldProduct>,
    /// Loading and error flags for the history fetch.
    pub fetch: FetchSurface,
    /// The last failed delete, cleared by the next successful one.
    pub last_delete_error: Option<String>,
}

impl SalesState {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Everything the sales store reacts to.
#[derive(Clone, Debug)]
pub enum SalesAction {
    /// Load the sales history.
    FetchSales,
    /// The history arrived.
    SalesLoaded {
        /// The full list, replacing the cache.
        sold: Vec<SoldProduct>,
    },
    /// The history fetch failed; the cached list stays.
    FetchFailed {
        /// Failure description.
        error: String,
    },
    /// Delete a sale from history.
    DeleteSale {
        /// The sale to delete.
        sold_id: SoldProductId,
    },
    /// The backend confirmed the delete.
    SaleDeleted {
        /// The deleted sale.
        sold_id: SoldProductId,
    },
    /// The delete was rejected.
    DeleteFailed {
        /// Failure description.
        error: String,
    },
    /// A live feed event to reconcile the history with.
    ApplyEvent {
        /// The decoded feed event.
        event: ShopEvent,
    },
}

/// Injected dependencies for the sales store.
#[derive(Clone)]
pub struct SalesEnvironment {
    /// Backend REST client.
    pub api: Arc<dyn ShopApi>,
    /// Feed publisher for `customProductDeleted`.
    pub event_bus: Arc<dyn EventBus>,
    /// Feed topic.
    pub topic: String,
}

impl SalesEnvironment {
    /// Creates the environment.
    #[must_use]
    pub fn new(api: Arc<dyn ShopApi>, event_bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            api,
            event_bus,
            topic: topic.into(),
        }
    }
}

/// Reducer for the sales store.
#[derive(Clone, Debug)]
pub struct SalesReducer;

impl SalesReducer {
    /// Creates the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Applies a feed event idempotently: create replaces any record with the
    /// same id, delete of an absent id is a no-op.
    fn apply_event(state: &mut SalesState, event: ShopEvent) {
        match event {
            ShopEvent::CustomProductCreated { sold } => {
                match state.sold.iter_mut().find(|s| s.id == sold.id) {
                    Some(existing) => *existing = sold,
                    None => state.sold.push(sold),
                }
            }
            ShopEvent::CustomProductDeleted { sold_id } => {
                state.sold.retain(|s| s.id != sold_id);
            }
            _ => {}
        }
    }
}

impl Default for SalesReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for SalesReducer {
    type State = SalesState;
    type Action = SalesAction;
    type Environment = SalesEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            SalesAction::FetchSales => {
                state.fetch.begin();
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.fetch_sold_products().await {
                        Ok(sold) => Some(SalesAction::SalesLoaded { sold }),
                        Err(error) => Some(SalesAction::FetchFailed {
                            error: error.to_string(),
                        }),
                    }
                }]
            }

            SalesAction::SalesLoaded { sold } => {
                tracing::debug!(count = sold.len(), "Sales history loaded");
                state.sold = sold;
                state.fetch.succeed();
                SmallVec::new()
            }

            SalesAction::FetchFailed { error } => {
                tracing::warn!(%error, "Sales fetch failed, keeping stale history");
                state.fetch.fail(error);
                SmallVec::new()
            }

            SalesAction::DeleteSale { sold_id } => {
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.delete_sold_product(&sold_id).await {
                        Ok(()) => Some(SalesAction::SaleDeleted { sold_id }),
                        Err(error) => Some(SalesAction::DeleteFailed {
                            error: error.to_string(),
                        }),
                    }
                }]
            }

            SalesAction::SaleDeleted { sold_id } => {
                state.sold.retain(|s| s.id != sold_id);
                state.last_delete_error = None;
                tracing::info!(%sold_id, "Sale deleted from history");

                let event = ShopEvent::CustomProductDeleted {
                    sold_id: sold_id.clone(),
                };
                let Ok(serialized) = SerializedEvent::from_event(&event, None) else {
                    tracing::warn!(%sold_id, "Failed to serialize the deletion event");
                    return SmallVec::new();
                };
                smallvec![publish_event! {
                    bus: env.event_bus,
                    topic: &env.topic,
                    event: serialized,
                    on_success: || None,
                    on_error: |error| {
                        tracing::warn!(%error, "Failed to announce a sale deletion on the feed");
                        None
                    }
                }]
            }

            SalesAction::DeleteFailed { error } => {
                tracing::warn!(%error, "Sale delete rejected");
                state.last_delete_error = Some(error);
                SmallVec::new()
            }

            SalesAction::ApplyEvent { event } => {
                Self::apply_event(state, event);
                SmallVec::new()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::api::InMemoryShopApi;
    use crate::types::{Money, PartId};
    use cyclery_core::environment::Clock;
    use cyclery_testing::{InMemoryEventBus, ReducerTest, assertions, test_clock};

    fn test_env() -> SalesEnvironment {
        SalesEnvironment::new(
            Arc::new(InMemoryShopApi::new()),
            Arc::new(InMemoryEventBus::new()),
            "shop-events",
        )
    }

    fn sold(id: &str) -> SoldProduct {
        SoldProduct {
            id: SoldProductId::new(id.to_string()),
            name: "Trail Bike".to_string(),
            type_product: "bicycle".to_string(),
            price: Money::from_cents(59_105),
            created_at: test_clock().now(),
            part_ids: vec![PartId::new("w1".to_string())],
        }
    }

    #[test]
    fn fetch_marks_loading_and_schedules_the_call() {
        ReducerTest::new(SalesReducer::new())
            .with_env(test_env())
            .given_state(SalesState::new())
            .when_action(SalesAction::FetchSales)
            .then_state(|state| assert!(state.fetch.loading))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn loaded_history_replaces_the_cache() {
        let mut state = SalesState::new();
        state.sold = vec![sold("sold-old")];

        ReducerTest::new(SalesReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SalesAction::SalesLoaded {
                sold: vec![sold("sold-1"), sold("sold-2")],
            })
            .then_state(|state| {
                assert_eq!(state.sold.len(), 2);
                assert!(!state.fetch.loading);
                assert!(state.fetch.error.is_none());
            })
            .run();
    }

    #[test]
    fn failed_fetch_keeps_the_stale_history() {
        let mut state = SalesState::new();
        state.sold = vec![sold("sold-1")];
        state.fetch.begin();

        ReducerTest::new(SalesReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SalesAction::FetchFailed {
                error: "backend is down".to_string(),
            })
            .then_state(|state| {
                assert_eq!(state.sold.len(), 1);
                assert_eq!(state.fetch.error.as_deref(), Some("backend is down"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn confirmed_delete_removes_and_announces() {
        let mut state = SalesState::new();
        state.sold = vec![sold("sold-1"), sold("sold-2")];
        state.last_delete_error = Some("older failure".to_string());

        ReducerTest::new(SalesReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SalesAction::SaleDeleted {
                sold_id: SoldProductId::new("sold-1".to_string()),
            })
            .then_state(|state| {
                assert_eq!(state.sold.len(), 1);
                assert_eq!(state.sold[0].id.as_str(), "sold-2");
                assert!(state.last_delete_error.is_none());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_publish_event_effect(effects);
            })
            .run();
    }

    #[test]
    fn feed_created_is_idempotent() {
        let env = test_env();
        let reducer = SalesReducer::new();
        let mut state = SalesState::new();
        let event = SalesAction::ApplyEvent {
            event: ShopEvent::CustomProductCreated { sold: sold("sold-1") },
        };

        let _effects = reducer.reduce(&mut state, event.clone(), &env);
        let _effects = reducer.reduce(&mut state, event, &env);
        assert_eq!(state.sold.len(), 1);
    }

    #[test]
    fn feed_delete_of_an_absent_sale_is_a_noop() {
        let mut state = SalesState::new();
        state.sold = vec![sold("sold-1")];

        ReducerTest::new(SalesReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SalesAction::ApplyEvent {
                event: ShopEvent::CustomProductDeleted {
                    sold_id: SoldProductId::new("sold-9".to_string()),
                },
            })
            .then_state(|state| assert_eq!(state.sold.len(), 1))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn rejected_delete_records_the_error() {
        ReducerTest::new(SalesReducer::new())
            .with_env(test_env())
            .given_state(SalesState::new())
            .when_action(SalesAction::DeleteFailed {
                error: "409 conflict".to_string(),
            })
            .then_state(|state| {
                assert_eq!(state.last_delete_error.as_deref(), Some("409 conflict"));
            })
            .run();
    }
}
