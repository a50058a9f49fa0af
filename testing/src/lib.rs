//! # Cyclery Testing
//!
//! Testing utilities and mocks for the Cyclery storefront engine.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (clock, event bus)
//! - A fluent Given-When-Then harness for reducer tests
//! - Assertion helpers for effects
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use cyclery_testing::{ReducerTest, assertions};
//!
//! ReducerTest::new(SelectionReducer)
//!     .with_env(test_environment())
//!     .given_state(SelectionState::default())
//!     .when_action(SelectionAction::Choose { part })
//!     .then_state(|state| {
//!         assert_eq!(state.chosen.len(), 1);
//!     })
//!     .then_effects(assertions::assert_no_effects)
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use cyclery_core::environment::Clock;


/// Mock implementations of Environment traits.
///
/// Contains:
/// - [`FixedClock`](mocks::FixedClock): deterministic time
/// - [`InMemoryEventBus`](mocks::InMemoryEventBus): captures publishes and
///   replays injected events to subscribers
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use cyclery_core::event::{Event, SerializedEvent};
    use cyclery_core::event_bus::{EventBus, EventBusError, EventStream};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex, PoisonError};
    use tokio::sync::{broadcast, mpsc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use cyclery_testing::mocks::FixedClock;
    /// use cyclery_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Wrap a domain event in its wire envelope.
    ///
    /// Shorthand for [`SerializedEvent::from_event`] without metadata, so
    /// tests injecting feed events stay one-liners.
    ///
    /// # Example
    ///
    /// ```
    /// use cyclery_testing::mocks::feed_event;
    /// use cyclery_core::event::Event;
    /// use serde::{Serialize, Deserialize};
    ///
    /// #[derive(Clone, Debug, Serialize, Deserialize)]
    /// enum FeedEvent {
    ///     PartDeleted { id: String },
    /// }
    ///
    /// impl Event for FeedEvent {
    ///     fn event_type(&self) -> &'static str {
    ///         "partDeleted"
    ///     }
    /// }
    ///
    /// let event = feed_event(&FeedEvent::PartDeleted { id: "chain-single".to_string() });
    /// assert_eq!(event.event_type, "partDeleted");
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the event cannot be serialized, which does not happen for
    /// ordinary derive(Serialize) types.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn feed_event<E: Event + serde::Serialize>(event: &E) -> SerializedEvent {
        SerializedEvent::from_event(event, None).expect("test event should serialize")
    }

    /// In-memory event bus for fast, deterministic testing.
    ///
    /// Records every publish for later assertions and fans published events
    /// out to active subscribers, so the same instance can stand in for the
    /// broker on both sides of a test: the storefront publishes its sale
    /// events into it, and the feed loop subscribes to events the test
    /// injects with [`publish`](EventBus::publish).
    ///
    /// Subscribers only receive events published after they subscribed.
    ///
    /// # Example
    ///
    /// ```
    /// use cyclery_testing::mocks::InMemoryEventBus;
    /// use cyclery_core::event::SerializedEvent;
    /// use cyclery_core::event_bus::EventBus;
    ///
    /// let bus = InMemoryEventBus::new();
    /// tokio_test::block_on(async {
    ///     let event = SerializedEvent::new("productDeleted".to_string(), vec![1, 2, 3], None);
    ///     bus.publish("shop-events", &event).await.unwrap();
    /// });
    /// assert_eq!(bus.published_count(), 1);
    /// ```
    #[derive(Debug, Default)]
    pub struct InMemoryEventBus {
        published: Arc<Mutex<Vec<(String, SerializedEvent)>>>,
        topics: Arc<Mutex<HashMap<String, broadcast::Sender<SerializedEvent>>>>,
    }

    impl InMemoryEventBus {
        /// Create a new empty in-memory event bus
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All events published so far, with their topics
        #[must_use]
        pub fn published(&self) -> Vec<(String, SerializedEvent)> {
            self.published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of events published so far
        #[must_use]
        pub fn published_count(&self) -> usize {
            self.published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        /// Clear the publish log (for test isolation)
        pub fn clear(&self) {
            self.published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }

        fn sender_for(&self, topic: &str) -> broadcast::Sender<SerializedEvent> {
            let mut topics = self
                .topics
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(64).0)
                .clone()
        }
    }

    impl EventBus for InMemoryEventBus {
        fn publish(
            &self,
            topic: &str,
            event: &SerializedEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
            let topic = topic.to_string();
            let event = event.clone();
            Box::pin(async move {
                self.published
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((topic.clone(), event.clone()));

                // No subscribers is fine, broadcast send just reports zero receivers
                let _ = self.sender_for(&topic).send(event);
                Ok(())
            })
        }

        fn subscribe(
            &self,
            topics: &[&str],
        ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>
        {
            // Register receivers synchronously so events published right after
            // subscribe() resolves are never missed
            let receivers: Vec<broadcast::Receiver<SerializedEvent>> = topics
                .iter()
                .map(|topic| self.sender_for(topic).subscribe())
                .collect();

            Box::pin(async move {
                let (tx, mut rx) = mpsc::channel::<SerializedEvent>(256);

                for mut receiver in receivers {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        loop {
                            match receiver.recv().await {
                                Ok(event) => {
                                    if tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                Err(broadcast::error::RecvError::Lagged(_)) => {}
                                Err(broadcast::error::RecvError::Closed) => break,
                            }
                        }
                    });
                }
                drop(tx);

                let stream = async_stream::stream! {
                    while let Some(event) = rx.recv().await {
                        yield Ok(event);
                    }
                };

                Ok(Box::pin(stream) as EventStream)
            })
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Initialize a tracing subscriber for tests.
    ///
    /// Safe to call from every test; only the first call installs the
    /// subscriber. Output goes through the test writer so it is captured
    /// per test and shown only on failure.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing strategies using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Strategy for price amounts in cents (0 to 100,000.00 in whole cents)
    pub fn cents() -> impl Strategy<Value = i64> {
        0..=10_000_000_i64
    }

    /// Strategy for stock quantities as the admin console enters them
    pub fn quantity() -> impl Strategy<Value = u32> {
        0..=500_u32
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryEventBus, feed_event, test_clock};
pub use reducer_test::{ReducerTest, assertions};
