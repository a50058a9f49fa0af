//! Event bus abstraction for the live shop feed.
//!
//! The storefront keeps its catalog current by subscribing to a stream of shop
//! events (part updates, product deletions, recorded sales), and the checkout
//! saga publishes sale confirmations back onto the same channel. This module
//! defines the transport-agnostic [`EventBus`] trait; concrete implementations
//! live in their own crates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  partUpdated,           ┌────────────────┐
//! │  Admin /     │  productDeleted, ...    │  Storefront    │
//! │  Backend     ├────────────────────────►│  catalog store │
//! └──────────────┘      (subscribe)        └────────────────┘
//!
//! ┌──────────────┐  customProductCreated   ┌────────────────┐
//! │  Checkout    ├────────────────────────►│  Other         │
//! │  saga        │      (publish)          │  consumers     │
//! └──────────────┘                         └────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: Events may be delivered multiple times
//! - **Idempotency**: Subscribers must handle duplicate events (apply the
//!   latest snapshot, delete by id)
//! - **Ordered within partition**: Events keyed by the same entity maintain order
//!
//! # Implementations
//!
//! - `MemoryEventBus` (testing crate) - For tests (fast, in-process)
//! - `RedpandaEventBus` (redpanda crate) - For production (Kafka-compatible)
//!
//! # Example
//!
//! ```rust,ignore
//! use cyclery_core::event_bus::{EventBus, EventStream};
//! use cyclery_core::event::SerializedEvent;
//!
//! async fn example(event_bus: impl EventBus) {
//!     // Publish an event
//!     let event = SerializedEvent::new("customProductCreated".to_string(), vec![1, 2, 3], None);
//!     event_bus.publish("shop-events", &event).await?;
//!
//!     // Subscribe to the feed
//!     let mut stream = event_bus.subscribe(&["shop-events"]).await?;
//!     while let Some(result) = stream.next().await {
//!         match result {
//!             Ok(event) => println!("Received: {:?}", event.event_type),
//!             Err(e) => eprintln!("Error: {}", e),
//!         }
//!     }
//! }
//! ```

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to deserialize an event
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of events from subscriptions.
///
/// Each item is a `Result` so that a single poison message surfaces as an
/// inline error without tearing down the subscription.
///
/// # Examples
///
/// ```rust,ignore
/// use futures::StreamExt;
///
/// let mut stream = event_bus.subscribe(&["shop-events"]).await?;
/// while let Some(result) = stream.next().await {
///     match result {
///         Ok(event) => apply_event(event),
///         Err(e) => tracing::warn!(error = %e, "feed error"),
///     }
/// }
/// ```
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// Provides publish/subscribe over named topics with at-least-once delivery.
/// The storefront uses a single topic for the whole feed and routes on
/// [`SerializedEvent::event_type`].
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to support concurrent access
/// from reducers and effect executors.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventBus>`). This is required for
/// the effect system where reducers create effects that capture the event bus.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// Events are published with at-least-once semantics. The event may be
    /// delivered to subscribers multiple times, so subscribers must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let event = SerializedEvent::from_event(&sale_recorded, None)?;
    /// event_bus.publish("shop-events", &event).await?;
    /// ```
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of events.
    ///
    /// Returns an [`EventStream`] that yields events from all subscribed topics
    /// with at-least-once semantics.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use futures::StreamExt;
    ///
    /// let mut stream = event_bus.subscribe(&["shop-events"]).await?;
    ///
    /// while let Some(result) = stream.next().await {
    ///     match result {
    ///         Ok(event) => match event.event_type.as_str() {
    ///             "partUpdated" => handle_part_updated(&event)?,
    ///             "productDeleted" => handle_product_deleted(&event)?,
    ///             _ => {}
    ///         },
    ///         Err(e) => tracing::error!("Stream error: {}", e),
    ///     }
    /// }
    /// ```
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
