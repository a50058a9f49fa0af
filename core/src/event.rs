//! Event trait and wire types for the live shop feed.
//!
//! The storefront stays current through a push channel that announces catalog,
//! inventory, and sales changes as named events. This module defines the
//! abstraction those events implement and the serialized form they travel in.
//!
//! Payloads are serialized with `bincode`: compact, fast, and identical on both
//! ends of an all-Rust pipeline. The event-type string rides alongside the bytes
//! so consumers can route before deserializing.
//!
//! # Example
//!
//! ```
//! use cyclery_core::event::Event;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum FeedEvent {
//!     PartDeleted { id: String },
//! }
//!
//! impl Event for FeedEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             FeedEvent::PartDeleted { .. } => "partDeleted",
//!         }
//!     }
//! }
//! ```

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// An event announced on the live shop feed.
///
/// Events are immutable facts: a part changed, a product was deleted, a sale was
/// recorded. Consumers apply them to local caches and must tolerate duplicate
/// delivery.
///
/// # Event Naming
///
/// `event_type()` returns a stable string identifier used for storage, routing,
/// and observability. The shop feed's names are fixed by the backend channel
/// (`productUpdated`, `partDeleted`, ...), so implementations return those
/// strings verbatim.
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` to be safely passed between tasks in
/// the async runtime.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the event cannot be
    /// serialized. Rare with bincode, but surfaced rather than swallowed.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the bytes are corrupted,
    /// belong to a different event type, or the schema changed incompatibly.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for transport.
///
/// Contains the event type name and the serialized bytes, along with optional
/// metadata. This is the wire format between the application and the feed
/// transport.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "partUpdated").
    pub event_type: String,

    /// The bincode-serialized event data.
    pub data: Vec<u8>,

    /// Optional metadata as JSON.
    ///
    /// Common fields:
    /// - `correlation_id`: Links related events (e.g., all sales of one checkout)
    /// - `timestamp`: When the event was created (ISO 8601)
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    ///
    /// # Examples
    ///
    /// ```
    /// use cyclery_core::event::SerializedEvent;
    ///
    /// let event = SerializedEvent::new(
    ///     "partDeleted".to_string(),
    ///     vec![1, 2, 3, 4],
    ///     None,
    /// );
    /// ```
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Create a serialized event from an [`Event`] value.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the event cannot be
    /// serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Test code can use expect
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    enum FeedEvent {
        Updated { id: String, quantity: u32 },
        Deleted { id: String },
    }

    impl Event for FeedEvent {
        fn event_type(&self) -> &'static str {
            match self {
                FeedEvent::Updated { .. } => "partUpdated",
                FeedEvent::Deleted { .. } => "partDeleted",
            }
        }
    }

    #[test]
    fn event_type_returns_feed_name() {
        let event = FeedEvent::Deleted {
            id: "part-9".to_string(),
        };
        assert_eq!(event.event_type(), "partDeleted");
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn event_serialization_roundtrip() {
        let event = FeedEvent::Updated {
            id: "part-1".to_string(),
            quantity: 4,
        };

        let bytes = event.to_bytes().expect("serialization should succeed");
        let deserialized = FeedEvent::from_bytes(&bytes).expect("deserialization should succeed");

        assert_eq!(event, deserialized);
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn serialized_event_from_event() {
        let event = FeedEvent::Updated {
            id: "part-1".to_string(),
            quantity: 2,
        };

        let metadata = serde_json::json!({ "correlation_id": "checkout-42" });

        let serialized = SerializedEvent::from_event(&event, Some(metadata.clone()))
            .expect("serialization should succeed");

        assert_eq!(serialized.event_type, "partUpdated");
        assert!(!serialized.data.is_empty());
        assert_eq!(serialized.metadata, Some(metadata));
    }

    #[test]
    fn serialized_event_display() {
        let serialized = SerializedEvent::new("partUpdated".to_string(), vec![1, 2, 3, 4, 5], None);

        let display = format!("{serialized}");
        assert!(display.contains("partUpdated"));
        assert!(display.contains("5 bytes"));
    }
}
