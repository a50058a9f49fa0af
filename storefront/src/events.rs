//! Live feed events published and consumed by the storefront.
//!
//! Admin consoles broadcast every catalog write on a single topic; each
//! storefront instance consumes the stream and reconciles its caches, the
//! open customization, and the cart. The storefront itself publishes sale
//! events at checkout and history deletions from the admin surface.

use crate::types::{Part, PartId, Product, ProductId, SoldProduct, SoldProductId};
use cyclery_core::event::{Event, EventError, SerializedEvent};
use serde::{Deserialize, Serialize};

/// Every event that travels on the shop feed.
///
/// Record-bearing variants carry the whole updated record, so applying one is
/// a plain replacement and redelivery is harmless.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ShopEvent {
    /// A product was created in the catalog.
    ProductCreated {
        /// The new product.
        product: Product,
    },
    /// A product's details changed.
    ProductUpdated {
        /// The full updated product.
        product: Product,
    },
    /// A product was removed from the catalog.
    ProductDeleted {
        /// Identifier of the removed product.
        product_id: ProductId,
    },
    /// A part was created in the catalog.
    PartCreated {
        /// The new part.
        part: Part,
    },
    /// A part's details or stock changed.
    PartUpdated {
        /// The full updated part.
        part: Part,
    },
    /// A part was removed from the catalog.
    PartDeleted {
        /// Identifier of the removed part.
        part_id: PartId,
    },
    /// A sale was recorded.
    CustomProductCreated {
        /// The recorded sale.
        sold: SoldProduct,
    },
    /// A sale was deleted from the history.
    CustomProductDeleted {
        /// Identifier of the deleted sale.
        sold_id: SoldProductId,
    },
}

impl ShopEvent {
    /// Decodes a feed envelope back into a `ShopEvent`.
    ///
    /// The envelope's `event_type` is informational; the payload encodes the
    /// variant.
    pub fn from_serialized(serialized: &SerializedEvent) -> Result<Self, EventError> {
        Self::from_bytes(&serialized.data)
    }
}

impl Event for ShopEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::ProductCreated { .. } => "productCreated",
            Self::ProductUpdated { .. } => "productUpdated",
            Self::ProductDeleted { .. } => "productDeleted",
            Self::PartCreated { .. } => "partCreated",
            Self::PartUpdated { .. } => "partUpdated",
            Self::PartDeleted { .. } => "partDeleted",
            Self::CustomProductCreated { .. } => "customProductCreated",
            Self::CustomProductDeleted { .. } => "customProductDeleted",
        }
    }
}
