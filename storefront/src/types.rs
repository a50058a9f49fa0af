//! Core domain types for the Cyclery storefront.
//!
//! Everything here is a plain value type: the catalog store owns the Product
//! and Part caches, the cart store owns CartItems, and every hand-off between
//! stores is a copy. Prices are integer cents to keep arithmetic exact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// VAT rate applied to cart totals, in percent.
pub const VAT_RATE_PERCENT: i64 = 21;

/// Money amount in cents.
///
/// REST payloads may carry prices as JSON numbers or strings; the API layer
/// coerces both into this type on the way in.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Zero cents.
    pub const ZERO: Self = Self(0);

    /// Creates a money amount from cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the value in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns the given percentage of this amount, truncating sub-cent
    /// remainders.
    #[must_use]
    pub const fn percent(self, pct: i64) -> Self {
        Self(self.0 * pct / 100)
    }
}

impl std::ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, std::ops::Add::add)
    }
}

impl fmt::Display for Money {
    /// Formats as `units.cc`, the form the backend expects for sold-product
    /// price strings.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0.rem_euclid(100))
    }
}

/// Unique identifier for a product, assigned by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a `ProductId` from a string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a part, assigned by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartId(String);

impl PartId {
    /// Creates a `PartId` from a string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a recorded sale, assigned by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoldProductId(String);

impl SoldProductId {
    /// Creates a `SoldProductId` from a string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SoldProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-assigned identity for a cart line.
///
/// Monotonically increasing within one cart, so "most recently added" is
/// well-defined when stock shrinks and lines must be evicted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CartLineId(u64);

impl CartLineId {
    /// Creates a `CartLineId` from its numeric value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CartLineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A product offered by the shop.
///
/// The type tag selects which part categories apply when customizing. The
/// restrictions map bans specific part values per category for this product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Backend-assigned identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Product type tag (`"bicycle"`, `"skis"`, ...).
    pub type_product: String,
    /// Base price before parts.
    pub base_price: Money,
    /// Whether the product is offered for new customizations.
    pub is_available: bool,
    /// Banned part values per category, e.g. `"Wheels" -> ["fat bike wheels"]`.
    pub restrictions: HashMap<String, Vec<String>>,
}

impl Product {
    /// Checks whether a part value is banned for this product.
    #[must_use]
    pub fn is_restricted(&self, category: &str, value: &str) -> bool {
        self.restrictions
            .get(category)
            .is_some_and(|banned| banned.iter().any(|v| v == value))
    }
}

/// One selectable option within a part category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Backend-assigned identifier.
    pub id: PartId,
    /// Product type this part belongs to.
    pub type_product: String,
    /// Category the part fills (`"Wheels"`, `"Frame Type"`, ...).
    pub category: String,
    /// Option name, unique within a category for a type.
    pub value: String,
    /// Unit price added to the product base price.
    pub price: Money,
    /// Remaining stock.
    pub quantity: u32,
    /// Availability flag set by the admin.
    pub is_available: bool,
}

impl Part {
    /// Whether the part can enter new selections.
    ///
    /// A part with quantity 0 is out of stock regardless of its stored flag.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.is_available && self.quantity > 0
    }
}

/// Snapshot of one chosen part inside a cart line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChosenPart {
    /// Identifier of the catalog part.
    pub id: PartId,
    /// Category the part fills.
    pub category: String,
    /// Option name.
    pub value: String,
    /// Unit price at the time of selection.
    pub price: Money,
}

impl ChosenPart {
    /// Builds a snapshot from a catalog part.
    #[must_use]
    pub fn from_part(part: &Part) -> Self {
        Self {
            id: part.id.clone(),
            category: part.category.clone(),
            value: part.value.clone(),
            price: part.price,
        }
    }
}

/// A finalized customization, verified and ready to enter the cart.
///
/// The cart assigns the line id when the item is added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfiguredProduct {
    /// Identifier of the customized product.
    pub product_id: ProductId,
    /// Product name at the time of configuration.
    pub product_name: String,
    /// Product type tag.
    pub type_product: String,
    /// Base price at the time of configuration.
    pub base_price: Money,
    /// Chosen parts in category display order.
    pub parts: Vec<ChosenPart>,
}

impl ConfiguredProduct {
    /// Final price: base plus every chosen part.
    #[must_use]
    pub fn price(&self) -> Money {
        self.base_price + self.parts.iter().map(|p| p.price).sum()
    }
}

/// One cart line: a configured product with stable client identity.
///
/// The snapshot never aliases the catalog cache; live feed events reconcile it
/// explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Client-assigned line identity.
    pub line_id: CartLineId,
    /// Identifier of the customized product.
    pub product_id: ProductId,
    /// Product name snapshot.
    pub product_name: String,
    /// Product type tag snapshot.
    pub type_product: String,
    /// Base price snapshot.
    pub base_price: Money,
    /// Chosen parts in category display order.
    pub parts: Vec<ChosenPart>,
}

impl CartItem {
    /// Builds a cart line from a verified configuration.
    #[must_use]
    pub fn new(line_id: CartLineId, configured: ConfiguredProduct) -> Self {
        Self {
            line_id,
            product_id: configured.product_id,
            product_name: configured.product_name,
            type_product: configured.type_product,
            base_price: configured.base_price,
            parts: configured.parts,
        }
    }

    /// Line price: base plus every chosen part.
    #[must_use]
    pub fn price(&self) -> Money {
        self.base_price + self.parts.iter().map(|p| p.price).sum()
    }

    /// Whether this line includes the given part.
    #[must_use]
    pub fn uses_part(&self, part_id: &PartId) -> bool {
        self.parts.iter().any(|p| &p.id == part_id)
    }
}

/// Counts how many cart lines consume a unit of the given part.
///
/// A line holds at most one part per category, so each line contributes at
/// most one occurrence; the same part id may still appear across many lines.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Cart sizes are far below u32::MAX
pub fn part_occurrences(items: &[CartItem], part_id: &PartId) -> u32 {
    items.iter().filter(|item| item.uses_part(part_id)).count() as u32
}

/// A finalized sale recorded in the backend history.
///
/// Immutable once created; admins may delete entries (a history edit, never a
/// stock reversal).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldProduct {
    /// Backend-assigned identifier.
    pub id: SoldProductId,
    /// Name of the sold product.
    pub name: String,
    /// Product type tag.
    pub type_product: String,
    /// Final price: base plus parts at sale time.
    pub price: Money,
    /// When the sale was recorded.
    pub created_at: DateTime<Utc>,
    /// Parts included in the sale.
    pub part_ids: Vec<PartId>,
}

/// Where the UI should navigate after a reconciliation or checkout outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavigationTarget {
    /// The catalog landing page.
    CatalogRoot,
    /// The detail page of a specific product.
    ProductDetail(ProductId),
}

/// A user-facing message produced by stock reconciliation, verification, or
/// checkout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// A cart line was removed because its product is gone or unavailable.
    ProductUnavailable {
        /// Name from the removed line's snapshot.
        product_name: String,
    },
    /// A cart product's details changed and the stored snapshot was refreshed.
    ProductChanged {
        /// Updated product name.
        product_name: String,
    },
    /// A cart line was removed because one of its parts is gone or unavailable.
    PartUnavailable {
        /// Name from the removed line's snapshot.
        product_name: String,
        /// Option name of the offending part.
        part_value: String,
    },
    /// A cart line was removed because remaining stock no longer covers it.
    InsufficientStock {
        /// Name from the removed line's snapshot.
        product_name: String,
        /// Option name of the short part.
        part_value: String,
    },
    /// Stock for a part is running low.
    LowStock {
        /// Option name of the part.
        part_value: String,
        /// Units left after accounting for the cart.
        remaining: u32,
    },
    /// Recording the sale of a cart line failed.
    SaleFailed {
        /// Name of the affected line.
        product_name: String,
        /// Backend failure description.
        reason: String,
    },
    /// Checkout was requested with an empty cart.
    CartEmpty,
    /// Checkout stopped before completion.
    CheckoutFailed {
        /// Failure description.
        reason: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProductUnavailable { product_name } => write!(
                f,
                "\"{product_name}\" is no longer available and was removed from your cart"
            ),
            Self::ProductChanged { product_name } => write!(
                f,
                "\"{product_name}\" was updated by the shop; your cart shows the latest details"
            ),
            Self::PartUnavailable {
                product_name,
                part_value,
            } => write!(
                f,
                "\"{product_name}\" was removed from your cart: \"{part_value}\" is no longer available"
            ),
            Self::InsufficientStock {
                product_name,
                part_value,
            } => write!(
                f,
                "\"{product_name}\" was removed from your cart: not enough \"{part_value}\" left in stock"
            ),
            Self::LowStock {
                part_value,
                remaining,
            } => write!(f, "Only {remaining} left in stock for \"{part_value}\""),
            Self::SaleFailed {
                product_name,
                reason,
            } => write!(f, "Could not record the sale of \"{product_name}\": {reason}"),
            Self::CartEmpty => write!(f, "Your cart is empty"),
            Self::CheckoutFailed { reason } => {
                write!(f, "Checkout could not be completed: {reason}")
            }
        }
    }
}

/// Normalizes an admin-entered product type: trimmed and lowercased.
#[must_use]
pub fn normalize_type(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalizes an admin-entered category: Title Case with collapsed whitespace.
#[must_use]
pub fn normalize_category(raw: &str) -> String {
    raw.split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizes an admin-entered part value: trimmed and lowercased.
#[must_use]
pub fn normalize_value(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
    })
}
