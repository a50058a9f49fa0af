//! Compatibility rules for product customization.
//!
//! Pure functions over the catalog cache and the current selection. The
//! selection store consults [`evaluate`] before accepting a choice and the UI
//! renders [`options_for`] so blocked options show up greyed out with a
//! reason instead of disappearing.
//!
//! Rules are evaluated in a fixed priority: stock first, then per-product
//! restrictions, then cross-category combinations. A blocked option reports
//! only the highest-priority reason.

use crate::types::{Part, Product};
use std::collections::HashMap;

/// Category name for wheel options.
pub const WHEELS: &str = "Wheels";
/// Category name for frame options.
pub const FRAME_TYPE: &str = "Frame Type";
/// Category name for rim color options.
pub const RIM_COLOR: &str = "Rim Color";

/// Product type with a fixed category display prefix.
pub const BICYCLE: &str = "bicycle";

/// Wheel value that demands a full-suspension frame.
pub const MOUNTAIN_WHEELS: &str = "mountain wheels";
/// Wheel value that locks the rim color to black.
pub const FAT_BIKE_WHEELS: &str = "fat bike wheels";
/// The only frame compatible with mountain wheels.
pub const FULL_SUSPENSION: &str = "full-suspension";
/// The only rim color compatible with fat bike wheels.
pub const BLACK: &str = "black";

/// Why an option cannot be chosen right now.
///
/// Ordered by evaluation priority; fields carry no payload because the
/// blocked part itself is always at hand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockReason {
    /// The part is out of stock or flagged unavailable.
    Unavailable,
    /// The product bans this value in this category.
    RestrictedForProduct,
    /// An already-selected part in another category conflicts with this one.
    RestrictedCombination,
}

/// One option with its current block state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartOption {
    /// The catalog part.
    pub part: Part,
    /// Why the option is blocked, or `None` when choosable.
    pub blocked: Option<BlockReason>,
}

/// All options of one category, in catalog order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryOptions {
    /// Category name.
    pub category: String,
    /// The category's options with block states.
    pub options: Vec<PartOption>,
}

/// Returns the category display order for a product type.
///
/// Bicycles lead with Wheels, Frame Type, and Rim Color (those present in the
/// catalog); everything else follows in first-appearance order of the parts
/// list. Other product types use first-appearance order alone.
#[must_use]
pub fn ordered_categories(type_product: &str, parts: &[Part]) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::new();
    if type_product == BICYCLE {
        for fixed in [WHEELS, FRAME_TYPE, RIM_COLOR] {
            if parts.iter().any(|p| p.category == fixed) {
                ordered.push(fixed.to_string());
            }
        }
    }
    for part in parts {
        if !ordered.iter().any(|c| c == &part.category) {
            ordered.push(part.category.clone());
        }
    }
    ordered
}

/// Evaluates whether a candidate part can be chosen for the product given the
/// current selection.
///
/// Returns `None` when the choice is allowed.
#[must_use]
pub fn evaluate(
    product: &Product,
    candidate: &Part,
    selection: &HashMap<String, Part>,
) -> Option<BlockReason> {
    if !candidate.in_stock() {
        return Some(BlockReason::Unavailable);
    }
    if product.is_restricted(&candidate.category, &candidate.value) {
        return Some(BlockReason::RestrictedForProduct);
    }
    if combination_conflict(candidate, selection) {
        return Some(BlockReason::RestrictedCombination);
    }
    None
}

/// Cross-category rules, checked from both sides so the lock holds no matter
/// which category the customer fills first.
fn combination_conflict(candidate: &Part, selection: &HashMap<String, Part>) -> bool {
    match candidate.category.as_str() {
        FRAME_TYPE => {
            candidate.value != FULL_SUSPENSION
                && selection
                    .get(WHEELS)
                    .is_some_and(|w| w.value == MOUNTAIN_WHEELS)
        }
        RIM_COLOR => {
            candidate.value != BLACK
                && selection
                    .get(WHEELS)
                    .is_some_and(|w| w.value == FAT_BIKE_WHEELS)
        }
        WHEELS => {
            (candidate.value == MOUNTAIN_WHEELS
                && selection
                    .get(FRAME_TYPE)
                    .is_some_and(|f| f.value != FULL_SUSPENSION))
                || (candidate.value == FAT_BIKE_WHEELS
                    && selection.get(RIM_COLOR).is_some_and(|r| r.value != BLACK))
        }
        _ => false,
    }
}

/// Records a choice in the selection.
///
/// Choosing wheels resets every other category: wheel-driven locks would
/// otherwise leave stale incompatible picks behind.
pub fn apply_choice(selection: &mut HashMap<String, Part>, part: &Part) {
    if part.category == WHEELS {
        selection.clear();
    }
    selection.insert(part.category.clone(), part.clone());
}

/// Whether every category of the product type has a selected part.
///
/// A type with no part categories at all is trivially ready.
#[must_use]
pub fn is_ready(type_product: &str, parts: &[Part], selection: &HashMap<String, Part>) -> bool {
    ordered_categories(type_product, parts)
        .iter()
        .all(|category| selection.contains_key(category))
}

/// Builds the full option matrix for rendering: every category in display
/// order, every option annotated with its block state.
#[must_use]
pub fn options_for(
    product: &Product,
    parts: &[Part],
    selection: &HashMap<String, Part>,
) -> Vec<CategoryOptions> {
    ordered_categories(&product.type_product, parts)
        .into_iter()
        .map(|category| {
            let options = parts
                .iter()
                .filter(|p| p.category == category)
                .map(|p| PartOption {
                    blocked: evaluate(product, p, selection),
                    part: p.clone(),
                })
                .collect();
            CategoryOptions { category, options }
        })
        .collect()
}
