//! Catalog store: products, parts, and restriction options.
//!
//! Owns the client-side cache of everything the backend sells. Reads are
//! explicit fetches; a failed refresh keeps the stale cache on display with
//! an error flag. Admin writes go through the backend first and the cache
//! applies the stored record from the response, so the catalog never shows a
//! state the backend did not confirm. Live feed events reconcile the same
//! cache, which also absorbs the echo of this instance's own writes.

use crate::api::{PartDraft, ProductDraft, ProductPatch, RestrictionOptionGroup, ShopApi};
use crate::events::ShopEvent;
use crate::stores::FetchSurface;
use crate::types::{Part, PartId, Product, ProductId};
use cyclery_core::{Effect, Reducer, SmallVec, async_effect, smallvec};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// How the storefront grid orders products.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ProductSort {
    /// Backend catalog order.
    #[default]
    CatalogOrder,
    /// Cheapest base price first.
    PriceAscending,
    /// Most expensive base price first.
    PriceDescending,
}

/// Cached catalog data plus the fetch surfaces the UI renders from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogState {
    /// Every product, in backend catalog order, available or not.
    pub products: Vec<Product>,
    /// Parts per product type. A type appears here once its parts were
    /// fetched, even when the list came back empty.
    pub parts_by_type: HashMap<String, Vec<Part>>,
    /// Restriction-form groups per product type.
    pub restriction_options: HashMap<String, Vec<RestrictionOptionGroup>>,
    /// Product list fetch surface.
    pub products_fetch: FetchSurface,
    /// Parts fetch surface.
    pub parts_fetch: FetchSurface,
    /// Restriction options fetch surface.
    pub options_fetch: FetchSurface,
    /// The last failed admin write, cleared by the next successful one.
    pub last_write_error: Option<String>,
}

impl CatalogState {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Products for the storefront grid: available ones only, optionally
    /// filtered by type, in the requested order. Price ties keep catalog
    /// order.
    #[must_use]
    pub fn visible_products(&self, type_filter: Option<&str>, sort: ProductSort) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|p| p.is_available)
            .filter(|p| type_filter.is_none_or(|t| p.type_product == t))
            .cloned()
            .collect();
        match sort {
            ProductSort::CatalogOrder => {}
            ProductSort::PriceAscending => {
                products.sort_by(|a, b| a.base_price.cmp(&b.base_price));
            }
            ProductSort::PriceDescending => {
                products.sort_by(|a, b| b.base_price.cmp(&a.base_price));
            }
        }
        products
    }

    /// Looks up a product by id, available or not.
    #[must_use]
    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|p| &p.id == id)
    }

    /// The cached parts for a type. Empty when never fetched.
    #[must_use]
    pub fn parts_for(&self, type_product: &str) -> &[Part] {
        self.parts_by_type
            .get(type_product)
            .map_or(&[], Vec::as_slice)
    }

    /// Whether parts for a type have been fetched at least once.
    #[must_use]
    pub fn has_parts_for(&self, type_product: &str) -> bool {
        self.parts_by_type.contains_key(type_product)
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Which fetch surface a failure belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CatalogSurface {
    /// The product list.
    Products,
    /// A parts list.
    Parts,
    /// A restriction options list.
    Options,
}

/// Everything the catalog store reacts to.
#[derive(Clone, Debug)]
pub enum CatalogAction {
    /// Fetch the full product list.
    FetchProducts,
    /// Fetch every part for a product type.
    FetchParts {
        /// Product type to fetch parts for.
        type_product: String,
    },
    /// Fetch the restriction-form groups for a product type.
    FetchPartOptions {
        /// Product type to fetch options for.
        type_product: String,
    },
    /// The product list arrived.
    ProductsLoaded {
        /// The full replacement list.
        products: Vec<Product>,
    },
    /// A parts list arrived.
    PartsLoaded {
        /// Type the list belongs to.
        type_product: String,
        /// The full replacement list for the type.
        parts: Vec<Part>,
    },
    /// A restriction options list arrived.
    PartOptionsLoaded {
        /// Type the groups belong to.
        type_product: String,
        /// The full replacement groups for the type.
        groups: Vec<RestrictionOptionGroup>,
    },
    /// A fetch failed; the stale cache stays on display.
    FetchFailed {
        /// Which surface failed.
        surface: CatalogSurface,
        /// Failure description.
        error: String,
    },
    /// Admin: create a product.
    CreateProduct {
        /// Form input, normalized before the request goes out.
        draft: ProductDraft,
    },
    /// Admin: replace a product.
    UpdateProduct {
        /// The full replacement record.
        product: Product,
    },
    /// Admin: replace a product's restrictions.
    PatchProductRestrictions {
        /// Product to patch.
        product_id: ProductId,
        /// The new restrictions map.
        restrictions: HashMap<String, Vec<String>>,
    },
    /// Admin: delete a product.
    DeleteProduct {
        /// Product to delete.
        product_id: ProductId,
    },
    /// Admin: create a part.
    CreatePart {
        /// Form input, normalized before the request goes out.
        draft: PartDraft,
    },
    /// Admin: replace a part.
    UpdatePart {
        /// The full replacement record.
        part: Part,
    },
    /// Admin: delete a part.
    DeletePart {
        /// Part to delete.
        part_id: PartId,
    },
    /// The backend confirmed a product write; apply the stored record.
    ProductSaved {
        /// The record as the backend stored it.
        product: Product,
    },
    /// The backend confirmed a product deletion.
    ProductRemoved {
        /// The deleted product's id.
        product_id: ProductId,
    },
    /// The backend confirmed a part write; apply the stored record.
    PartSaved {
        /// The record as the backend stored it.
        part: Part,
    },
    /// The backend confirmed a part deletion.
    PartRemoved {
        /// The deleted part's id.
        part_id: PartId,
    },
    /// An admin write failed; the cache is untouched.
    WriteFailed {
        /// Failure description.
        error: String,
    },
    /// A live feed event to reconcile the cache with.
    ApplyEvent {
        /// The decoded feed event.
        event: ShopEvent,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Injected dependencies for the catalog store.
#[derive(Clone)]
pub struct CatalogEnvironment {
    /// Backend REST client.
    pub api: Arc<dyn ShopApi>,
}

impl CatalogEnvironment {
    /// Creates the environment.
    #[must_use]
    pub fn new(api: Arc<dyn ShopApi>) -> Self {
        Self { api }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the catalog store.
#[derive(Clone, Debug)]
pub struct CatalogReducer;

impl CatalogReducer {
    /// Creates the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn upsert_product(products: &mut Vec<Product>, product: Product) {
        match products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product,
            None => products.push(product),
        }
    }

    /// Inserts or replaces a part, keeping bucket positions stable. A part
    /// whose type changed is scrubbed from every other bucket. Types that
    /// were never fetched get no bucket; their first fetch returns fresh
    /// data anyway.
    fn upsert_part(parts_by_type: &mut HashMap<String, Vec<Part>>, part: Part) {
        for (bucket_type, bucket) in parts_by_type.iter_mut() {
            if *bucket_type != part.type_product {
                bucket.retain(|p| p.id != part.id);
            }
        }
        if let Some(bucket) = parts_by_type.get_mut(&part.type_product) {
            match bucket.iter_mut().find(|p| p.id == part.id) {
                Some(existing) => *existing = part,
                None => bucket.push(part),
            }
        }
    }

    /// Deletion events carry only the id, so every bucket is scanned.
    fn remove_part(parts_by_type: &mut HashMap<String, Vec<Part>>, id: &PartId) {
        for bucket in parts_by_type.values_mut() {
            bucket.retain(|p| &p.id != id);
        }
    }

    /// Applies a feed event to the cache. Whole-record replacement keeps
    /// this idempotent, so the echo of this instance's own admin writes is
    /// absorbed without special handling.
    fn apply_event(state: &mut CatalogState, event: ShopEvent) {
        match event {
            ShopEvent::ProductCreated { product } | ShopEvent::ProductUpdated { product } => {
                Self::upsert_product(&mut state.products, product);
            }
            ShopEvent::ProductDeleted { product_id } => {
                state.products.retain(|p| p.id != product_id);
            }
            ShopEvent::PartCreated { part } | ShopEvent::PartUpdated { part } => {
                Self::upsert_part(&mut state.parts_by_type, part);
            }
            ShopEvent::PartDeleted { part_id } => {
                Self::remove_part(&mut state.parts_by_type, &part_id);
            }
            // Sales history lives in the sales store.
            ShopEvent::CustomProductCreated { .. } | ShopEvent::CustomProductDeleted { .. } => {}
        }
    }
}

impl Default for CatalogReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for CatalogReducer {
    type State = CatalogState;
    type Action = CatalogAction;
    type Environment = CatalogEnvironment;

    #[allow(clippy::too_many_lines)] // Complex business logic required
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ----------------------------------------------------------------
            // Fetches
            // ----------------------------------------------------------------
            CatalogAction::FetchProducts => {
                state.products_fetch.begin();
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.fetch_products().await {
                        Ok(products) => Some(CatalogAction::ProductsLoaded { products }),
                        Err(error) => Some(CatalogAction::FetchFailed {
                            surface: CatalogSurface::Products,
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::FetchParts { type_product } => {
                state.parts_fetch.begin();
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.fetch_parts(&type_product).await {
                        Ok(parts) => Some(CatalogAction::PartsLoaded { type_product, parts }),
                        Err(error) => Some(CatalogAction::FetchFailed {
                            surface: CatalogSurface::Parts,
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::FetchPartOptions { type_product } => {
                state.options_fetch.begin();
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.fetch_part_options(&type_product).await {
                        Ok(groups) => {
                            Some(CatalogAction::PartOptionsLoaded { type_product, groups })
                        }
                        Err(error) => Some(CatalogAction::FetchFailed {
                            surface: CatalogSurface::Options,
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::ProductsLoaded { products } => {
                tracing::debug!(count = products.len(), "Product catalog refreshed");
                state.products = products;
                state.products_fetch.succeed();
                SmallVec::new()
            }
            CatalogAction::PartsLoaded { type_product, parts } => {
                tracing::debug!(%type_product, count = parts.len(), "Parts refreshed");
                state.parts_by_type.insert(type_product, parts);
                state.parts_fetch.succeed();
                SmallVec::new()
            }
            CatalogAction::PartOptionsLoaded { type_product, groups } => {
                state.restriction_options.insert(type_product, groups);
                state.options_fetch.succeed();
                SmallVec::new()
            }
            CatalogAction::FetchFailed { surface, error } => {
                tracing::warn!(?surface, %error, "Catalog fetch failed, keeping stale cache");
                match surface {
                    CatalogSurface::Products => state.products_fetch.fail(error),
                    CatalogSurface::Parts => state.parts_fetch.fail(error),
                    CatalogSurface::Options => state.options_fetch.fail(error),
                }
                SmallVec::new()
            }

            // ----------------------------------------------------------------
            // Admin writes
            // ----------------------------------------------------------------
            CatalogAction::CreateProduct { draft } => {
                let draft = draft.normalized();
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.create_product(&draft).await {
                        Ok(product) => Some(CatalogAction::ProductSaved { product }),
                        Err(error) => Some(CatalogAction::WriteFailed {
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::UpdateProduct { product } => {
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.update_product(&product).await {
                        Ok(product) => Some(CatalogAction::ProductSaved { product }),
                        Err(error) => Some(CatalogAction::WriteFailed {
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::PatchProductRestrictions {
                product_id,
                restrictions,
            } => {
                let api = Arc::clone(&env.api);
                let patch = ProductPatch {
                    restrictions: Some(restrictions),
                    ..ProductPatch::default()
                };
                smallvec![async_effect! {
                    match api.patch_product(&product_id, &patch).await {
                        Ok(product) => Some(CatalogAction::ProductSaved { product }),
                        Err(error) => Some(CatalogAction::WriteFailed {
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::DeleteProduct { product_id } => {
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.delete_product(&product_id).await {
                        Ok(()) => Some(CatalogAction::ProductRemoved { product_id }),
                        Err(error) => Some(CatalogAction::WriteFailed {
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::CreatePart { draft } => {
                let draft = draft.normalized();
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.create_part(&draft).await {
                        Ok(part) => Some(CatalogAction::PartSaved { part }),
                        Err(error) => Some(CatalogAction::WriteFailed {
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::UpdatePart { part } => {
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.update_part(&part).await {
                        Ok(part) => Some(CatalogAction::PartSaved { part }),
                        Err(error) => Some(CatalogAction::WriteFailed {
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::DeletePart { part_id } => {
                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    match api.delete_part(&part_id).await {
                        Ok(()) => Some(CatalogAction::PartRemoved { part_id }),
                        Err(error) => Some(CatalogAction::WriteFailed {
                            error: error.to_string(),
                        }),
                    }
                }]
            }
            CatalogAction::ProductSaved { product } => {
                state.last_write_error = None;
                Self::upsert_product(&mut state.products, product);
                SmallVec::new()
            }
            CatalogAction::ProductRemoved { product_id } => {
                state.last_write_error = None;
                state.products.retain(|p| p.id != product_id);
                SmallVec::new()
            }
            CatalogAction::PartSaved { part } => {
                state.last_write_error = None;
                Self::upsert_part(&mut state.parts_by_type, part);
                SmallVec::new()
            }
            CatalogAction::PartRemoved { part_id } => {
                state.last_write_error = None;
                Self::remove_part(&mut state.parts_by_type, &part_id);
                SmallVec::new()
            }
            CatalogAction::WriteFailed { error } => {
                tracing::warn!(%error, "Catalog write failed");
                state.last_write_error = Some(error);
                SmallVec::new()
            }

            // ----------------------------------------------------------------
            // Live feed
            // ----------------------------------------------------------------
            CatalogAction::ApplyEvent { event } => {
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
    use crate::types::Money;
    use cyclery_runtime::Store;
    use cyclery_testing::{ReducerTest, assertions};
    use std::time::Duration;

    fn product(id: &str, name: &str, price: i64, available: bool) -> Product {
        Product {
            id: ProductId::new(id.to_string()),
            name: name.to_string(),
            type_product: "bicycle".to_string(),
            base_price: Money::from_cents(price),
            is_available: available,
            restrictions: HashMap::new(),
        }
    }

    fn part(id: &str, type_product: &str, category: &str, value: &str) -> Part {
        Part {
            id: PartId::new(id.to_string()),
            type_product: type_product.to_string(),
            category: category.to_string(),
            value: value.to_string(),
            price: Money::from_cents(5_000),
            quantity: 5,
            is_available: true,
        }
    }

    fn env() -> CatalogEnvironment {
        CatalogEnvironment::new(Arc::new(InMemoryShopApi::new()))
    }

    #[test]
    fn fetch_products_marks_loading_and_spawns_fetch() {
        ReducerTest::new(CatalogReducer::new())
            .with_env(env())
            .given_state(CatalogState::new())
            .when_action(CatalogAction::FetchProducts)
            .then_state(|state| {
                assert!(state.products_fetch.loading);
                assert!(state.products_fetch.error.is_none());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn products_loaded_replaces_cache_wholesale() {
        let mut state = CatalogState::new();
        state.products = vec![product("old", "Old Bike", 10_000, true)];
        state.products_fetch.begin();

        ReducerTest::new(CatalogReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CatalogAction::ProductsLoaded {
                products: vec![
                    product("p1", "Trail Bike", 50_000, true),
                    product("p2", "City Bike", 40_000, true),
                ],
            })
            .then_state(|state| {
                assert_eq!(state.products.len(), 2);
                assert_eq!(state.products[0].id.as_str(), "p1");
                assert!(!state.products_fetch.loading);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn fetch_failure_keeps_stale_cache() {
        let mut state = CatalogState::new();
        state.products = vec![product("p1", "Trail Bike", 50_000, true)];
        state.products_fetch.begin();

        ReducerTest::new(CatalogReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CatalogAction::FetchFailed {
                surface: CatalogSurface::Products,
                error: "connection refused".to_string(),
            })
            .then_state(|state| {
                assert_eq!(state.products.len(), 1);
                assert!(!state.products_fetch.loading);
                assert_eq!(
                    state.products_fetch.error.as_deref(),
                    Some("connection refused")
                );
            })
            .run();
    }

    #[test]
    fn visible_products_filter_and_sort() {
        let mut state = CatalogState::new();
        state.products = vec![
            product("p1", "Trail Bike", 50_000, true),
            product("p2", "City Bike", 40_000, true),
            product("p3", "Hidden Bike", 30_000, false),
        ];
        state.products.push(Product {
            type_product: "skis".to_string(),
            ..product("s1", "Alpine Skis", 45_000, true)
        });

        let visible = state.visible_products(None, ProductSort::CatalogOrder);
        assert_eq!(visible.len(), 3);
        assert!(visible.iter().all(|p| p.is_available));

        let bikes = state.visible_products(Some("bicycle"), ProductSort::PriceAscending);
        assert_eq!(bikes.len(), 2);
        assert_eq!(bikes[0].id.as_str(), "p2");

        let descending = state.visible_products(None, ProductSort::PriceDescending);
        assert_eq!(descending[0].id.as_str(), "p1");
    }

    #[test]
    fn product_update_event_preserves_catalog_order() {
        let mut state = CatalogState::new();
        state.products = vec![
            product("p1", "Trail Bike", 50_000, true),
            product("p2", "City Bike", 40_000, true),
        ];

        ReducerTest::new(CatalogReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CatalogAction::ApplyEvent {
                event: ShopEvent::ProductUpdated {
                    product: product("p1", "Trail Bike Deluxe", 55_000, true),
                },
            })
            .then_state(|state| {
                assert_eq!(state.products.len(), 2);
                assert_eq!(state.products[0].name, "Trail Bike Deluxe");
                assert_eq!(state.products[1].id.as_str(), "p2");
            })
            .run();
    }

    #[test]
    fn apply_event_is_idempotent() {
        let mut state = CatalogState::new();
        state.parts_by_type.insert("bicycle".to_string(), Vec::new());

        let event = ShopEvent::PartCreated {
            part: part("w1", "bicycle", "Wheels", "road wheels"),
        };
        let reducer = CatalogReducer::new();
        let environment = env();

        reducer.reduce(
            &mut state,
            CatalogAction::ApplyEvent {
                event: event.clone(),
            },
            &environment,
        );
        let after_first = state.clone();
        reducer.reduce(&mut state, CatalogAction::ApplyEvent { event }, &environment);

        assert_eq!(state, after_first);
        assert_eq!(state.parts_for("bicycle").len(), 1);
    }

    #[test]
    fn part_type_change_scrubs_old_bucket() {
        let mut state = CatalogState::new();
        state.parts_by_type.insert(
            "bicycle".to_string(),
            vec![part("w1", "bicycle", "Wheels", "road wheels")],
        );
        state.parts_by_type.insert("skis".to_string(), Vec::new());

        ReducerTest::new(CatalogReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CatalogAction::ApplyEvent {
                event: ShopEvent::PartUpdated {
                    part: part("w1", "skis", "Bindings", "race bindings"),
                },
            })
            .then_state(|state| {
                assert!(state.parts_for("bicycle").is_empty());
                assert_eq!(state.parts_for("skis").len(), 1);
            })
            .run();
    }

    #[test]
    fn part_deleted_scans_every_bucket() {
        let mut state = CatalogState::new();
        state.parts_by_type.insert(
            "bicycle".to_string(),
            vec![
                part("w1", "bicycle", "Wheels", "road wheels"),
                part("w2", "bicycle", "Wheels", "mountain wheels"),
            ],
        );

        ReducerTest::new(CatalogReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CatalogAction::ApplyEvent {
                event: ShopEvent::PartDeleted {
                    part_id: PartId::new("w1".to_string()),
                },
            })
            .then_state(|state| {
                assert_eq!(state.parts_for("bicycle").len(), 1);
                assert_eq!(state.parts_for("bicycle")[0].id.as_str(), "w2");
            })
            .run();
    }

    #[test]
    fn part_event_for_unfetched_type_is_ignored() {
        ReducerTest::new(CatalogReducer::new())
            .with_env(env())
            .given_state(CatalogState::new())
            .when_action(CatalogAction::ApplyEvent {
                event: ShopEvent::PartCreated {
                    part: part("w1", "bicycle", "Wheels", "road wheels"),
                },
            })
            .then_state(|state| {
                assert!(!state.has_parts_for("bicycle"));
            })
            .run();
    }

    #[test]
    fn write_failure_is_recorded_without_touching_cache() {
        let mut state = CatalogState::new();
        state.products = vec![product("p1", "Trail Bike", 50_000, true)];

        ReducerTest::new(CatalogReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CatalogAction::WriteFailed {
                error: "422 from /products".to_string(),
            })
            .then_state(|state| {
                assert_eq!(state.products.len(), 1);
                assert_eq!(state.last_write_error.as_deref(), Some("422 from /products"));
            })
            .run();
    }

    #[tokio::test]
    async fn fetch_flow_populates_state_through_the_store() {
        let api = Arc::new(InMemoryShopApi::with_catalog(
            vec![product("p1", "Trail Bike", 50_000, true)],
            vec![part("w1", "bicycle", "Wheels", "road wheels")],
        ));
        let store = Store::new(
            CatalogState::new(),
            CatalogReducer::new(),
            CatalogEnvironment::new(api),
        );

        let mut handle = store.send(CatalogAction::FetchProducts).await.unwrap();
        handle.wait().await;
        let mut handle = store
            .send(CatalogAction::FetchParts {
                type_product: "bicycle".to_string(),
            })
            .await
            .unwrap();
        handle.wait().await;

        let (products, parts) = store
            .state(|s| (s.products.clone(), s.parts_for("bicycle").to_vec()))
            .await;
        assert_eq!(products.len(), 1);
        assert_eq!(parts.len(), 1);
    }

    #[tokio::test]
    async fn admin_create_normalizes_before_the_request() {
        let store = Store::new(
            CatalogState::new(),
            CatalogReducer::new(),
            CatalogEnvironment::new(Arc::new(InMemoryShopApi::new())),
        );

        let saved = store
            .send_and_wait_for(
                CatalogAction::CreatePart {
                    draft: PartDraft {
                        type_product: " Bicycle ".to_string(),
                        category: "frame type".to_string(),
                        value: " Diamond ".to_string(),
                        price: Money::from_cents(12_000),
                        quantity: 4,
                        is_available: true,
                    },
                },
                |a| matches!(a, CatalogAction::PartSaved { .. } | CatalogAction::WriteFailed { .. }),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        match saved {
            CatalogAction::PartSaved { part } => {
                assert_eq!(part.type_product, "bicycle");
                assert_eq!(part.category, "Frame Type");
                assert_eq!(part.value, "diamond");
            }
            other => panic!("expected PartSaved, got {other:?}"),
        }
    }
}
