//! Application coordinator - main application lifecycle manager.
//!
//! `ShopApp` owns the five domain stores, the REST client, and the event bus
//! subscription, and exposes the storefront and admin flows as async methods.
//! Each method sends an action into the owning store and waits for the store
//! to settle, so callers observe a consistent state when the call returns.

use crate::api::{
    HttpShopApi, PartDraft, ProductDraft, RestrictionOptionGroup, ShopApi, ShopApiError,
};
use crate::config::ShopConfig;
use crate::events::ShopEvent;
use crate::storage::{CartStorage, JsonFileCartStorage};
use crate::stores::cart::{CartAction, CartEnvironment, CartReducer, CartState};
use crate::stores::catalog::{
    CatalogAction, CatalogEnvironment, CatalogReducer, CatalogState, ProductSort,
};
use crate::stores::checkout::{
    CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutResolution, CheckoutState,
};
use crate::stores::sales::{SalesAction, SalesEnvironment, SalesReducer, SalesState};
use crate::stores::selection::{
    SelectionAction, SelectionEnvironment, SelectionReducer, SelectionState, VerifyBlock,
};
use crate::stores::{CartFuture, CartHandle};
use crate::types::{
    CartItem, CartLineId, ConfiguredProduct, Money, Notice, Part, PartId, Product, ProductId,
    SoldProduct, SoldProductId,
};
use cyclery_core::environment::SystemClock;
use cyclery_core::event_bus::EventBus;
use cyclery_redpanda::RedpandaEventBus;
use cyclery_runtime::metrics::EventBusMetrics;
use cyclery_runtime::{DeadLetterQueue, HealthCheck, HealthReport, Store, StoreError};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How long a storefront flow waits for its store to reply.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a checkout may run before the caller gives up on it. Checkout
/// re-fetches every referenced record and posts one sale per line, so it
/// gets more room than the other flows.
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the queue holding inventory decrements that could not be
/// applied after a completed checkout.
const DECREMENT_DLQ_CAPACITY: usize = 256;

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by application flows.
#[derive(Error, Debug)]
pub enum AppError {
    /// REST client construction or a direct API call failed
    #[error("Shop API error: {0}")]
    Api(#[from] ShopApiError),

    /// Event bus connection or subscription failed
    #[error("Event bus error: {0}")]
    EventBus(String),

    /// A store rejected an action or timed out replying
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The backend rejected an admin write
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// A product id that is not in the cached catalog
    #[error("Product {0} is not in the catalog")]
    UnknownProduct(ProductId),

    /// A store replied with an action the flow did not expect
    #[error("Unexpected store reply: {0}")]
    UnexpectedReply(String),
}

// ============================================================================
// Outcomes
// ============================================================================

/// How an add-to-cart attempt resolved.
///
/// Both variants are ordinary outcomes, not errors. A blocked add leaves the
/// cart untouched and the open selection on screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddToCartOutcome {
    /// The configuration was verified against live inventory and appended.
    Added {
        /// Low-stock warnings gathered during verification.
        notices: Vec<Notice>,
    },
    /// Verification refused the configuration.
    Blocked(VerifyBlock),
}

// ============================================================================
// Cart handle over the cart store
// ============================================================================

/// [`CartHandle`] backed by the real cart store.
///
/// Methods resolve once the cart reducer ran and its persistence effect
/// finished, so the selection store and the checkout saga can treat cart
/// changes as durable when their futures complete.
struct StoreCartHandle {
    cart: Arc<Store<CartState, CartAction, CartEnvironment, CartReducer>>,
}

impl StoreCartHandle {
    async fn send_and_settle(
        cart: Arc<Store<CartState, CartAction, CartEnvironment, CartReducer>>,
        action: CartAction,
    ) {
        match cart.send(action).await {
            Ok(mut handle) => handle.wait().await,
            Err(error) => tracing::error!(%error, "Cart store rejected an action"),
        }
    }
}

impl CartHandle for StoreCartHandle {
    fn add_item(&self, item: ConfiguredProduct) -> CartFuture<'_> {
        let cart = Arc::clone(&self.cart);
        Box::pin(Self::send_and_settle(cart, CartAction::Add { item }))
    }

    fn evict_lines(&self, line_ids: Vec<CartLineId>) -> CartFuture<'_> {
        let cart = Arc::clone(&self.cart);
        Box::pin(Self::send_and_settle(cart, CartAction::RemoveLines { line_ids }))
    }

    fn clear(&self) -> CartFuture<'_> {
        let cart = Arc::clone(&self.cart);
        Box::pin(Self::send_and_settle(cart, CartAction::Clear))
    }
}

// ============================================================================
// Application
// ============================================================================

/// Main storefront application.
///
/// Coordinates all components:
/// - REST client against the shop backend
/// - Event bus subscription feeding every store
/// - Catalog, selection, cart, checkout, and sales stores
/// - Cart persistence across sessions
pub struct ShopApp {
    /// Shared REST client.
    api: Arc<dyn ShopApi>,

    /// Shared event bus.
    event_bus: Arc<dyn EventBus>,

    /// Product and part cache plus the admin write surface.
    pub catalog: Arc<Store<CatalogState, CatalogAction, CatalogEnvironment, CatalogReducer>>,

    /// The product currently being customized.
    pub selection:
        Arc<Store<SelectionState, SelectionAction, SelectionEnvironment, SelectionReducer>>,

    /// Persisted cart lines and eviction notices.
    pub cart: Arc<Store<CartState, CartAction, CartEnvironment, CartReducer>>,

    /// The checkout saga.
    pub checkout: Arc<Store<CheckoutState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>>,

    /// Sold-product history for the admin console.
    pub sales: Arc<Store<SalesState, SalesAction, SalesEnvironment, SalesReducer>>,

    /// Inventory decrements that failed after a completed checkout.
    decrement_dlq: DeadLetterQueue<String>,

    config: ShopConfig,
}

impl ShopApp {
    /// Creates the application against the real backend and brokers named in
    /// `config`, with the cart persisted to the configured file.
    ///
    /// # Errors
    ///
    /// Returns an error when the REST client or the event bus cannot be
    /// constructed. Store creation itself cannot fail.
    pub async fn new(config: ShopConfig) -> Result<Self, AppError> {
        tracing::info!("Initializing Cyclery storefront...");

        // 1. REST client
        tracing::info!("Connecting to shop backend: {}", config.api.base_url);
        let api =
            Arc::new(HttpShopApi::new(config.api.base_url.clone(), config.api.timeout())?)
                as Arc<dyn ShopApi>;
        tracing::info!("✓ REST client ready");

        // 2. Event bus
        tracing::info!("Connecting to feed brokers: {}", config.feed.brokers);
        let event_bus = Arc::new(
            RedpandaEventBus::builder()
                .brokers(&config.feed.brokers)
                .consumer_group(&config.feed.consumer_group)
                .build()
                .map_err(|e| AppError::EventBus(e.to_string()))?,
        ) as Arc<dyn EventBus>;
        tracing::info!("✓ Event bus connected");

        // 3. Cart persistence
        let storage = Arc::new(JsonFileCartStorage::new(&config.cart.path)) as Arc<dyn CartStorage>;
        tracing::info!("✓ Cart storage at {}", config.cart.path);

        Ok(Self::with_collaborators(config, api, event_bus, storage).await)
    }

    /// Creates the application around the given collaborators.
    ///
    /// This is the seam the demo binary and the integration tests use to run
    /// the full application against in-process fakes.
    #[allow(clippy::cognitive_complexity)] // Application initialization with multiple components
    pub async fn with_collaborators(
        config: ShopConfig,
        api: Arc<dyn ShopApi>,
        event_bus: Arc<dyn EventBus>,
        storage: Arc<dyn CartStorage>,
    ) -> Self {
        // 1. Stores without cross-store dependencies
        let catalog = Arc::new(Store::new(
            CatalogState::new(),
            CatalogReducer::new(),
            CatalogEnvironment::new(Arc::clone(&api)),
        ));
        let cart = Arc::new(Store::new(
            CartState::new(),
            CartReducer::new(),
            CartEnvironment::new(Arc::clone(&storage)),
        ));
        let sales = Arc::new(Store::new(
            SalesState::new(),
            SalesReducer::new(),
            SalesEnvironment::new(
                Arc::clone(&api),
                Arc::clone(&event_bus),
                config.feed.topic.clone(),
            ),
        ));

        // 2. Stores that mutate the cart from inside effects
        let cart_handle = Arc::new(StoreCartHandle {
            cart: Arc::clone(&cart),
        }) as Arc<dyn CartHandle>;

        let selection = Arc::new(Store::new(
            SelectionState::new(),
            SelectionReducer::new(),
            SelectionEnvironment::new(Arc::clone(&api), Arc::clone(&cart_handle)),
        ));

        let decrement_dlq = DeadLetterQueue::new(DECREMENT_DLQ_CAPACITY);
        let checkout = Arc::new(Store::new(
            CheckoutState::new(),
            CheckoutReducer::new(),
            CheckoutEnvironment::new(
                Arc::clone(&api),
                Arc::clone(&cart_handle),
                Arc::clone(&event_bus),
                Arc::new(SystemClock),
                config.feed.topic.clone(),
                decrement_dlq.clone(),
            ),
        ));
        tracing::info!("✓ Domain stores initialized");

        // 3. Restore the persisted cart before anything reads it
        match cart.send(CartAction::Hydrate).await {
            Ok(mut handle) => handle.wait().await,
            Err(error) => tracing::error!(%error, "Cart hydration failed"),
        }
        let restored = cart.state(|s| s.items.len()).await;
        tracing::info!(lines = restored, "✓ Cart hydrated");

        Self {
            api,
            event_bus,
            catalog,
            selection,
            cart,
            checkout,
            sales,
            decrement_dlq,
            config,
        }
    }

    /// Subscribes to the shop feed and starts the dispatch task routing every
    /// decoded event to the catalog, selection, cart, and sales stores in
    /// delivery order.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription cannot be established.
    #[allow(clippy::cognitive_complexity)] // Event dispatch with per-store error handling
    pub async fn start(&self) -> Result<(), AppError> {
        tracing::info!("Starting Cyclery storefront...");

        let topic = self.config.feed.topic.clone();
        let mut stream = self
            .event_bus
            .subscribe(&[topic.as_str()])
            .await
            .map_err(|e| AppError::EventBus(e.to_string()))?;
        tracing::info!(%topic, "✓ Subscribed to the shop feed");

        let catalog = Arc::clone(&self.catalog);
        let selection = Arc::clone(&self.selection);
        let cart = Arc::clone(&self.cart);
        let sales = Arc::clone(&self.sales);

        tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(serialized) => match ShopEvent::from_serialized(&serialized) {
                        Ok(event) => {
                            EventBusMetrics::record_consume();
                            metrics::counter!("feed.events.total").increment(1);
                            tracing::debug!(
                                event_type = %serialized.event_type,
                                "Feed event received"
                            );
                            // The cart's redirect decisions assume the catalog
                            // already saw the event, so the order matters.
                            if let Err(error) = catalog
                                .send(CatalogAction::ApplyEvent {
                                    event: event.clone(),
                                })
                                .await
                            {
                                tracing::error!(%error, "Catalog store refused a feed event");
                            }
                            if let Err(error) = selection
                                .send(SelectionAction::ApplyEvent {
                                    event: event.clone(),
                                })
                                .await
                            {
                                tracing::error!(%error, "Selection store refused a feed event");
                            }
                            if let Err(error) = cart
                                .send(CartAction::ApplyEvent {
                                    event: event.clone(),
                                })
                                .await
                            {
                                tracing::error!(%error, "Cart store refused a feed event");
                            }
                            if let Err(error) = sales.send(SalesAction::ApplyEvent { event }).await
                            {
                                tracing::error!(%error, "Sales store refused a feed event");
                            }
                        }
                        Err(error) => {
                            EventBusMetrics::record_consume_error();
                            tracing::warn!(
                                %error,
                                event_type = %serialized.event_type,
                                "Skipping undecodable feed event"
                            );
                        }
                    },
                    Err(error) => {
                        EventBusMetrics::record_consume_error();
                        tracing::error!(%error, "Feed stream error");
                    }
                }
            }
            tracing::warn!("Feed dispatch task ended");
        });

        tracing::info!("✓ Storefront started");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Storefront flows
    // ------------------------------------------------------------------------

    /// Fetches the product list, returning once the catalog cache holds it.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is shutting down. A failed fetch keeps
    /// stale products on display and is reported through the catalog state.
    pub async fn refresh_catalog(&self) -> Result<(), AppError> {
        let mut handle = self.catalog.send(CatalogAction::FetchProducts).await?;
        handle.wait().await;
        Ok(())
    }

    /// Opens a product for customization, fetching its part lists on first
    /// visit to that product type.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownProduct`] when the id is not in the cached
    /// catalog even after a refresh.
    pub async fn open_product(&self, product_id: &ProductId) -> Result<(), AppError> {
        let mut product = self.catalog.state(|s| s.product(product_id).cloned()).await;
        if product.is_none() {
            self.refresh_catalog().await?;
            product = self.catalog.state(|s| s.product(product_id).cloned()).await;
        }
        let Some(product) = product else {
            return Err(AppError::UnknownProduct(product_id.clone()));
        };

        if !self
            .catalog
            .state(|s| s.has_parts_for(&product.type_product))
            .await
        {
            let mut handle = self
                .catalog
                .send(CatalogAction::FetchParts {
                    type_product: product.type_product.clone(),
                })
                .await?;
            handle.wait().await;
        }
        let parts = self
            .catalog
            .state(|s| s.parts_for(&product.type_product).to_vec())
            .await;

        let mut handle = self
            .selection
            .send(SelectionAction::Open { product, parts })
            .await?;
        handle.wait().await;
        Ok(())
    }

    /// Picks a part for a category on the open product.
    ///
    /// Picks blocked by a compatibility rule are quietly ignored, mirroring
    /// a disabled option in a UI.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is shutting down.
    pub async fn choose(&self, category: &str, part_id: &PartId) -> Result<(), AppError> {
        let mut handle = self
            .selection
            .send(SelectionAction::Choose {
                category: category.to_string(),
                part_id: part_id.clone(),
            })
            .await?;
        handle.wait().await;
        Ok(())
    }

    /// Verifies the open selection against live inventory and, when it holds
    /// up, appends it to the cart.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is shutting down or the verification
    /// does not settle within the reply timeout.
    pub async fn add_to_cart(&self) -> Result<AddToCartOutcome, AppError> {
        let cart_items = self.cart.state(|s| s.items.clone()).await;
        let reply = self
            .selection
            .send_and_wait_for(
                SelectionAction::VerifyForCart { cart: cart_items },
                |action| {
                    matches!(
                        action,
                        SelectionAction::AddedToCart { .. }
                            | SelectionAction::VerificationBlocked { .. }
                            | SelectionAction::VerificationFailed { .. }
                    )
                },
                REPLY_TIMEOUT,
            )
            .await?;
        match reply {
            SelectionAction::AddedToCart { notices } => Ok(AddToCartOutcome::Added { notices }),
            SelectionAction::VerificationBlocked { reason } => {
                Ok(AddToCartOutcome::Blocked(reason))
            }
            SelectionAction::VerificationFailed { error } => {
                Ok(AddToCartOutcome::Blocked(VerifyBlock::FetchFailed { error }))
            }
            other => Err(AppError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Removes every cart line holding the given product.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is shutting down.
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> Result<(), AppError> {
        let mut handle = self
            .cart
            .send(CartAction::RemoveProduct {
                product_id: product_id.clone(),
            })
            .await?;
        handle.wait().await;
        Ok(())
    }

    /// Clears the cart's pending eviction notices after they were shown.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is shutting down.
    pub async fn acknowledge_cart_notices(&self) -> Result<(), AppError> {
        let mut handle = self.cart.send(CartAction::AcknowledgeNotices).await?;
        handle.wait().await;
        Ok(())
    }

    /// Runs the checkout saga over the current cart.
    ///
    /// Returns how the saga resolved. An abort leaves the surviving lines in
    /// the cart with notices explaining the evictions; a completion empties
    /// the cart and applies the inventory decrements.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is shutting down or the saga does not
    /// reach a terminal state within the checkout timeout.
    pub async fn checkout(&self) -> Result<CheckoutResolution, AppError> {
        let items = self.cart.state(|s| s.items.clone()).await;
        let reply = self
            .checkout
            .send_and_wait_for(
                CheckoutAction::Begin { items },
                |action| {
                    matches!(
                        action,
                        CheckoutAction::Completed { .. } | CheckoutAction::Aborted { .. }
                    )
                },
                CHECKOUT_TIMEOUT,
            )
            .await?;
        match reply {
            CheckoutAction::Completed { outcome } => Ok(CheckoutResolution::Completed(outcome)),
            CheckoutAction::Aborted { outcome } => Ok(CheckoutResolution::Aborted(outcome)),
            other => Err(AppError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    // ------------------------------------------------------------------------
    // Admin flows
    // ------------------------------------------------------------------------

    /// Admin: creates a product and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rejected`] when the backend refuses the write.
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product, AppError> {
        self.catalog_product_write(CatalogAction::CreateProduct { draft })
            .await
    }

    /// Admin: replaces a product and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rejected`] when the backend refuses the write.
    pub async fn update_product(&self, product: Product) -> Result<Product, AppError> {
        self.catalog_product_write(CatalogAction::UpdateProduct { product })
            .await
    }

    /// Admin: replaces a product's restriction map and returns the stored
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rejected`] when the backend refuses the write.
    pub async fn patch_product_restrictions(
        &self,
        product_id: ProductId,
        restrictions: HashMap<String, Vec<String>>,
    ) -> Result<Product, AppError> {
        self.catalog_product_write(CatalogAction::PatchProductRestrictions {
            product_id,
            restrictions,
        })
        .await
    }

    /// Admin: deletes a product.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rejected`] when the backend refuses the delete.
    pub async fn delete_product(&self, product_id: ProductId) -> Result<(), AppError> {
        let reply = self
            .catalog
            .send_and_wait_for(
                CatalogAction::DeleteProduct { product_id },
                |action| {
                    matches!(
                        action,
                        CatalogAction::ProductRemoved { .. } | CatalogAction::WriteFailed { .. }
                    )
                },
                REPLY_TIMEOUT,
            )
            .await?;
        match reply {
            CatalogAction::ProductRemoved { .. } => Ok(()),
            CatalogAction::WriteFailed { error } => Err(AppError::Rejected(error)),
            other => Err(AppError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Admin: creates a part and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rejected`] when the backend refuses the write.
    pub async fn create_part(&self, draft: PartDraft) -> Result<Part, AppError> {
        self.catalog_part_write(CatalogAction::CreatePart { draft })
            .await
    }

    /// Admin: replaces a part and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rejected`] when the backend refuses the write.
    pub async fn update_part(&self, part: Part) -> Result<Part, AppError> {
        self.catalog_part_write(CatalogAction::UpdatePart { part })
            .await
    }

    /// Admin: deletes a part.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rejected`] when the backend refuses the delete.
    pub async fn delete_part(&self, part_id: PartId) -> Result<(), AppError> {
        let reply = self
            .catalog
            .send_and_wait_for(
                CatalogAction::DeletePart { part_id },
                |action| {
                    matches!(
                        action,
                        CatalogAction::PartRemoved { .. } | CatalogAction::WriteFailed { .. }
                    )
                },
                REPLY_TIMEOUT,
            )
            .await?;
        match reply {
            CatalogAction::PartRemoved { .. } => Ok(()),
            CatalogAction::WriteFailed { error } => Err(AppError::Rejected(error)),
            other => Err(AppError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Admin: fetches the restriction-form option groups for a product type
    /// and returns them once cached.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is shutting down.
    pub async fn refresh_part_options(
        &self,
        type_product: &str,
    ) -> Result<Vec<RestrictionOptionGroup>, AppError> {
        let mut handle = self
            .catalog
            .send(CatalogAction::FetchPartOptions {
                type_product: type_product.to_string(),
            })
            .await?;
        handle.wait().await;
        let groups = self
            .catalog
            .state(|s| {
                s.restriction_options
                    .get(type_product)
                    .cloned()
                    .unwrap_or_default()
            })
            .await;
        Ok(groups)
    }

    /// Admin: fetches the sold-product history.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is shutting down. A failed fetch keeps
    /// stale history on display and is reported through the sales state.
    pub async fn refresh_sales(&self) -> Result<(), AppError> {
        let mut handle = self.sales.send(SalesAction::FetchSales).await?;
        handle.wait().await;
        Ok(())
    }

    /// Admin: deletes a sold record and announces the deletion on the feed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rejected`] when the backend refuses the delete.
    pub async fn delete_sale(&self, sold_id: SoldProductId) -> Result<(), AppError> {
        let reply = self
            .sales
            .send_and_wait_for(
                SalesAction::DeleteSale { sold_id },
                |action| {
                    matches!(
                        action,
                        SalesAction::SaleDeleted { .. } | SalesAction::DeleteFailed { .. }
                    )
                },
                REPLY_TIMEOUT,
            )
            .await?;
        match reply {
            SalesAction::SaleDeleted { .. } => Ok(()),
            SalesAction::DeleteFailed { error } => Err(AppError::Rejected(error)),
            other => Err(AppError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    async fn catalog_product_write(&self, action: CatalogAction) -> Result<Product, AppError> {
        let reply = self
            .catalog
            .send_and_wait_for(
                action,
                |action| {
                    matches!(
                        action,
                        CatalogAction::ProductSaved { .. } | CatalogAction::WriteFailed { .. }
                    )
                },
                REPLY_TIMEOUT,
            )
            .await?;
        match reply {
            CatalogAction::ProductSaved { product } => Ok(product),
            CatalogAction::WriteFailed { error } => Err(AppError::Rejected(error)),
            other => Err(AppError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    async fn catalog_part_write(&self, action: CatalogAction) -> Result<Part, AppError> {
        let reply = self
            .catalog
            .send_and_wait_for(
                action,
                |action| {
                    matches!(
                        action,
                        CatalogAction::PartSaved { .. } | CatalogAction::WriteFailed { .. }
                    )
                },
                REPLY_TIMEOUT,
            )
            .await?;
        match reply {
            CatalogAction::PartSaved { part } => Ok(part),
            CatalogAction::WriteFailed { error } => Err(AppError::Rejected(error)),
            other => Err(AppError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    // ------------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------------

    /// Products for the grid, filtered by type and sorted as asked.
    pub async fn visible_products(
        &self,
        type_filter: Option<&str>,
        sort: ProductSort,
    ) -> Vec<Product> {
        self.catalog
            .state(|s| s.visible_products(type_filter, sort))
            .await
    }

    /// Option groups for the open selection, with per-option pick state.
    pub async fn selection_options(&self) -> Vec<crate::compatibility::CategoryOptions> {
        self.selection.state(SelectionState::options).await
    }

    /// Running total of the open selection, `None` when no product is open.
    pub async fn selection_total(&self) -> Option<Money> {
        self.selection.state(SelectionState::total_price).await
    }

    /// The cart lines in insertion order.
    pub async fn cart_items(&self) -> Vec<CartItem> {
        self.cart.state(|s| s.items.clone()).await
    }

    /// Cart subtotal, VAT, and grand total.
    pub async fn cart_totals(&self) -> (Money, Money, Money) {
        self.cart
            .state(|s| (s.subtotal(), s.vat(), s.total()))
            .await
    }

    /// Eviction notices the user has not acknowledged yet.
    pub async fn cart_notices(&self) -> Vec<Notice> {
        self.cart.state(|s| s.notices.clone()).await
    }

    /// The cached sold-product history, newest ordering as fetched.
    pub async fn sales_history(&self) -> Vec<SoldProduct> {
        self.sales.state(|s| s.sold.clone()).await
    }

    // ------------------------------------------------------------------------
    // Lifecycle and introspection
    // ------------------------------------------------------------------------

    /// Health report covering every store.
    pub async fn health(&self) -> HealthReport {
        let mut checks: Vec<HealthCheck> = Vec::with_capacity(5);
        for (component, mut check) in [
            ("catalog-store", self.catalog.health()),
            ("selection-store", self.selection.health()),
            ("cart-store", self.cart.health()),
            ("checkout-store", self.checkout.health()),
            ("sales-store", self.sales.health()),
        ] {
            check.component = component.to_string();
            checks.push(check);
        }
        HealthReport::new(checks)
    }

    /// Drains every store, waiting up to `timeout` per store for pending
    /// effects to finish.
    ///
    /// The cart store is drained last so evictions triggered by the other
    /// stores still persist.
    ///
    /// # Errors
    ///
    /// Returns the first shutdown failure, with the remaining stores left
    /// running.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), AppError> {
        tracing::info!("Shutting down Cyclery storefront...");
        self.checkout.shutdown(timeout).await?;
        self.selection.shutdown(timeout).await?;
        self.sales.shutdown(timeout).await?;
        self.catalog.shutdown(timeout).await?;
        self.cart.shutdown(timeout).await?;
        tracing::info!("✓ Stores drained");
        Ok(())
    }

    /// The configuration this application was built from.
    #[must_use]
    pub const fn config(&self) -> &ShopConfig {
        &self.config
    }

    /// The shared REST client.
    #[must_use]
    pub fn api(&self) -> Arc<dyn ShopApi> {
        Arc::clone(&self.api)
    }

    /// Queue of inventory decrements that failed after a completed checkout.
    /// Entries carry the operation description and the API error; an operator
    /// reconciles them against the backend by hand.
    #[must_use]
    pub fn decrement_dlq(&self) -> DeadLetterQueue<String> {
        self.decrement_dlq.clone()
    }
}
