//! REST client for the shop backend.
//!
//! The [`ShopApi`] trait is the seam every store depends on: the HTTP
//! implementation talks to the real backend, the in-memory implementation
//! backs the demo binary and integration tests. Wire payloads use camelCase
//! field names and carry prices as JSON numbers or strings; both coerce into
//! [`Money`] cents on the way in.

use crate::types::{
    Money, Part, PartId, Product, ProductId, SoldProduct, SoldProductId, normalize_category,
    normalize_type, normalize_value,
};
use chrono::{DateTime, Utc};
use cyclery_runtime::RetryPolicy;
use cyclery_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use cyclery_runtime::metrics::ShopApiMetrics;
use cyclery_runtime::retry::retry_with_predicate;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by shop API calls.
#[derive(Debug, thiserror::Error)]
pub enum ShopApiError {
    /// The request never produced an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("Unexpected status {status} from {path}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Request path.
        path: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode response from {path}: {reason}")]
    Decode {
        /// Request path.
        path: String,
        /// Decoder failure description.
        reason: String,
    },

    /// The circuit breaker rejected the call without touching the network.
    #[error("Shop API circuit is open: {0}")]
    CircuitOpen(String),
}

impl ShopApiError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, and 5xx responses are retryable on
    /// idempotent GETs. Client errors and open-circuit rejections are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode { .. } | Self::CircuitOpen(_) => false,
        }
    }

    /// Whether this is a not-found response.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// Price field as the backend actually sends it: a number, a numeric string,
/// or occasionally garbage that must not break catalog rendering.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

#[allow(clippy::cast_possible_truncation)] // Catalog prices are far below i64 cents range
fn cents_from_units(units: f64) -> Money {
    Money::from_cents((units * 100.0).round() as i64)
}

fn coerce_price(raw: RawPrice) -> Money {
    match raw {
        RawPrice::Number(units) => cents_from_units(units),
        RawPrice::Text(text) => text.trim().parse::<f64>().map_or_else(
            |_| {
                tracing::warn!(price = %text, "Unparseable price in API payload, treating as zero");
                Money::ZERO
            },
            cents_from_units,
        ),
        RawPrice::Other(value) => {
            tracing::warn!(%value, "Unexpected price shape in API payload, treating as zero");
            Money::ZERO
        }
    }
}

fn deserialize_price<'de, D>(deserializer: D) -> Result<Money, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(coerce_price(RawPrice::deserialize(deserializer)?))
}

#[allow(clippy::cast_precision_loss)] // Catalog prices are far below f64 precision limits
fn serialize_price<S>(money: &Money, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(money.cents() as f64 / 100.0)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductDto {
    id: String,
    name: String,
    type_product: String,
    #[serde(
        serialize_with = "serialize_price",
        deserialize_with = "deserialize_price"
    )]
    price: Money,
    is_available: bool,
    #[serde(default)]
    restrictions: HashMap<String, Vec<String>>,
}

impl From<ProductDto> for Product {
    fn from(dto: ProductDto) -> Self {
        Self {
            id: ProductId::new(dto.id),
            name: dto.name,
            type_product: dto.type_product,
            base_price: dto.price,
            is_available: dto.is_available,
            restrictions: dto.restrictions,
        }
    }
}

impl From<&Product> for ProductDto {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.as_str().to_string(),
            name: product.name.clone(),
            type_product: product.type_product.clone(),
            price: product.base_price,
            is_available: product.is_available,
            restrictions: product.restrictions.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartDto {
    id: String,
    type_product: String,
    category: String,
    value: String,
    #[serde(
        serialize_with = "serialize_price",
        deserialize_with = "deserialize_price"
    )]
    price: Money,
    quantity: u32,
    is_available: bool,
}

impl From<PartDto> for Part {
    fn from(dto: PartDto) -> Self {
        Self {
            id: PartId::new(dto.id),
            type_product: dto.type_product,
            category: dto.category,
            value: dto.value,
            price: dto.price,
            quantity: dto.quantity,
            is_available: dto.is_available,
        }
    }
}

impl From<&Part> for PartDto {
    fn from(part: &Part) -> Self {
        Self {
            id: part.id.as_str().to_string(),
            type_product: part.type_product.clone(),
            category: part.category.clone(),
            value: part.value.clone(),
            price: part.price,
            quantity: part.quantity,
            is_available: part.is_available,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SoldProductDto {
    id: String,
    name: String,
    type_product: String,
    #[serde(deserialize_with = "deserialize_price")]
    price: Money,
    created_at: DateTime<Utc>,
    #[serde(default)]
    part_ids: Vec<String>,
}

impl From<SoldProductDto> for SoldProduct {
    fn from(dto: SoldProductDto) -> Self {
        Self {
            id: SoldProductId::new(dto.id),
            name: dto.name,
            type_product: dto.type_product,
            price: dto.price,
            created_at: dto.created_at,
            part_ids: dto.part_ids.into_iter().map(PartId::new).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewProductDto {
    name: String,
    type_product: String,
    #[serde(serialize_with = "serialize_price")]
    price: Money,
    is_available: bool,
    restrictions: HashMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewPartDto {
    type_product: String,
    category: String,
    value: String,
    #[serde(serialize_with = "serialize_price")]
    price: Money,
    quantity: u32,
    is_available: bool,
}

/// Sold products are posted with the final price as a two-decimal string; the
/// backend stores it verbatim for the sales history.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewSoldProductDto {
    name: String,
    type_product: String,
    price: String,
    created_at: DateTime<Utc>,
    part_ids: Vec<String>,
}

// ============================================================================
// Drafts and patches
// ============================================================================

/// Admin input for creating a product, before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductDraft {
    /// Display name.
    pub name: String,
    /// Product type tag as typed in the form.
    pub type_product: String,
    /// Base price.
    pub base_price: Money,
    /// Availability flag.
    pub is_available: bool,
    /// Banned part values per category.
    pub restrictions: HashMap<String, Vec<String>>,
}

impl ProductDraft {
    /// Applies form normalization: type lowercased, restriction categories
    /// Title-Cased, restriction values lowercased.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.type_product = normalize_type(&self.type_product);
        self.restrictions = self
            .restrictions
            .into_iter()
            .map(|(category, values)| {
                (
                    normalize_category(&category),
                    values.iter().map(|v| normalize_value(v)).collect(),
                )
            })
            .collect();
        self
    }
}

/// Admin input for creating a part, before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartDraft {
    /// Product type tag as typed in the form.
    pub type_product: String,
    /// Category as typed in the form.
    pub category: String,
    /// Option name as typed in the form.
    pub value: String,
    /// Unit price.
    pub price: Money,
    /// Initial stock.
    pub quantity: u32,
    /// Availability flag.
    pub is_available: bool,
}

impl PartDraft {
    /// Applies form normalization: type and value lowercased, category
    /// Title-Cased.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.type_product = normalize_type(&self.type_product);
        self.category = normalize_category(&self.category);
        self.value = normalize_value(&self.value);
        self
    }
}

/// A sale to record at checkout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoldProductDraft {
    /// Name of the sold product.
    pub name: String,
    /// Product type tag.
    pub type_product: String,
    /// Final price: base plus parts.
    pub price: Money,
    /// Sale timestamp.
    pub created_at: DateTime<Utc>,
    /// Parts included in the sale.
    pub part_ids: Vec<PartId>,
}

/// Partial product update. Absent fields are left untouched by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    /// Replace the restrictions map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restrictions: Option<HashMap<String, Vec<String>>>,
    /// Replace the availability flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
}

/// Partial part update. Absent fields are left untouched by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartPatch {
    /// Replace the stock count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    /// Replace the availability flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
    /// Ask the backend to skip its availability guard. Checkout decrements
    /// set this so a sale can drain a part to zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_availability_check: Option<bool>,
}

/// One restriction-form group: a category and the values an admin may ban.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionOptionGroup {
    /// Category name.
    pub category: String,
    /// Every value sold in the category.
    pub values: Vec<String>,
}

// ============================================================================
// ShopApi trait
// ============================================================================

/// Boxed future returned by [`ShopApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ShopApiError>> + Send + 'a>>;

/// The backend REST surface the storefront and admin console depend on.
///
/// Uses explicit boxed futures rather than `async fn` so the trait stays
/// dyn-compatible and stores can share one client behind `Arc<dyn ShopApi>`.
pub trait ShopApi: Send + Sync {
    /// Fetches the full product catalog.
    fn fetch_products(&self) -> ApiFuture<'_, Vec<Product>>;

    /// Fetches a single product by id.
    fn fetch_product(&self, id: &ProductId) -> ApiFuture<'_, Product>;

    /// Creates a product and returns the stored record.
    fn create_product(&self, draft: &ProductDraft) -> ApiFuture<'_, Product>;

    /// Replaces a product and returns the stored record.
    fn update_product(&self, product: &Product) -> ApiFuture<'_, Product>;

    /// Partially updates a product and returns the stored record.
    fn patch_product(&self, id: &ProductId, patch: &ProductPatch) -> ApiFuture<'_, Product>;

    /// Deletes a product.
    fn delete_product(&self, id: &ProductId) -> ApiFuture<'_, ()>;

    /// Fetches every part for a product type.
    fn fetch_parts(&self, type_product: &str) -> ApiFuture<'_, Vec<Part>>;

    /// Fetches a single part by id.
    fn fetch_part(&self, id: &PartId) -> ApiFuture<'_, Part>;

    /// Creates a part and returns the stored record.
    fn create_part(&self, draft: &PartDraft) -> ApiFuture<'_, Part>;

    /// Replaces a part and returns the stored record.
    fn update_part(&self, part: &Part) -> ApiFuture<'_, Part>;

    /// Partially updates a part and returns the stored record.
    fn patch_part(&self, id: &PartId, patch: &PartPatch) -> ApiFuture<'_, Part>;

    /// Deletes a part.
    fn delete_part(&self, id: &PartId) -> ApiFuture<'_, ()>;

    /// Fetches the restriction-form groups for a product type.
    fn fetch_part_options(&self, type_product: &str) -> ApiFuture<'_, Vec<RestrictionOptionGroup>>;

    /// Fetches the sales history.
    fn fetch_sold_products(&self) -> ApiFuture<'_, Vec<SoldProduct>>;

    /// Records a sale and returns the stored record.
    fn create_sold_product(&self, draft: &SoldProductDraft) -> ApiFuture<'_, SoldProduct>;

    /// Deletes a sale from the history.
    fn delete_sold_product(&self, id: &SoldProductId) -> ApiFuture<'_, ()>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// [`ShopApi`] over HTTP with retries and a circuit breaker.
///
/// Idempotent GETs retry with exponential backoff on timeouts, connection
/// errors, and 5xx responses. Writes go through the circuit breaker only, so
/// a failed POST is never silently duplicated.
#[derive(Debug)]
pub struct HttpShopApi {
    client: reqwest::Client,
    base_url: String,
    retry_policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl HttpShopApi {
    /// Creates a client for the given base URL (scheme, host, and path prefix,
    /// e.g. `http://localhost:3000/api`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ShopApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShopApiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_policy: RetryPolicy::default(),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        })
    }

    /// Overrides the GET retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Overrides the circuit breaker configuration.
    #[must_use]
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = CircuitBreaker::new(config);
        self
    }

    async fn execute<T, B>(
        &self,
        method: Method,
        path: &str,
        query: Option<(&'static str, &str)>,
        body: Option<&B>,
    ) -> Result<T, ShopApiError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(pair) = query {
            request = request.query(&[pair]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ShopApiError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ShopApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        response.json::<T>().await.map_err(|e| ShopApiError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn execute_empty(&self, method: Method, path: &str) -> Result<(), ShopApiError> {
        let response = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| ShopApiError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ShopApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: Option<(&'static str, &str)>,
    ) -> Result<T, ShopApiError> {
        let started = Instant::now();
        let result = retry_with_predicate(
            self.retry_policy.clone(),
            || async move {
                self.breaker
                    .call(|| self.execute::<T, ()>(Method::GET, path, query, None))
                    .await
                    .map_err(flatten_breaker_error)
            },
            ShopApiError::is_retryable,
        )
        .await;

        match &result {
            Ok(_) => ShopApiMetrics::record_request(endpoint, started.elapsed()),
            Err(_) => ShopApiMetrics::record_error(endpoint),
        }
        result
    }

    async fn write<T, B>(
        &self,
        endpoint: &'static str,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ShopApiError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let started = Instant::now();
        let result = self
            .breaker
            .call(|| self.execute::<T, B>(method, path, None, Some(body)))
            .await
            .map_err(flatten_breaker_error);

        match &result {
            Ok(_) => ShopApiMetrics::record_request(endpoint, started.elapsed()),
            Err(_) => ShopApiMetrics::record_error(endpoint),
        }
        result
    }

    async fn delete(&self, endpoint: &'static str, path: &str) -> Result<(), ShopApiError> {
        let started = Instant::now();
        let result = self
            .breaker
            .call(|| self.execute_empty(Method::DELETE, path))
            .await
            .map_err(flatten_breaker_error);

        match &result {
            Ok(()) => ShopApiMetrics::record_request(endpoint, started.elapsed()),
            Err(_) => ShopApiMetrics::record_error(endpoint),
        }
        result
    }
}

fn flatten_breaker_error(err: CircuitBreakerError<ShopApiError>) -> ShopApiError {
    match err {
        CircuitBreakerError::Open => ShopApiError::CircuitOpen(
            "temporarily rejecting requests while the backend recovers".to_string(),
        ),
        CircuitBreakerError::Inner(inner) => inner,
    }
}

impl ShopApi for HttpShopApi {
    fn fetch_products(&self) -> ApiFuture<'_, Vec<Product>> {
        Box::pin(async move {
            let dtos: Vec<ProductDto> = self.get("products", "/products", None).await?;
            Ok(dtos.into_iter().map(Product::from).collect())
        })
    }

    fn fetch_product(&self, id: &ProductId) -> ApiFuture<'_, Product> {
        let path = format!("/products/{id}");
        Box::pin(async move {
            let dto: ProductDto = self.get("products", &path, None).await?;
            Ok(dto.into())
        })
    }

    fn create_product(&self, draft: &ProductDraft) -> ApiFuture<'_, Product> {
        let body = NewProductDto {
            name: draft.name.clone(),
            type_product: draft.type_product.clone(),
            price: draft.base_price,
            is_available: draft.is_available,
            restrictions: draft.restrictions.clone(),
        };
        Box::pin(async move {
            let dto: ProductDto = self
                .write("products", Method::POST, "/products", &body)
                .await?;
            Ok(dto.into())
        })
    }

    fn update_product(&self, product: &Product) -> ApiFuture<'_, Product> {
        let path = format!("/products/{}", product.id);
        let body = ProductDto::from(product);
        Box::pin(async move {
            let dto: ProductDto = self.write("products", Method::PUT, &path, &body).await?;
            Ok(dto.into())
        })
    }

    fn patch_product(&self, id: &ProductId, patch: &ProductPatch) -> ApiFuture<'_, Product> {
        let path = format!("/products/{id}");
        let body = patch.clone();
        Box::pin(async move {
            let dto: ProductDto = self.write("products", Method::PATCH, &path, &body).await?;
            Ok(dto.into())
        })
    }

    fn delete_product(&self, id: &ProductId) -> ApiFuture<'_, ()> {
        let path = format!("/products/{id}");
        Box::pin(async move { self.delete("products", &path).await })
    }

    fn fetch_parts(&self, type_product: &str) -> ApiFuture<'_, Vec<Part>> {
        let type_product = type_product.to_string();
        Box::pin(async move {
            let dtos: Vec<PartDto> = self
                .get("parts", "/parts", Some(("typeProduct", &type_product)))
                .await?;
            Ok(dtos.into_iter().map(Part::from).collect())
        })
    }

    fn fetch_part(&self, id: &PartId) -> ApiFuture<'_, Part> {
        let path = format!("/parts/{id}");
        Box::pin(async move {
            let dto: PartDto = self.get("parts", &path, None).await?;
            Ok(dto.into())
        })
    }

    fn create_part(&self, draft: &PartDraft) -> ApiFuture<'_, Part> {
        let body = NewPartDto {
            type_product: draft.type_product.clone(),
            category: draft.category.clone(),
            value: draft.value.clone(),
            price: draft.price,
            quantity: draft.quantity,
            is_available: draft.is_available,
        };
        Box::pin(async move {
            let dto: PartDto = self.write("parts", Method::POST, "/parts", &body).await?;
            Ok(dto.into())
        })
    }

    fn update_part(&self, part: &Part) -> ApiFuture<'_, Part> {
        let path = format!("/parts/{}", part.id);
        let body = PartDto::from(part);
        Box::pin(async move {
            let dto: PartDto = self.write("parts", Method::PUT, &path, &body).await?;
            Ok(dto.into())
        })
    }

    fn patch_part(&self, id: &PartId, patch: &PartPatch) -> ApiFuture<'_, Part> {
        let path = format!("/parts/{id}");
        let body = patch.clone();
        Box::pin(async move {
            let dto: PartDto = self.write("parts", Method::PATCH, &path, &body).await?;
            Ok(dto.into())
        })
    }

    fn delete_part(&self, id: &PartId) -> ApiFuture<'_, ()> {
        let path = format!("/parts/{id}");
        Box::pin(async move { self.delete("parts", &path).await })
    }

    fn fetch_part_options(&self, type_product: &str) -> ApiFuture<'_, Vec<RestrictionOptionGroup>> {
        let type_product = type_product.to_string();
        Box::pin(async move {
            self.get(
                "part_options",
                "/parts/options",
                Some(("typeProduct", &type_product)),
            )
            .await
        })
    }

    fn fetch_sold_products(&self) -> ApiFuture<'_, Vec<SoldProduct>> {
        Box::pin(async move {
            let dtos: Vec<SoldProductDto> = self
                .get("custom_products", "/custom-products", None)
                .await?;
            Ok(dtos.into_iter().map(SoldProduct::from).collect())
        })
    }

    fn create_sold_product(&self, draft: &SoldProductDraft) -> ApiFuture<'_, SoldProduct> {
        let body = NewSoldProductDto {
            name: draft.name.clone(),
            type_product: draft.type_product.clone(),
            price: draft.price.to_string(),
            created_at: draft.created_at,
            part_ids: draft
                .part_ids
                .iter()
                .map(|id| id.as_str().to_string())
                .collect(),
        };
        Box::pin(async move {
            let dto: SoldProductDto = self
                .write("custom_products", Method::POST, "/custom-products", &body)
                .await?;
            Ok(dto.into())
        })
    }

    fn delete_sold_product(&self, id: &SoldProductId) -> ApiFuture<'_, ()> {
        let path = format!("/custom-products/{id}");
        Box::pin(async move { self.delete("custom_products", &path).await })
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Default)]
struct InMemoryState {
    products: Vec<Product>,
    parts: Vec<Part>,
    sold: Vec<SoldProduct>,
    next_id: u64,
    part_patches: Vec<(PartId, PartPatch)>,
    failing_sale_names: Vec<String>,
}

/// In-memory [`ShopApi`] for the demo binary and integration tests.
///
/// Behaves like the real backend at the surface: lookups for absent records
/// answer 404, patches are recorded so tests can assert exactly which
/// decrements checkout issued, and sale recording can be failed per product
/// name to exercise partial-failure paths.
#[derive(Debug, Default)]
pub struct InMemoryShopApi {
    state: Mutex<InMemoryState>,
}

impl InMemoryShopApi {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend seeded with a catalog.
    #[must_use]
    pub fn with_catalog(products: Vec<Product>, parts: Vec<Part>) -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                products,
                parts,
                ..InMemoryState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(state: &mut InMemoryState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }

    /// Makes every future sale of the named product fail with a 500.
    pub fn fail_sales_for(&self, product_name: &str) {
        self.lock().failing_sale_names.push(product_name.to_string());
    }

    /// Replaces or inserts a product directly, bypassing the REST surface.
    pub fn upsert_product(&self, product: Product) {
        let mut state = self.lock();
        match state.products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product,
            None => state.products.push(product),
        }
    }

    /// Replaces or inserts a part directly, bypassing the REST surface.
    pub fn upsert_part(&self, part: Part) {
        let mut state = self.lock();
        match state.parts.iter_mut().find(|p| p.id == part.id) {
            Some(existing) => *existing = part,
            None => state.parts.push(part),
        }
    }

    /// Current stock for a part, if it exists.
    #[must_use]
    pub fn part_quantity(&self, id: &PartId) -> Option<u32> {
        self.lock().parts.iter().find(|p| &p.id == id).map(|p| p.quantity)
    }

    /// The recorded sales history.
    #[must_use]
    pub fn sold_products(&self) -> Vec<SoldProduct> {
        self.lock().sold.clone()
    }

    /// Every part patch applied so far, in order.
    #[must_use]
    pub fn part_patches(&self) -> Vec<(PartId, PartPatch)> {
        self.lock().part_patches.clone()
    }
}

fn not_found(path: String) -> ShopApiError {
    ShopApiError::Status { status: 404, path }
}

impl ShopApi for InMemoryShopApi {
    fn fetch_products(&self) -> ApiFuture<'_, Vec<Product>> {
        let result = Ok(self.lock().products.clone());
        Box::pin(async move { result })
    }

    fn fetch_product(&self, id: &ProductId) -> ApiFuture<'_, Product> {
        let result = self
            .lock()
            .products
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| not_found(format!("/products/{id}")));
        Box::pin(async move { result })
    }

    fn create_product(&self, draft: &ProductDraft) -> ApiFuture<'_, Product> {
        let mut state = self.lock();
        let product = Product {
            id: ProductId::new(Self::next_id(&mut state, "product")),
            name: draft.name.clone(),
            type_product: draft.type_product.clone(),
            base_price: draft.base_price,
            is_available: draft.is_available,
            restrictions: draft.restrictions.clone(),
        };
        state.products.push(product.clone());
        drop(state);
        Box::pin(async move { Ok(product) })
    }

    fn update_product(&self, product: &Product) -> ApiFuture<'_, Product> {
        let mut state = self.lock();
        let result = state
            .products
            .iter_mut()
            .find(|p| p.id == product.id)
            .map(|existing| {
                *existing = product.clone();
                existing.clone()
            })
            .ok_or_else(|| not_found(format!("/products/{}", product.id)));
        drop(state);
        Box::pin(async move { result })
    }

    fn patch_product(&self, id: &ProductId, patch: &ProductPatch) -> ApiFuture<'_, Product> {
        let mut state = self.lock();
        let result = state
            .products
            .iter_mut()
            .find(|p| &p.id == id)
            .map(|existing| {
                if let Some(restrictions) = &patch.restrictions {
                    existing.restrictions = restrictions.clone();
                }
                if let Some(is_available) = patch.is_available {
                    existing.is_available = is_available;
                }
                existing.clone()
            })
            .ok_or_else(|| not_found(format!("/products/{id}")));
        drop(state);
        Box::pin(async move { result })
    }

    fn delete_product(&self, id: &ProductId) -> ApiFuture<'_, ()> {
        let mut state = self.lock();
        let before = state.products.len();
        state.products.retain(|p| &p.id != id);
        let result = if state.products.len() == before {
            Err(not_found(format!("/products/{id}")))
        } else {
            Ok(())
        };
        drop(state);
        Box::pin(async move { result })
    }

    fn fetch_parts(&self, type_product: &str) -> ApiFuture<'_, Vec<Part>> {
        let result = Ok(self
            .lock()
            .parts
            .iter()
            .filter(|p| p.type_product == type_product)
            .cloned()
            .collect());
        Box::pin(async move { result })
    }

    fn fetch_part(&self, id: &PartId) -> ApiFuture<'_, Part> {
        let result = self
            .lock()
            .parts
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| not_found(format!("/parts/{id}")));
        Box::pin(async move { result })
    }

    fn create_part(&self, draft: &PartDraft) -> ApiFuture<'_, Part> {
        let mut state = self.lock();
        let part = Part {
            id: PartId::new(Self::next_id(&mut state, "part")),
            type_product: draft.type_product.clone(),
            category: draft.category.clone(),
            value: draft.value.clone(),
            price: draft.price,
            quantity: draft.quantity,
            is_available: draft.is_available,
        };
        state.parts.push(part.clone());
        drop(state);
        Box::pin(async move { Ok(part) })
    }

    fn update_part(&self, part: &Part) -> ApiFuture<'_, Part> {
        let mut state = self.lock();
        let result = state
            .parts
            .iter_mut()
            .find(|p| p.id == part.id)
            .map(|existing| {
                *existing = part.clone();
                existing.clone()
            })
            .ok_or_else(|| not_found(format!("/parts/{}", part.id)));
        drop(state);
        Box::pin(async move { result })
    }

    fn patch_part(&self, id: &PartId, patch: &PartPatch) -> ApiFuture<'_, Part> {
        let mut state = self.lock();
        let result = state
            .parts
            .iter_mut()
            .find(|p| &p.id == id)
            .map(|existing| {
                if let Some(quantity) = patch.quantity {
                    existing.quantity = quantity;
                }
                if let Some(is_available) = patch.is_available {
                    existing.is_available = is_available;
                }
                existing.clone()
            })
            .ok_or_else(|| not_found(format!("/parts/{id}")));
        if result.is_ok() {
            state.part_patches.push((id.clone(), patch.clone()));
        }
        drop(state);
        Box::pin(async move { result })
    }

    fn delete_part(&self, id: &PartId) -> ApiFuture<'_, ()> {
        let mut state = self.lock();
        let before = state.parts.len();
        state.parts.retain(|p| &p.id != id);
        let result = if state.parts.len() == before {
            Err(not_found(format!("/parts/{id}")))
        } else {
            Ok(())
        };
        drop(state);
        Box::pin(async move { result })
    }

    fn fetch_part_options(&self, type_product: &str) -> ApiFuture<'_, Vec<RestrictionOptionGroup>> {
        let state = self.lock();
        let mut groups: Vec<RestrictionOptionGroup> = Vec::new();
        for part in state.parts.iter().filter(|p| p.type_product == type_product) {
            match groups.iter_mut().find(|g| g.category == part.category) {
                Some(group) => {
                    if !group.values.contains(&part.value) {
                        group.values.push(part.value.clone());
                    }
                }
                None => groups.push(RestrictionOptionGroup {
                    category: part.category.clone(),
                    values: vec![part.value.clone()],
                }),
            }
        }
        drop(state);
        Box::pin(async move { Ok(groups) })
    }

    fn fetch_sold_products(&self) -> ApiFuture<'_, Vec<SoldProduct>> {
        let result = Ok(self.lock().sold.clone());
        Box::pin(async move { result })
    }

    fn create_sold_product(&self, draft: &SoldProductDraft) -> ApiFuture<'_, SoldProduct> {
        let mut state = self.lock();
        let result = if state.failing_sale_names.contains(&draft.name) {
            Err(ShopApiError::Status {
                status: 500,
                path: "/custom-products".to_string(),
            })
        } else {
            let sold = SoldProduct {
                id: SoldProductId::new(Self::next_id(&mut state, "sold")),
                name: draft.name.clone(),
                type_product: draft.type_product.clone(),
                price: draft.price,
                created_at: draft.created_at,
                part_ids: draft.part_ids.clone(),
            };
            state.sold.push(sold.clone());
            Ok(sold)
        };
        drop(state);
        Box::pin(async move { result })
    }

    fn delete_sold_product(&self, id: &SoldProductId) -> ApiFuture<'_, ()> {
        let mut state = self.lock();
        let before = state.sold.len();
        state.sold.retain(|s| &s.id != id);
        let result = if state.sold.len() == before {
            Err(not_found(format!("/custom-products/{id}")))
        } else {
            Ok(())
        };
        drop(state);
        Box::pin(async move { result })
    }
}
