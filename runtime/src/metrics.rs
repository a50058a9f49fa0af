//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the storefront runtime:
//! - Store command processing and effect execution
//! - Retry attempts and dead letter queue activity
//! - Shop API requests (catalog, availability, checkout)
//! - Event bus publish/consume (live shop feed)
//!
//! # Example
//!
//! ```rust,no_run
//! use cyclery_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9464
//! let mut server = MetricsServer::new("0.0.0.0:9464".parse()?);
//! server.start()?;
//!
//! // Render current metrics in Prometheus exposition format
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and exposes current values via [`render`](Self::render)
/// for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9464`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Initialize metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if metrics exporter cannot be installed or server cannot bind.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this will fail
    /// with `MetricsError::Install`. In production, ensure this is only called once.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        // Register all metric descriptions
        register_metrics();

        // Build and install the Prometheus exporter
        let builder = PrometheusBuilder::new()
            // Configure histogram buckets for latency measurements
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        // Try to install the recorder
        // In tests, this may fail if a recorder is already installed
        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - scrape endpoint http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    // In tests, multiple MetricsServer instances may be created
                    // We'll allow this but warn about it
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store Metrics
    describe_counter!(
        "store.commands.total",
        "Total number of actions processed by stores"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time taken to execute reducers"
    );
    describe_histogram!(
        "store.effects.count",
        "Number of effects produced per action"
    );
    describe_counter!(
        "store.effects.executed",
        "Total number of effects executed, labeled by type"
    );

    // Retry Metrics
    describe_counter!(
        "store.retry.attempt",
        "Total number of retry attempts, labeled by operation"
    );
    describe_counter!(
        "store.retry.success",
        "Total number of operations that succeeded after retrying"
    );
    describe_counter!(
        "store.retry.exhausted",
        "Total number of operations that exhausted max retries"
    );

    // Dead Letter Queue Metrics
    describe_gauge!("dlq.size", "Current number of entries in the dead letter queue");
    describe_counter!("dlq.pushed", "Total number of entries pushed to the DLQ");
    describe_counter!(
        "dlq.dropped",
        "Total number of entries dropped because the DLQ was full"
    );
    describe_counter!("dlq.drained", "Total number of entries drained from the DLQ");

    // Shutdown Metrics
    describe_counter!(
        "store.shutdown.initiated",
        "Total number of shutdown requests"
    );
    describe_counter!(
        "store.shutdown.completed",
        "Total number of shutdowns that completed cleanly"
    );
    describe_counter!(
        "store.shutdown.timeout",
        "Total number of shutdowns that timed out with effects pending"
    );
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Total number of actions rejected during shutdown"
    );

    // Shop API Metrics
    describe_counter!(
        "shop_api_requests_total",
        "Total number of requests to the shop backend, labeled by endpoint"
    );
    describe_counter!(
        "shop_api_errors_total",
        "Total number of failed shop backend requests, labeled by endpoint"
    );
    describe_histogram!(
        "shop_api_request_duration_seconds",
        "Time taken for shop backend requests"
    );

    // Event Bus Metrics
    describe_counter!(
        "event_bus_messages_published_total",
        "Total number of messages published to event bus"
    );
    describe_counter!(
        "event_bus_messages_consumed_total",
        "Total number of messages consumed from event bus"
    );
    describe_counter!(
        "event_bus_publish_errors_total",
        "Total number of publish errors"
    );
    describe_counter!(
        "event_bus_consume_errors_total",
        "Total number of consume errors"
    );
    describe_histogram!(
        "event_bus_publish_duration_seconds",
        "Time taken to publish messages"
    );
}

/// Shop API metrics recorder.
///
/// Used by the HTTP client wrapping the shop backend. The `endpoint` label
/// is a coarse name like "products" or "stock", never a full URL.
pub struct ShopApiMetrics;

impl ShopApiMetrics {
    /// Record a completed request.
    pub fn record_request(endpoint: &'static str, duration: Duration) {
        counter!("shop_api_requests_total", "endpoint" => endpoint).increment(1);
        histogram!("shop_api_request_duration_seconds", "endpoint" => endpoint)
            .record(duration.as_secs_f64());
    }

    /// Record a failed request.
    pub fn record_error(endpoint: &'static str) {
        counter!("shop_api_errors_total", "endpoint" => endpoint).increment(1);
    }
}

/// Event bus metrics recorder.
pub struct EventBusMetrics;

impl EventBusMetrics {
    /// Record a message publish.
    pub fn record_publish(duration: Duration) {
        counter!("event_bus_messages_published_total").increment(1);
        histogram!("event_bus_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a message consumption.
    pub fn record_consume() {
        counter!("event_bus_messages_consumed_total").increment(1);
    }

    /// Record a publish error.
    pub fn record_publish_error() {
        counter!("event_bus_publish_errors_total").increment(1);
    }

    /// Record a consume error.
    pub fn record_consume_error() {
        counter!("event_bus_consume_errors_total").increment(1);
    }
}
