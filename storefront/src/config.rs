//! Configuration management for the storefront.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopConfig {
    /// Shop backend REST API configuration
    pub api: ApiConfig,
    /// Live feed (RedPanda/Kafka) configuration
    pub feed: FeedConfig,
    /// Cart persistence configuration
    pub cart: CartConfig,
    /// Logging and metrics configuration
    pub observability: ObservabilityConfig,
}

/// Shop backend REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL including the path prefix, e.g. `http://localhost:3000/api`
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl ApiConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Live feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Topic carrying every shop event
    pub topic: String,
    /// Consumer group for this storefront instance
    pub consumer_group: String,
}

/// Cart persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartConfig {
    /// File path the cart is stored at between sessions
    pub path: String,
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Address the Prometheus endpoint binds to
    pub metrics_addr: String,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl ShopConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig {
                base_url: env::var("SHOP_API_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3000/api".to_string()),
                timeout_secs: env::var("SHOP_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            },
            feed: FeedConfig {
                brokers: env::var("SHOP_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string()),
                topic: env::var("SHOP_EVENTS_TOPIC")
                    .unwrap_or_else(|_| "shop-events".to_string()),
                consumer_group: env::var("SHOP_CONSUMER_GROUP")
                    .unwrap_or_else(|_| "cyclery-storefront".to_string()),
            },
            cart: CartConfig {
                path: env::var("SHOP_CART_PATH").unwrap_or_else(|_| "cart.json".to_string()),
            },
            observability: ObservabilityConfig {
                metrics_addr: env::var("SHOP_METRICS_ADDR")
                    .unwrap_or_else(|_| "127.0.0.1:9464".to_string()),
                log_filter: env::var("SHOP_LOG").unwrap_or_else(|_| "cyclery=info".to_string()),
            },
        }
    }
}
