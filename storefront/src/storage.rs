//! Durable cart storage.
//!
//! The cart survives restarts; everything else is rebuilt from the backend.
//! Saves are fire-and-forget from the cart store's point of view: a failed
//! write is logged and the in-memory cart stays authoritative for the
//! session.

use crate::types::CartItem;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

/// Boxed future returned by [`CartStorage`] methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where the cart is persisted between sessions.
///
/// Uses explicit boxed futures rather than `async fn` so the trait stays
/// dyn-compatible behind `Arc<dyn CartStorage>`.
pub trait CartStorage: Send + Sync {
    /// Loads the persisted cart. `None` when nothing usable is stored.
    fn load(&self) -> StorageFuture<'_, Option<Vec<CartItem>>>;

    /// Persists the full cart, replacing whatever was stored before.
    fn save(&self, items: &[CartItem]) -> StorageFuture<'_, ()>;
}

/// [`CartStorage`] backed by a pretty-printed JSON file.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-save never leaves a truncated cart behind.
#[derive(Clone, Debug)]
pub struct JsonFileCartStorage {
    path: PathBuf,
}

impl JsonFileCartStorage {
    /// Creates storage at the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file path the cart is stored at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_atomic(path: &Path, items: &[CartItem]) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(items)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

impl CartStorage for JsonFileCartStorage {
    fn load(&self) -> StorageFuture<'_, Option<Vec<CartItem>>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(&self.path).await.ok()?;
            match serde_json::from_slice(&bytes) {
                Ok(items) => Some(items),
                Err(error) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        %error,
                        "Stored cart is unreadable, starting empty"
                    );
                    None
                }
            }
        })
    }

    fn save(&self, items: &[CartItem]) -> StorageFuture<'_, ()> {
        let items = items.to_vec();
        Box::pin(async move {
            if let Err(error) = Self::write_atomic(&self.path, &items).await {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "Failed to persist cart"
                );
            }
        })
    }
}

/// [`CartStorage`] held in memory, for the demo binary and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryCartStorage {
    items: Arc<Mutex<Option<Vec<CartItem>>>>,
}

impl MemoryCartStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage pre-populated with a saved cart.
    #[must_use]
    pub fn with_items(items: Vec<CartItem>) -> Self {
        Self {
            items: Arc::new(Mutex::new(Some(items))),
        }
    }

    /// The most recently saved cart, if any save happened.
    #[must_use]
    pub fn saved(&self) -> Option<Vec<CartItem>> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CartStorage for MemoryCartStorage {
    fn load(&self) -> StorageFuture<'_, Option<Vec<CartItem>>> {
        let items = self.saved();
        Box::pin(async move { items })
    }

    fn save(&self, items: &[CartItem]) -> StorageFuture<'_, ()> {
        let saved = items.to_vec();
        *self.items.lock().unwrap_or_else(PoisonError::into_inner) = Some(saved);
        Box::pin(async move {})
    }
}
