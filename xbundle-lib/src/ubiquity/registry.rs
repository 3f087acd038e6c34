//! Shared, atomically replaceable trust store handle.

use super::TrustStore;
use crate::BundleError;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// Process-wide holder of the current [`TrustStore`].
///
/// Readers take an `Arc` snapshot and work from it for the whole request, so
/// a concurrent [`replace`](TrustRegistry::replace) never exposes a partially
/// updated store. The lock is held only long enough to clone or swap the
/// `Arc`.
#[derive(Debug)]
pub struct TrustRegistry {
    current: RwLock<Arc<TrustStore>>,
}

impl TrustRegistry {
    pub fn new(store: TrustStore) -> Self {
        TrustRegistry {
            current: RwLock::new(Arc::new(store)),
        }
    }

    /// Load the registry from a metadata file.
    pub fn load(path: &Path) -> Result<Self, BundleError> {
        TrustStore::from_metadata_file(path).map(Self::new)
    }

    /// The store as of now.
    pub fn snapshot(&self) -> Arc<TrustStore> {
        self.current.read().clone()
    }

    /// Swap in a new store, returning the previous one.
    pub fn replace(&self, store: TrustStore) -> Arc<TrustStore> {
        std::mem::replace(&mut *self.current.write(), Arc::new(store))
    }

    /// Reload from a metadata file. On error the current store is kept.
    pub fn reload(&self, path: &Path) -> Result<(), BundleError> {
        let store = TrustStore::from_metadata_file(path)?;
        self.replace(store);
        tracing::debug!(path = %path.display(), "trust registry reloaded");
        Ok(())
    }
}

impl Default for TrustRegistry {
    fn default() -> Self {
        Self::new(TrustStore::empty())
    }
}
