//! A caller-owned cache of built packages shared between models.
//!
//! Entries are keyed by a digest of the configuration tree and the loaded
//! rasters, plus the stage name. Two models with identical inputs therefore
//! share stage outputs without rebuilding them.

use crate::config::ConfigStore;
use crate::core::Package;
use crate::geo::RasterStore;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Computes the cache key for a model's current inputs.
///
/// Remake flags are not part of the key.
#[must_use]
pub fn cache_key(config: &ConfigStore, rasters: &RasterStore) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config.hash().as_bytes());
    hasher.update(rasters.fingerprint().as_bytes());
    hex::encode(hasher.finalize())
}

/// Concurrent map from (cache key, stage) to a built package.
#[derive(Debug, Default)]
pub struct PackageCache {
    entries: DashMap<(String, String), Arc<Package>>,
}

impl PackageCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached package, if any.
    #[must_use]
    pub fn get(&self, key: &str, stage: &str) -> Option<Arc<Package>> {
        self.entries
            .get(&(key.to_string(), stage.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Stores a package.
    pub fn insert(&self, key: &str, stage: &str, package: Arc<Package>) {
        self.entries.insert((key.to_string(), stage.to_string()), package);
    }

    /// Removes one entry.
    pub fn remove(&self, key: &str, stage: &str) -> Option<Arc<Package>> {
        self.entries
            .remove(&(key.to_string(), stage.to_string()))
            .map(|(_, package)| package)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
