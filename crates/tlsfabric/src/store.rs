//! Bundle persistence boundary.
//!
//! The pipeline only produces a [`Bundle`]; where it is kept (a Kubernetes
//! secret, a vault path) is up to a [`BundleStore`] implementation.
//! [`MemoryBundleStore`] is provided for tests and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use tlsfabric_core::{Bundle, BundleKey, FabricError, Result};

/// Key-value style store for bundles, one bundle per `(namespace, cluster)`.
#[async_trait]
pub trait BundleStore: Send + Sync {
    async fn exists(&self, key: &BundleKey) -> Result<bool>;

    /// Fails with `BundleExists` if a bundle is already stored under the key.
    async fn create(&self, bundle: Bundle) -> Result<()>;

    /// Fails with `BundleNotFound` if nothing is stored under the key.
    async fn delete(&self, key: &BundleKey) -> Result<()>;

    async fn get(&self, key: &BundleKey) -> Result<Option<Bundle>>;
}

/// In-memory [`BundleStore`]. Data is lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryBundleStore {
    bundles: Arc<RwLock<HashMap<BundleKey, Bundle>>>,
}

impl MemoryBundleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.bundles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bundles.read().await.is_empty()
    }
}

#[async_trait]
impl BundleStore for MemoryBundleStore {
    async fn exists(&self, key: &BundleKey) -> Result<bool> {
        Ok(self.bundles.read().await.contains_key(key))
    }

    async fn create(&self, bundle: Bundle) -> Result<()> {
        let mut bundles = self.bundles.write().await;
        if bundles.contains_key(&bundle.key) {
            return Err(FabricError::BundleExists {
                namespace: bundle.key.namespace.clone(),
                name: bundle.name,
            });
        }
        bundles.insert(bundle.key.clone(), bundle);
        Ok(())
    }

    async fn delete(&self, key: &BundleKey) -> Result<()> {
        self.bundles
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| FabricError::BundleNotFound {
                namespace: key.namespace.clone(),
                name: key.cluster_name.clone(),
            })
    }

    async fn get(&self, key: &BundleKey) -> Result<Option<Bundle>> {
        Ok(self.bundles.read().await.get(key).cloned())
    }
}
