//! The aggregate handed to the external store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// External key of a bundle. Exactly one bundle exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleKey {
    pub namespace: String,
    pub cluster_name: String,
}

impl BundleKey {
    pub fn new(namespace: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            cluster_name: cluster_name.into(),
        }
    }

    /// Object name inside the namespace: `<prefix>-<cluster>`.
    #[must_use]
    pub fn object_name(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.cluster_name)
    }
}

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.cluster_name)
    }
}

/// Logical artifact name -> content. Best-effort artifacts that were not on
/// disk are present with an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub key: BundleKey,
    /// Object name the store persists the bundle under
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Bundle {
    pub fn new(key: BundleKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            created_at: Utc::now(),
            data: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, content: Vec<u8>) {
        self.data.insert(name.into(), content);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.data.get(name).map(Vec::as_slice)
    }

    /// Present and non-empty.
    #[must_use]
    pub fn is_populated(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Names whose value is empty (best-effort artifacts that were missing).
    pub fn empty_entries(&self) -> impl Iterator<Item = &str> {
        self.data
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
