//! Signing policy and CSR descriptor generation.
//!
//! Writes, under the config directory:
//!
//! ```text
//! ca-config.json         signing policy
//! ca-csr.json            CA request (no CN, service hosts)
//! req-node-csr.json      \
//! req-sgadmin-csr.json    | leaf requests, CN = identity,
//! req-kibana-csr.json     | hosts = <identity>-<cluster>[.<ns>[.svc.cluster.local]]
//! req-cerebro-csr.json   /
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use tlsfabric_core::{CsrDescriptor, FabricError, Identity, Result, SigningPolicy};

use crate::config::FabricConfig;

/// Filename of the signing policy document.
pub const CA_CONFIG_FILE: &str = "ca-config.json";

/// Every descriptor of one run, built from fixed inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSet {
    pub policy: SigningPolicy,
    /// CA first, then the leaves in issuance order
    pub requests: Vec<(Identity, CsrDescriptor)>,
}

impl DescriptorSet {
    /// Build the policy and all five CSR descriptors.
    ///
    /// Namespace and cluster name are interpolated into hostnames as-is.
    pub fn build(config: &FabricConfig, namespace: &str, cluster_name: &str) -> Self {
        let mut requests = Vec::with_capacity(Identity::ALL.len());
        requests.push((
            Identity::Ca,
            CsrDescriptor::ca(
                &config.service_name,
                namespace,
                cluster_name,
                config.ca_subject.clone(),
            ),
        ));
        for identity in Identity::LEAVES {
            requests.push((
                identity,
                CsrDescriptor::leaf(identity, namespace, cluster_name, config.leaf_subject.clone()),
            ));
        }

        Self {
            policy: config.signing_policy(),
            requests,
        }
    }

    #[must_use]
    pub fn get(&self, identity: Identity) -> Option<&CsrDescriptor> {
        self.requests
            .iter()
            .find(|(id, _)| *id == identity)
            .map(|(_, csr)| csr)
    }

    /// Serialize every descriptor into `config_dir`, stopping at the first
    /// failure. Files written before the failure are left in place.
    pub async fn write(&self, config_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.requests.len() + 1);
        written.push(write_json(config_dir, CA_CONFIG_FILE, &self.policy.to_document()).await?);
        for (identity, csr) in &self.requests {
            written.push(write_json(config_dir, identity.csr_file(), csr).await?);
        }
        Ok(written)
    }
}

/// Build and write the descriptors for `(namespace, cluster_name)`.
#[instrument(skip(config, config_dir), fields(dir = %config_dir.display()))]
pub async fn generate(
    config: &FabricConfig,
    config_dir: &Path,
    namespace: &str,
    cluster_name: &str,
) -> Result<DescriptorSet> {
    let set = DescriptorSet::build(config, namespace, cluster_name);
    let written = set.write(config_dir).await?;
    debug!(files = written.len(), "wrote signing descriptors");
    Ok(set)
}

/// Path of the descriptor for `identity` inside `config_dir`.
#[must_use]
pub fn csr_path(config_dir: &Path, identity: Identity) -> PathBuf {
    config_dir.join(identity.csr_file())
}

/// Path of the signing policy inside `config_dir`.
#[must_use]
pub fn policy_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CA_CONFIG_FILE)
}

async fn write_json<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<PathBuf> {
    let body = serde_json::to_vec(value).map_err(|source| FabricError::Json {
        file: file.to_string(),
        source,
    })?;
    let path = dir.join(file);
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| FabricError::io(&path, e))?;
    Ok(path)
}
