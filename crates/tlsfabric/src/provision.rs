//! End-to-end provisioning run.
//!
//! ```text
//! clean config dir -> write descriptors -> stage certs dir
//!   -> issue CA -> issue leaves -> conversions -> commit -> assemble bundle
//! ```
//!
//! Runs against the same directories must not overlap; callers serialize
//! runs per `(namespace, cluster)`.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use tlsfabric_core::{Bundle, BundleKey, Result, Stage, StageExt};

use crate::authority::CertAuthority;
use crate::bundle;
use crate::config::FabricConfig;
use crate::convert::{ConversionPlan, FormatConverter};
use crate::descriptors;
use crate::pipeline::PipelineRunner;
use crate::store::BundleStore;
use crate::tools::{
    CfsslSigner, Converter, KeystoreTool, KeytoolKeystore, OpensslConverter, Signer,
};
use crate::workspace::{self, StagedCerts};

/// Drives every stage for one cluster at a time.
#[derive(Debug, Clone)]
pub struct Provisioner {
    config: FabricConfig,
    authority: CertAuthority,
    converter: FormatConverter,
}

impl Provisioner {
    /// Build a provisioner over explicit capability implementations.
    pub fn new(
        config: FabricConfig,
        signer: Arc<dyn Signer>,
        converter: Arc<dyn Converter>,
        keystore: Arc<dyn KeystoreTool>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            authority: CertAuthority::new(signer),
            converter: FormatConverter::new(converter, keystore),
        })
    }

    /// Build a provisioner that shells out to cfssl, openssl and keytool.
    pub fn with_process_tools(config: FabricConfig) -> Result<Self> {
        let runner = PipelineRunner::new(config.command_timeout());
        let tools = config.tools.clone();
        Self::new(
            config,
            Arc::new(CfsslSigner::new(runner, tools.cfssl, tools.cfssljson)),
            Arc::new(OpensslConverter::new(runner, tools.openssl)),
            Arc::new(KeytoolKeystore::new(runner, tools.keytool)),
        )
    }

    #[must_use]
    pub const fn config(&self) -> &FabricConfig {
        &self.config
    }

    #[must_use]
    pub fn bundle_key(&self, namespace: &str, cluster_name: &str) -> BundleKey {
        BundleKey::new(namespace, cluster_name)
    }

    /// Generate all artifacts for `(namespace, cluster_name)` and commit them
    /// to the certs directory. On failure the previous artifacts are left
    /// as they were.
    #[instrument(skip(self))]
    pub async fn generate(&self, namespace: &str, cluster_name: &str) -> Result<PathBuf> {
        let config_dir = &self.config.config_dir;

        workspace::prepare(config_dir).await.stage(Stage::Clean)?;
        descriptors::generate(&self.config, config_dir, namespace, cluster_name)
            .await
            .stage(Stage::Configure)?;

        let staged = StagedCerts::new(&self.config.certs_dir)
            .await
            .stage(Stage::Commit)?;
        let certs_dir = staged.path();

        self.authority.issue_ca(config_dir, certs_dir).await?;
        self.authority.issue_leaves(config_dir, certs_dir).await?;

        let plan = ConversionPlan::from_config(&self.config);
        self.converter.convert_all(certs_dir, &plan).await?;

        let committed = staged.commit().await.stage(Stage::Commit)?;
        info!(dir = %committed.display(), "certificates generated");
        Ok(committed)
    }

    /// Assemble the bundle from the committed certs directory.
    pub async fn assemble(&self, namespace: &str, cluster_name: &str) -> Result<Bundle> {
        let key = self.bundle_key(namespace, cluster_name);
        let name = key.object_name(&self.config.bundle_prefix);
        bundle::collect(&self.config.certs_dir, key, name).await
    }

    /// Generate, then assemble.
    pub async fn provision(&self, namespace: &str, cluster_name: &str) -> Result<Bundle> {
        self.generate(namespace, cluster_name).await?;
        self.assemble(namespace, cluster_name).await
    }

    /// Provision and store a bundle unless the store already has one.
    ///
    /// Returns whether a new bundle was created.
    pub async fn ensure_bundle(
        &self,
        store: &dyn BundleStore,
        namespace: &str,
        cluster_name: &str,
    ) -> Result<bool> {
        let key = self.bundle_key(namespace, cluster_name);
        if store.exists(&key).await? {
            info!(%key, "certs bundle already exists");
            return Ok(false);
        }

        let bundle = self.provision(namespace, cluster_name).await?;
        store.create(bundle).await?;
        info!(%key, "created certs bundle");
        Ok(true)
    }

    /// Replace any stored bundle with a freshly provisioned one.
    ///
    /// The old bundle is deleted only after the new artifacts are generated.
    /// If storing the new bundle fails, the old one is put back.
    pub async fn rotate_bundle(
        &self,
        store: &dyn BundleStore,
        namespace: &str,
        cluster_name: &str,
    ) -> Result<Bundle> {
        let key = self.bundle_key(namespace, cluster_name);
        let bundle = self.provision(namespace, cluster_name).await?;

        let previous = store.get(&key).await?;
        if previous.is_some() {
            store.delete(&key).await?;
        }
        if let Err(e) = store.create(bundle.clone()).await {
            if let Some(previous) = previous {
                if let Err(restore) = store.create(previous).await {
                    warn!(%key, error = %restore, "failed to restore previous certs bundle");
                }
            }
            return Err(e);
        }
        info!(%key, "replaced certs bundle");
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tlsfabric_core::{ErrorKind, KeystorePassword};

    fn config(root: &std::path::Path) -> FabricConfig {
        FabricConfig {
            keystore_password: Some(KeystorePassword::new("s3cret")),
            ..FabricConfig::default().with_dirs(root.join("config"), root.join("certs"))
        }
    }

    #[test]
    fn test_bundle_naming() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = Provisioner::with_process_tools(config(tmp.path())).unwrap();
        let key = provisioner.bundle_key("logging", "prod");
        assert_eq!(key.to_string(), "logging/prod");
        assert_eq!(
            key.object_name(&provisioner.config().bundle_prefix),
            "es-certs-prod"
        );
    }

    #[test]
    fn test_same_dirs_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = FabricConfig::default().with_dirs(tmp.path(), tmp.path());
        let err = Provisioner::with_process_tools(cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_missing_tool_fails_at_ca_and_keeps_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config(tmp.path());
        cfg.tools.cfssl = "cfssl-not-installed-here".into();
        let provisioner = Provisioner::with_process_tools(cfg).unwrap();

        let err = provisioner.generate("logging", "prod").await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::IssueCa));
        assert_eq!(err.kind(), ErrorKind::Process);
        assert!(!tmp.path().join("certs").exists());
        assert!(tmp.path().join("config/ca-csr.json").is_file());
    }
}
