//! CA self-signing and leaf issuance.
//!
//! The CA must be issued before any leaf: leaf signing reads `ca.pem` and
//! `ca-key.pem` from the certs directory. Leaves only read the CA material
//! and their own descriptor, and write only their own pair, so they can be
//! issued in any order or concurrently.

use futures_util::future::try_join_all;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

use tlsfabric_core::{ArtifactName, FabricError, Identity, Result, Stage, StageExt};

use crate::descriptors::{csr_path, policy_path};
use crate::tools::{CaRequest, LeafRequest, OutputPrefix, Signer, SERVER_PROFILE};
use crate::workspace::ensure_output;

/// Issues the CA and leaf certificates through a [`Signer`].
#[derive(Clone)]
pub struct CertAuthority {
    signer: Arc<dyn Signer>,
}

impl CertAuthority {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }

    /// Self-sign the CA from `ca-csr.json`, producing `ca.pem` and `ca-key.pem`.
    #[instrument(skip(self, config_dir, certs_dir))]
    pub async fn issue_ca(&self, config_dir: &Path, certs_dir: &Path) -> Result<()> {
        info!("creating ca cert");
        let csr = csr_path(config_dir, Identity::Ca);
        let request = CaRequest {
            csr: &csr,
            out: OutputPrefix::new(certs_dir, Identity::Ca),
        };

        let diagnostics = self.signer.issue_ca(&request).await.stage(Stage::IssueCa)?;
        ensure_output(&request.out.cert_path(), &diagnostics)
            .await
            .stage(Stage::IssueCa)?;
        ensure_output(&request.out.key_path(), &diagnostics)
            .await
            .stage(Stage::IssueCa)
    }

    /// Sign one leaf against the CA, producing `<identity>.pem` and
    /// `<identity>-key.pem`.
    #[instrument(skip(self, config_dir, certs_dir))]
    pub async fn issue_leaf(
        &self,
        identity: Identity,
        config_dir: &Path,
        certs_dir: &Path,
    ) -> Result<()> {
        let stage = Stage::IssueLeaf(identity);
        if !identity.is_leaf() {
            return Err(FabricError::Config(format!("{identity} is not a leaf identity")).in_stage(stage));
        }

        let ca_cert = certs_dir.join(ArtifactName::certificate(Identity::Ca).file_name());
        let ca_key = certs_dir.join(ArtifactName::private_key(Identity::Ca).file_name());
        for (artifact, path) in [
            (ArtifactName::certificate(Identity::Ca), &ca_cert),
            (ArtifactName::private_key(Identity::Ca), &ca_key),
        ] {
            if !tokio::fs::try_exists(path)
                .await
                .map_err(|e| FabricError::io(path, e))
                .stage(stage)?
            {
                return Err(FabricError::MissingArtifact {
                    name: artifact.file_name(),
                    path: path.clone(),
                }
                .in_stage(stage));
            }
        }

        info!("creating {identity} cert");
        let csr = csr_path(config_dir, identity);
        let policy = policy_path(config_dir);
        let request = LeafRequest {
            identity,
            csr: &csr,
            policy: &policy,
            profile: SERVER_PROFILE,
            ca_cert: &ca_cert,
            ca_key: &ca_key,
            out: OutputPrefix::new(certs_dir, identity),
        };

        let diagnostics = self.signer.issue_leaf(&request).await.stage(stage)?;
        ensure_output(&request.out.cert_path(), &diagnostics)
            .await
            .stage(stage)?;
        ensure_output(&request.out.key_path(), &diagnostics)
            .await
            .stage(stage)
    }

    /// Issue every leaf concurrently. The first failure aborts the rest.
    pub async fn issue_leaves(&self, config_dir: &Path, certs_dir: &Path) -> Result<()> {
        try_join_all(
            Identity::LEAVES
                .into_iter()
                .map(|identity| self.issue_leaf(identity, config_dir, certs_dir)),
        )
        .await?;
        Ok(())
    }
}

impl std::fmt::Debug for CertAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertAuthority").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tlsfabric_core::ErrorKind;

    /// Writes placeholder PEM pairs and records what it was asked to sign.
    #[derive(Default)]
    struct RecordingSigner {
        signed: Mutex<Vec<Identity>>,
        fail_on: Option<Identity>,
        skip_key_for: Option<Identity>,
    }

    impl RecordingSigner {
        async fn write(&self, identity: Identity, out: &OutputPrefix) -> Result<String> {
            if self.fail_on == Some(identity) {
                return Err(FabricError::ProcessFailed {
                    command: format!("sign {identity}"),
                    status: "exit status: 1".into(),
                    diagnostics: "boom".into(),
                });
            }
            std::fs::write(out.cert_path(), format!("cert {identity}")).unwrap();
            if self.skip_key_for != Some(identity) {
                std::fs::write(out.key_path(), format!("key {identity}")).unwrap();
            }
            self.signed.lock().unwrap().push(identity);
            Ok(String::from("signed"))
        }
    }

    #[async_trait]
    impl Signer for RecordingSigner {
        async fn issue_ca(&self, request: &CaRequest<'_>) -> Result<String> {
            self.write(Identity::Ca, &request.out).await
        }

        async fn issue_leaf(&self, request: &LeafRequest<'_>) -> Result<String> {
            assert_eq!(request.profile, "server");
            assert!(request.csr.ends_with(request.identity.csr_file()));
            assert!(request.policy.ends_with("ca-config.json"));
            self.write(request.identity, &request.out).await
        }
    }

    #[tokio::test]
    async fn test_ca_then_leaves() {
        let config = tempfile::tempdir().unwrap();
        let certs = tempfile::tempdir().unwrap();
        let signer = Arc::new(RecordingSigner::default());
        let authority = CertAuthority::new(signer.clone());

        authority.issue_ca(config.path(), certs.path()).await.unwrap();
        authority
            .issue_leaves(config.path(), certs.path())
            .await
            .unwrap();

        for file in [
            "ca.pem",
            "ca-key.pem",
            "node.pem",
            "node-key.pem",
            "sgadmin.pem",
            "kibana-key.pem",
            "cerebro.pem",
        ] {
            assert!(certs.path().join(file).is_file(), "{file} missing");
        }
        let signed = signer.signed.lock().unwrap();
        assert_eq!(signed.len(), 5);
        assert_eq!(signed[0], Identity::Ca);
    }

    #[tokio::test]
    async fn test_leaf_before_ca_is_missing_artifact() {
        let config = tempfile::tempdir().unwrap();
        let certs = tempfile::tempdir().unwrap();
        let authority = CertAuthority::new(Arc::new(RecordingSigner::default()));

        let err = authority
            .issue_leaf(Identity::Node, config.path(), certs.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingArtifact);
        assert_eq!(err.stage(), Some(Stage::IssueLeaf(Identity::Node)));
    }

    #[tokio::test]
    async fn test_signer_failure_is_attributed() {
        let config = tempfile::tempdir().unwrap();
        let certs = tempfile::tempdir().unwrap();
        let authority = CertAuthority::new(Arc::new(RecordingSigner {
            fail_on: Some(Identity::Admin),
            ..RecordingSigner::default()
        }));

        authority.issue_ca(config.path(), certs.path()).await.unwrap();
        let err = authority
            .issue_leaves(config.path(), certs.path())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::IssueLeaf(Identity::Admin)));
        assert_eq!(err.diagnostics(), Some("boom"));
    }

    #[tokio::test]
    async fn test_missing_key_output_is_reported() {
        let config = tempfile::tempdir().unwrap();
        let certs = tempfile::tempdir().unwrap();
        let authority = CertAuthority::new(Arc::new(RecordingSigner {
            skip_key_for: Some(Identity::Ca),
            ..RecordingSigner::default()
        }));

        let err = authority
            .issue_ca(config.path(), certs.path())
            .await
            .unwrap_err();
        match err {
            FabricError::Stage { stage, source } => {
                assert_eq!(stage, Stage::IssueCa);
                assert!(matches!(*source, FabricError::MissingOutput { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ca_is_not_a_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let authority = CertAuthority::new(Arc::new(RecordingSigner::default()));
        let err = authority
            .issue_leaf(Identity::Ca, dir.path(), dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
