//! Derived encodings of the signed PEM material.
//!
//! Each conversion is one independent tool invocation; its output file is
//! read back and returned. Keystore forms are selective: only identities for
//! which [`Identity::needs_keystore`] holds get PKCS12 and JKS artifacts.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use tlsfabric_core::{
    ArtifactName, Encoding, FabricError, Identity, KeystorePassword, Result, Stage, StageExt,
};

use crate::config::FabricConfig;
use crate::tools::{
    Converter, KeyStoreRequest, KeystoreTool, Pkcs12Request, Pkcs8Request, TrustStoreRequest,
    PKCS12_SRC_ALIAS,
};

/// Passwords and aliases for one run's conversions.
#[derive(Debug, Clone)]
pub struct ConversionPlan {
    pub password: KeystorePassword,
    pub trust_alias: String,
    pub node_alias: String,
    pub admin_alias: String,
}

impl ConversionPlan {
    pub fn from_config(config: &FabricConfig) -> Self {
        Self {
            password: config.keystore_password(),
            trust_alias: config.trust_alias().to_string(),
            node_alias: config.node_alias(),
            admin_alias: config.admin_alias(),
        }
    }

    /// Keystore alias of `identity`'s key entry; `None` for identities
    /// without a keystore.
    #[must_use]
    pub fn alias_for(&self, identity: Identity) -> Option<&str> {
        match identity {
            Identity::Node => Some(&self.node_alias),
            Identity::Admin => Some(&self.admin_alias),
            Identity::Ca | Identity::Ui | Identity::DashboardProxy => None,
        }
    }
}

/// Runs the conversions through a [`Converter`] and a [`KeystoreTool`].
#[derive(Clone)]
pub struct FormatConverter {
    converter: Arc<dyn Converter>,
    keystore: Arc<dyn KeystoreTool>,
}

impl FormatConverter {
    pub fn new(converter: Arc<dyn Converter>, keystore: Arc<dyn KeystoreTool>) -> Self {
        Self {
            converter,
            keystore,
        }
    }

    /// `<identity>-key.pem` -> `<identity>-key.pkcs8.pem` (unencrypted).
    pub async fn to_pkcs8(&self, identity: Identity, certs_dir: &Path) -> Result<Vec<u8>> {
        let stage = Stage::Pkcs8(identity);
        let key = artifact_path(certs_dir, ArtifactName::private_key(identity));
        let out = artifact_path(certs_dir, ArtifactName::new(identity, Encoding::Pkcs8));

        let diagnostics = self
            .converter
            .pkcs8(&Pkcs8Request { key: &key, out: &out })
            .await
            .stage(stage)?;
        read_output(&out, &diagnostics).await.stage(stage)
    }

    /// Leaf cert + key + CA cert -> password-protected `<identity>.pkcs12`.
    pub async fn to_pkcs12(
        &self,
        identity: Identity,
        certs_dir: &Path,
        password: &KeystorePassword,
    ) -> Result<Vec<u8>> {
        let stage = Stage::Pkcs12(identity);
        let cert = artifact_path(certs_dir, ArtifactName::certificate(identity));
        let key = artifact_path(certs_dir, ArtifactName::private_key(identity));
        let ca_cert = artifact_path(certs_dir, ArtifactName::certificate(Identity::Ca));
        let out = artifact_path(certs_dir, ArtifactName::new(identity, Encoding::Pkcs12));

        let diagnostics = self
            .converter
            .pkcs12(&Pkcs12Request {
                cert: &cert,
                key: &key,
                ca_cert: &ca_cert,
                out: &out,
                password,
            })
            .await
            .stage(stage)?;
        read_output(&out, &diagnostics).await.stage(stage)
    }

    /// CA cert -> `truststore.jks` with the CA under `alias`.
    pub async fn to_jks_trust_store(
        &self,
        certs_dir: &Path,
        alias: &str,
        password: &KeystorePassword,
    ) -> Result<Vec<u8>> {
        let stage = Stage::TrustStore;
        let ca_cert = artifact_path(certs_dir, ArtifactName::certificate(Identity::Ca));
        let out = artifact_path(certs_dir, ArtifactName::trust_store());

        let diagnostics = self
            .keystore
            .import_trusted(&TrustStoreRequest {
                ca_cert: &ca_cert,
                alias,
                out: &out,
                password,
            })
            .await
            .stage(stage)?;
        read_output(&out, &diagnostics).await.stage(stage)
    }

    /// `<identity>.pkcs12` entry `src_alias` -> `<identity>-keystore.jks`
    /// under `dest_alias`.
    pub async fn to_jks_key_store(
        &self,
        identity: Identity,
        certs_dir: &Path,
        src_alias: &str,
        dest_alias: &str,
        password: &KeystorePassword,
    ) -> Result<Vec<u8>> {
        let stage = Stage::KeyStore(identity);
        let pkcs12 = artifact_path(certs_dir, ArtifactName::new(identity, Encoding::Pkcs12));
        let out = artifact_path(certs_dir, ArtifactName::new(identity, Encoding::KeyStore));

        let diagnostics = self
            .keystore
            .import_keystore(&KeyStoreRequest {
                pkcs12: &pkcs12,
                src_alias,
                dest_alias,
                out: &out,
                password,
            })
            .await
            .stage(stage)?;
        read_output(&out, &diagnostics).await.stage(stage)
    }

    /// Every conversion of a run, in dependency order: PKCS8 for the node,
    /// PKCS12 for keystore identities, the trust store, then the keystores.
    #[instrument(skip_all, fields(dir = %certs_dir.display()))]
    pub async fn convert_all(&self, certs_dir: &Path, plan: &ConversionPlan) -> Result<()> {
        let keystore_identities: Vec<Identity> = [Identity::Admin, Identity::Node]
            .into_iter()
            .filter(|id| id.needs_keystore())
            .collect();

        info!("converting node to pkcs8");
        self.to_pkcs8(Identity::Node, certs_dir).await?;

        for &identity in &keystore_identities {
            info!("converting {identity} to pkcs12");
            self.to_pkcs12(identity, certs_dir, &plan.password).await?;
        }

        info!("converting ca cert to jks");
        self.to_jks_trust_store(certs_dir, &plan.trust_alias, &plan.password)
            .await?;

        for &identity in &keystore_identities {
            let alias = plan.alias_for(identity).ok_or_else(|| {
                FabricError::Config(format!("no keystore alias for {identity}"))
                    .in_stage(Stage::KeyStore(identity))
            })?;
            info!("converting {identity} cert to jks");
            self.to_jks_key_store(identity, certs_dir, PKCS12_SRC_ALIAS, alias, &plan.password)
                .await?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for FormatConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatConverter").finish_non_exhaustive()
    }
}

fn artifact_path(certs_dir: &Path, artifact: ArtifactName) -> PathBuf {
    certs_dir.join(artifact.file_name())
}

/// Read a tool's output file; absence is `MissingOutput` with the tool's
/// captured output attached.
async fn read_output(path: &Path, diagnostics: &str) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == IoErrorKind::NotFound => Err(FabricError::MissingOutput {
            path: path.to_path_buf(),
            diagnostics: diagnostics.to_string(),
        }),
        Err(e) => Err(FabricError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tlsfabric_core::ErrorKind;

    /// Concatenates its inputs into the output file and logs every call.
    #[derive(Default)]
    struct FakeTools {
        calls: Mutex<Vec<String>>,
        skip_output: bool,
    }

    impl FakeTools {
        fn emit(&self, call: String, out: &Path, inputs: &[&Path]) -> Result<String> {
            self.calls.lock().unwrap().push(call);
            if !self.skip_output {
                let mut body = Vec::new();
                for input in inputs {
                    body.extend(std::fs::read(input).map_err(|e| FabricError::io(*input, e))?);
                }
                std::fs::write(out, body).unwrap();
            }
            Ok(String::from("tool said nothing useful"))
        }
    }

    #[async_trait]
    impl Converter for FakeTools {
        async fn pkcs8(&self, r: &Pkcs8Request<'_>) -> Result<String> {
            self.emit(format!("pkcs8 {}", r.key.display()), r.out, &[r.key])
        }

        async fn pkcs12(&self, r: &Pkcs12Request<'_>) -> Result<String> {
            assert_eq!(r.password.expose(), "s3cret");
            self.emit(
                format!("pkcs12 {}", r.cert.display()),
                r.out,
                &[r.cert, r.key, r.ca_cert],
            )
        }
    }

    #[async_trait]
    impl KeystoreTool for FakeTools {
        async fn import_trusted(&self, r: &TrustStoreRequest<'_>) -> Result<String> {
            self.emit(format!("trust {}", r.alias), r.out, &[r.ca_cert])
        }

        async fn import_keystore(&self, r: &KeyStoreRequest<'_>) -> Result<String> {
            assert_eq!(r.src_alias, "1");
            self.emit(format!("keystore {}", r.dest_alias), r.out, &[r.pkcs12])
        }
    }

    fn seed_pem(dir: &Path) {
        for identity in Identity::ALL {
            let stem = identity.file_stem();
            std::fs::write(dir.join(format!("{stem}.pem")), format!("{stem}-cert;")).unwrap();
            std::fs::write(dir.join(format!("{stem}-key.pem")), format!("{stem}-key;")).unwrap();
        }
    }

    fn plan() -> ConversionPlan {
        ConversionPlan {
            password: KeystorePassword::new("s3cret"),
            trust_alias: "root-ca".into(),
            node_alias: "elasticsearch-node".into(),
            admin_alias: "elasticsearch-admin".into(),
        }
    }

    #[tokio::test]
    async fn test_convert_all_produces_selective_artifacts() {
        let certs = tempfile::tempdir().unwrap();
        seed_pem(certs.path());
        let tools = Arc::new(FakeTools::default());
        let converter = FormatConverter::new(tools.clone(), tools.clone());

        converter.convert_all(certs.path(), &plan()).await.unwrap();

        for file in [
            "node-key.pkcs8.pem",
            "node.pkcs12",
            "sgadmin.pkcs12",
            "truststore.jks",
            "node-keystore.jks",
            "sgadmin-keystore.jks",
        ] {
            assert!(certs.path().join(file).is_file(), "{file} missing");
        }
        for file in ["kibana.pkcs12", "cerebro-keystore.jks", "kibana-key.pkcs8.pem"] {
            assert!(!certs.path().join(file).exists(), "{file} unexpected");
        }

        let calls = tools.calls.lock().unwrap();
        assert!(calls[0].starts_with("pkcs8"));
        assert_eq!(calls[3], "trust root-ca");
        assert_eq!(calls[4], "keystore elasticsearch-admin");
        assert_eq!(calls[5], "keystore elasticsearch-node");
    }

    #[tokio::test]
    async fn test_pkcs12_bundles_cert_key_and_ca() {
        let certs = tempfile::tempdir().unwrap();
        seed_pem(certs.path());
        let tools = Arc::new(FakeTools::default());
        let converter = FormatConverter::new(tools.clone(), tools);

        let bytes = converter
            .to_pkcs12(Identity::Node, certs.path(), &KeystorePassword::new("s3cret"))
            .await
            .unwrap();
        assert_eq!(bytes, b"node-cert;node-key;ca-cert;");
    }

    #[tokio::test]
    async fn test_missing_output_carries_diagnostics() {
        let certs = tempfile::tempdir().unwrap();
        seed_pem(certs.path());
        let tools = Arc::new(FakeTools {
            skip_output: true,
            ..FakeTools::default()
        });
        let converter = FormatConverter::new(tools.clone(), tools);

        let err = converter
            .to_pkcs8(Identity::Node, certs.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Process);
        assert_eq!(err.stage(), Some(Stage::Pkcs8(Identity::Node)));
        assert_eq!(err.diagnostics(), Some("tool said nothing useful"));
    }

    #[test]
    fn test_alias_for_identity() {
        let plan = plan();
        assert_eq!(plan.alias_for(Identity::Node), Some("elasticsearch-node"));
        assert_eq!(plan.alias_for(Identity::Admin), Some("elasticsearch-admin"));
        for identity in [Identity::Ca, Identity::Ui, Identity::DashboardProxy] {
            assert_eq!(plan.alias_for(identity), None, "{identity}");
        }
    }
}
