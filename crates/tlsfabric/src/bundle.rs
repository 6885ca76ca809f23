//! Bundle assembly from the committed certs directory.
//!
//! The node and admin keystores are required; every other artifact is read
//! best-effort and stored empty when absent.

use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use tracing::{debug, instrument, warn};

use tlsfabric_core::{
    ArtifactName, Bundle, BundleKey, Encoding, FabricError, Identity, Result, Stage,
};

/// Whether a missing artifact aborts assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    BestEffort,
}

/// Artifacts collected into every bundle, in the order they are read.
pub const BUNDLE_ARTIFACTS: [(ArtifactName, Requirement); 14] = [
    (ArtifactName::new(Identity::Node, Encoding::KeyStore), Requirement::Required),
    (ArtifactName::new(Identity::Admin, Encoding::KeyStore), Requirement::Required),
    (ArtifactName::trust_store(), Requirement::BestEffort),
    (ArtifactName::certificate(Identity::Ca), Requirement::BestEffort),
    (ArtifactName::private_key(Identity::Ca), Requirement::BestEffort),
    (ArtifactName::certificate(Identity::Node), Requirement::BestEffort),
    (ArtifactName::private_key(Identity::Node), Requirement::BestEffort),
    (ArtifactName::new(Identity::Node, Encoding::Pkcs8), Requirement::BestEffort),
    (ArtifactName::certificate(Identity::Admin), Requirement::BestEffort),
    (ArtifactName::private_key(Identity::Admin), Requirement::BestEffort),
    (ArtifactName::private_key(Identity::Ui), Requirement::BestEffort),
    (ArtifactName::certificate(Identity::Ui), Requirement::BestEffort),
    (ArtifactName::private_key(Identity::DashboardProxy), Requirement::BestEffort),
    (ArtifactName::certificate(Identity::DashboardProxy), Requirement::BestEffort),
];

/// Read every bundle artifact from `certs_dir`.
///
/// A missing required artifact is `MissingArtifact`. A best-effort artifact
/// that cannot be read for any reason is included with an empty value.
#[instrument(skip(certs_dir, bundle_name), fields(dir = %certs_dir.display()))]
pub async fn collect(certs_dir: &Path, key: BundleKey, bundle_name: String) -> Result<Bundle> {
    let mut bundle = Bundle::new(key, bundle_name);

    for (artifact, requirement) in BUNDLE_ARTIFACTS {
        let name = artifact.file_name();
        let path = certs_dir.join(&name);
        let content = match (tokio::fs::read(&path).await, requirement) {
            (Ok(bytes), _) => bytes,
            (Err(e), Requirement::Required) if e.kind() == IoErrorKind::NotFound => {
                return Err(FabricError::MissingArtifact { name, path }.in_stage(Stage::Assemble));
            }
            (Err(e), Requirement::Required) => {
                return Err(FabricError::io(&path, e).in_stage(Stage::Assemble));
            }
            (Err(e), Requirement::BestEffort) => {
                warn!(artifact = %name, error = %e, "optional artifact unreadable, storing empty");
                Vec::new()
            }
        };
        bundle.insert(name, content);
    }

    debug!(entries = bundle.len(), "assembled bundle");
    Ok(bundle)
}
