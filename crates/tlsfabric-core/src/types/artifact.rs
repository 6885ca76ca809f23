//! Artifacts written to the certs directory, identified by `(identity, encoding)`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::identity::Identity;

/// On-disk encoding of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// PEM certificate
    Certificate,
    /// PEM private key as emitted by the signer
    PrivateKey,
    /// Unencrypted PKCS8 private key
    Pkcs8,
    /// Password-protected PKCS12 archive (cert + key + CA)
    Pkcs12,
    /// Java keystore holding the identity's own key entry
    KeyStore,
    /// Java keystore holding only the CA certificate
    TrustStore,
}

/// A named artifact produced by one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactName {
    pub identity: Identity,
    pub encoding: Encoding,
}

impl ArtifactName {
    #[must_use]
    pub const fn new(identity: Identity, encoding: Encoding) -> Self {
        Self { identity, encoding }
    }

    #[must_use]
    pub const fn certificate(identity: Identity) -> Self {
        Self::new(identity, Encoding::Certificate)
    }

    #[must_use]
    pub const fn private_key(identity: Identity) -> Self {
        Self::new(identity, Encoding::PrivateKey)
    }

    /// The CA trust store. There is exactly one per run.
    #[must_use]
    pub const fn trust_store() -> Self {
        Self::new(Identity::Ca, Encoding::TrustStore)
    }

    /// Fixed filename of this artifact, also used as its key in a bundle.
    #[must_use]
    pub fn file_name(&self) -> String {
        let stem = self.identity.file_stem();
        match self.encoding {
            Encoding::Certificate => format!("{stem}.pem"),
            Encoding::PrivateKey => format!("{stem}-key.pem"),
            Encoding::Pkcs8 => format!("{stem}-key.pkcs8.pem"),
            Encoding::Pkcs12 => format!("{stem}.pkcs12"),
            Encoding::KeyStore => format!("{stem}-keystore.jks"),
            Encoding::TrustStore => "truststore.jks".to_string(),
        }
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}
