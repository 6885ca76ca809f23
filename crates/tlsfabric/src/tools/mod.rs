//! Capabilities the pipeline depends on: signing, key/archive conversion and
//! Java keystore management.
//!
//! Production wires the process-backed implementations (`cfssl`/`cfssljson`,
//! `openssl`, `keytool`); tests substitute in-process stand-ins. Every
//! implementation reads and writes files at the paths it is given, and
//! returns the tool's captured output for diagnostics.

mod cfssl;
mod keytool;
mod openssl;

pub use cfssl::CfsslSigner;
pub use keytool::KeytoolKeystore;
pub use openssl::OpensslConverter;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use tlsfabric_core::{Identity, KeystorePassword, Result};

/// Profile leaf certificates are signed under.
pub const SERVER_PROFILE: &str = "server";

/// Alias `keytool` assigns to the single unnamed entry of a PKCS12 export.
pub const PKCS12_SRC_ALIAS: &str = "1";

/// Output files for a signed pair: `<prefix>.pem` and `<prefix>-key.pem`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPrefix(PathBuf);

impl OutputPrefix {
    /// Prefix for `identity` inside `certs_dir`.
    #[must_use]
    pub fn new(certs_dir: &Path, identity: Identity) -> Self {
        Self(certs_dir.join(identity.file_stem()))
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    #[must_use]
    pub fn cert_path(&self) -> PathBuf {
        self.with_suffix(".pem")
    }

    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        self.with_suffix("-key.pem")
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.0.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Self-sign the CA from its CSR descriptor.
#[derive(Debug, Clone)]
pub struct CaRequest<'a> {
    pub csr: &'a Path,
    pub out: OutputPrefix,
}

/// Sign a leaf CSR descriptor against the CA.
#[derive(Debug, Clone)]
pub struct LeafRequest<'a> {
    pub identity: Identity,
    pub csr: &'a Path,
    /// `ca-config.json`
    pub policy: &'a Path,
    pub profile: &'a str,
    pub ca_cert: &'a Path,
    pub ca_key: &'a Path,
    pub out: OutputPrefix,
}

#[derive(Debug, Clone)]
pub struct Pkcs8Request<'a> {
    pub key: &'a Path,
    pub out: &'a Path,
}

#[derive(Debug, Clone)]
pub struct Pkcs12Request<'a> {
    pub cert: &'a Path,
    pub key: &'a Path,
    pub ca_cert: &'a Path,
    pub out: &'a Path,
    pub password: &'a KeystorePassword,
}

/// Import a certificate into a (new) keystore as a trusted entry.
#[derive(Debug, Clone)]
pub struct TrustStoreRequest<'a> {
    pub ca_cert: &'a Path,
    pub alias: &'a str,
    pub out: &'a Path,
    pub password: &'a KeystorePassword,
}

/// Move a PKCS12 entry into a (new) Java keystore under a new alias.
#[derive(Debug, Clone)]
pub struct KeyStoreRequest<'a> {
    pub pkcs12: &'a Path,
    pub src_alias: &'a str,
    pub dest_alias: &'a str,
    pub out: &'a Path,
    pub password: &'a KeystorePassword,
}

/// Certificate signer.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Write `<prefix>.pem` and `<prefix>-key.pem` for a self-signed CA.
    async fn issue_ca(&self, request: &CaRequest<'_>) -> Result<String>;

    /// Write `<prefix>.pem` and `<prefix>-key.pem` for a CA-signed leaf.
    async fn issue_leaf(&self, request: &LeafRequest<'_>) -> Result<String>;
}

/// Private key and archive conversion.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Unencrypted PKCS8 re-encoding of a PEM private key.
    async fn pkcs8(&self, request: &Pkcs8Request<'_>) -> Result<String>;

    /// Password-protected PKCS12 archive of cert, key and CA cert.
    async fn pkcs12(&self, request: &Pkcs12Request<'_>) -> Result<String>;
}

/// Java keystore management.
#[async_trait]
pub trait KeystoreTool: Send + Sync {
    async fn import_trusted(&self, request: &TrustStoreRequest<'_>) -> Result<String>;

    async fn import_keystore(&self, request: &KeyStoreRequest<'_>) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_prefix_paths() {
        let prefix = OutputPrefix::new(Path::new("/certs"), Identity::Admin);
        assert_eq!(prefix.as_path(), Path::new("/certs/sgadmin"));
        assert_eq!(prefix.cert_path(), Path::new("/certs/sgadmin.pem"));
        assert_eq!(prefix.key_path(), Path::new("/certs/sgadmin-key.pem"));
    }
}
