//! Provisioning configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use tlsfabric_core::{DistinguishedName, FabricError, KeystorePassword, Result, SigningPolicy};

/// Environment variable consulted when no password is configured.
pub const PASSWORD_ENV: &str = "TLSFABRIC_KEYSTORE_PASSWORD";

/// Configuration for a provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Directory for the JSON descriptors (cleaned every run).
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Directory holding the committed certificate artifacts.
    #[serde(default = "default_certs_dir")]
    pub certs_dir: PathBuf,

    /// Service the CA hosts and keystore aliases are named after.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Bundle object name prefix (`<prefix>-<cluster>`).
    #[serde(default = "default_bundle_prefix")]
    pub bundle_prefix: String,

    /// Subject of the CA certificate.
    #[serde(default = "default_ca_subject")]
    pub ca_subject: DistinguishedName,

    /// Subject shared by every leaf certificate.
    #[serde(default = "default_leaf_subject")]
    pub leaf_subject: DistinguishedName,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Deadline for each external invocation (seconds).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// PKCS12/keystore password. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub keystore_password: Option<KeystorePassword>,
}

/// Signing policy as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default = "default_usages")]
    pub usages: Vec<String>,

    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u64,
}

/// Programs invoked for signing and conversion (name on `PATH` or absolute path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_cfssl")]
    pub cfssl: String,
    #[serde(default = "default_cfssljson")]
    pub cfssljson: String,
    #[serde(default = "default_openssl")]
    pub openssl: String,
    #[serde(default = "default_keytool")]
    pub keytool: String,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            certs_dir: default_certs_dir(),
            service_name: default_service_name(),
            bundle_prefix: default_bundle_prefix(),
            ca_subject: default_ca_subject(),
            leaf_subject: default_leaf_subject(),
            signing: SigningConfig::default(),
            tools: ToolsConfig::default(),
            command_timeout_secs: default_command_timeout(),
            keystore_password: None,
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            usages: default_usages(),
            expiry_hours: default_expiry_hours(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            cfssl: default_cfssl(),
            cfssljson: default_cfssljson(),
            openssl: default_openssl(),
            keytool: default_keytool(),
        }
    }
}

impl FabricConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| FabricError::io(path, e))?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| FabricError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Same config rooted at different working directories.
    #[must_use]
    pub fn with_dirs(mut self, config_dir: impl Into<PathBuf>, certs_dir: impl Into<PathBuf>) -> Self {
        self.config_dir = config_dir.into();
        self.certs_dir = certs_dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(FabricError::Config("service_name must not be empty".into()));
        }
        if self.bundle_prefix.trim().is_empty() {
            return Err(FabricError::Config("bundle_prefix must not be empty".into()));
        }
        if self.command_timeout_secs == 0 {
            return Err(FabricError::Config(
                "command_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.signing.expiry_hours == 0 {
            return Err(FabricError::Config("signing.expiry_hours must be greater than zero".into()));
        }
        if self.signing.expiry_hours > SigningPolicy::MAX_EXPIRY_HOURS {
            return Err(FabricError::Config(format!(
                "signing.expiry_hours must be at most {}",
                SigningPolicy::MAX_EXPIRY_HOURS
            )));
        }
        for (field, dir) in [("config_dir", &self.config_dir), ("certs_dir", &self.certs_dir)] {
            if !dir.is_absolute() {
                return Err(FabricError::Config(format!(
                    "{field} must be an absolute path, got {}",
                    dir.display()
                )));
            }
        }
        if self.config_dir == self.certs_dir {
            return Err(FabricError::Config(
                "config_dir and certs_dir must be different directories".into(),
            ));
        }
        if matches!(&self.keystore_password, Some(p) if p.is_empty()) {
            return Err(FabricError::Config("keystore_password must not be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn signing_policy(&self) -> SigningPolicy {
        SigningPolicy::new(self.signing.usages.iter().cloned(), self.signing.expiry_hours)
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Resolve the keystore password: config, then `TLSFABRIC_KEYSTORE_PASSWORD`,
    /// then the development default.
    #[must_use]
    pub fn keystore_password(&self) -> KeystorePassword {
        if let Some(password) = &self.keystore_password {
            return password.clone();
        }
        if let Ok(value) = std::env::var(PASSWORD_ENV) {
            if !value.is_empty() {
                return KeystorePassword::new(value);
            }
        }
        warn!(
            env = PASSWORD_ENV,
            "no keystore password configured, using the development default"
        );
        KeystorePassword::dev_default()
    }

    /// Alias of the CA entry in the trust store.
    #[must_use]
    pub fn trust_alias(&self) -> &'static str {
        "root-ca"
    }

    /// Alias of the node key entry in `node-keystore.jks`.
    #[must_use]
    pub fn node_alias(&self) -> String {
        format!("{}-node", self.service_name)
    }

    /// Alias of the admin key entry in `sgadmin-keystore.jks`.
    #[must_use]
    pub fn admin_alias(&self) -> String {
        format!("{}-admin", self.service_name)
    }
}

// Default value functions for serde.
fn default_config_dir() -> PathBuf {
    PathBuf::from("/tmp/tlsfabric/config")
}

fn default_certs_dir() -> PathBuf {
    PathBuf::from("/tmp/tlsfabric/certs")
}

fn default_service_name() -> String {
    String::from("elasticsearch")
}

fn default_bundle_prefix() -> String {
    String::from("es-certs")
}

fn default_ca_subject() -> DistinguishedName {
    DistinguishedName {
        organization: "cert-operator".into(),
        organizational_unit: "k8s".into(),
        locality: "Pittsburgh".into(),
        country: "US".into(),
        state: "Pennsylvania".into(),
    }
}

fn default_leaf_subject() -> DistinguishedName {
    DistinguishedName {
        organization: "autogenerated".into(),
        organizational_unit: "elasticsearch cluster".into(),
        locality: "operator".into(),
        ..DistinguishedName::default()
    }
}

fn default_usages() -> Vec<String> {
    SigningPolicy::DEFAULT_USAGES
        .iter()
        .map(ToString::to_string)
        .collect()
}

const fn default_expiry_hours() -> u64 {
    SigningPolicy::DEFAULT_EXPIRY_HOURS
}

const fn default_command_timeout() -> u64 {
    120
}

fn default_cfssl() -> String {
    String::from("cfssl")
}

fn default_cfssljson() -> String {
    String::from("cfssljson")
}

fn default_openssl() -> String {
    String::from("openssl")
}

fn default_keytool() -> String {
    String::from("keytool")
}
