//! Signing policy and CSR descriptors, serialized in the JSON shape the
//! cfssl family of tools consumes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::identity::Identity;

const SECS_PER_HOUR: u64 = 3600;

/// Signing policy applied uniformly to every leaf issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningPolicy {
    /// Key usages (`signing`, `server auth`, ...)
    pub usages: Vec<String>,
    /// Certificate lifetime
    pub expiry: Duration,
}

impl SigningPolicy {
    /// Usages granted to every leaf certificate.
    pub const DEFAULT_USAGES: [&'static str; 4] =
        ["signing", "key encipherment", "server auth", "client auth"];

    /// One year.
    pub const DEFAULT_EXPIRY_HOURS: u64 = 8760;

    /// Longest accepted lifetime: one hundred years.
    pub const MAX_EXPIRY_HOURS: u64 = 100 * Self::DEFAULT_EXPIRY_HOURS;

    /// Build a policy. `expiry_hours` is clamped to [`Self::MAX_EXPIRY_HOURS`].
    pub fn new(usages: impl IntoIterator<Item = impl Into<String>>, expiry_hours: u64) -> Self {
        let hours = expiry_hours.min(Self::MAX_EXPIRY_HOURS);
        Self {
            usages: usages.into_iter().map(Into::into).collect(),
            expiry: Duration::from_secs(hours * SECS_PER_HOUR),
        }
    }

    /// Expiry in the Go duration syntax cfssl expects (`8760h`).
    #[must_use]
    pub fn expiry_string(&self) -> String {
        format!("{}h", self.expiry.as_secs() / SECS_PER_HOUR)
    }

    /// Wire form written to `ca-config.json`.
    #[must_use]
    pub fn to_document(&self) -> CaConfigDocument {
        CaConfigDocument {
            signing: SigningSection {
                default: SigningProfile {
                    usages: self.usages.clone(),
                    expiry: self.expiry_string(),
                },
            },
        }
    }
}

impl Default for SigningPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_USAGES, Self::DEFAULT_EXPIRY_HOURS)
    }
}

/// `ca-config.json` document: `{"signing":{"default":{"usages":[..],"expiry":".."}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaConfigDocument {
    pub signing: SigningSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSection {
    pub default: SigningProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningProfile {
    pub usages: Vec<String>,
    pub expiry: String,
}

/// Key algorithm and size. Fixed to RSA/2048 for every descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub algo: String,
    pub size: u32,
}

impl Default for KeySpec {
    fn default() -> Self {
        Self {
            algo: "rsa".to_string(),
            size: 2048,
        }
    }
}

/// Subject name attributes. Empty attributes are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    #[serde(rename = "O", default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    #[serde(rename = "OU", default, skip_serializing_if = "String::is_empty")]
    pub organizational_unit: String,
    #[serde(rename = "L", default, skip_serializing_if = "String::is_empty")]
    pub locality: String,
    #[serde(rename = "C", default, skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(rename = "ST", default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

/// A certificate signing request descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrDescriptor {
    /// Common name; absent for the CA
    #[serde(rename = "CN", default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    /// DNS names the certificate is valid for, in order
    pub hosts: Vec<String>,
    pub key: KeySpec,
    /// cfssl takes a list; exactly one entry is ever written
    pub names: Vec<DistinguishedName>,
}

impl CsrDescriptor {
    /// Descriptor for the CA: no common name, hosts cover the service's
    /// canonical DNS names.
    pub fn ca(
        service_name: &str,
        namespace: &str,
        cluster_name: &str,
        subject: DistinguishedName,
    ) -> Self {
        Self {
            common_name: None,
            hosts: service_hosts(service_name, namespace, cluster_name),
            key: KeySpec::default(),
            names: vec![subject],
        }
    }

    /// Descriptor for a leaf identity: CN is the identity name, hosts are
    /// derived from it.
    pub fn leaf(
        identity: Identity,
        namespace: &str,
        cluster_name: &str,
        subject: DistinguishedName,
    ) -> Self {
        let name = identity.file_stem();
        Self {
            common_name: Some(name.to_string()),
            hosts: service_hosts(name, namespace, cluster_name),
            key: KeySpec::default(),
            names: vec![subject],
        }
    }

    /// The single subject entry.
    #[must_use]
    pub fn distinguished_name(&self) -> Option<&DistinguishedName> {
        self.names.first()
    }
}

/// The four hostnames cluster DNS resolves for `<name>-<cluster>` in
/// `<namespace>`, in the order consumers expect.
#[must_use]
pub fn service_hosts(name: &str, namespace: &str, cluster_name: &str) -> Vec<String> {
    let service = format!("{name}-{cluster_name}");
    vec![
        "localhost".to_string(),
        service.clone(),
        format!("{service}.{namespace}"),
        format!("{service}.{namespace}.svc.cluster.local"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_hosts_cover_cluster_dns() {
        let csr = CsrDescriptor::leaf(
            Identity::Node,
            "logging",
            "prod",
            DistinguishedName::default(),
        );
        assert_eq!(
            csr.hosts,
            vec![
                "localhost",
                "node-prod",
                "node-prod.logging",
                "node-prod.logging.svc.cluster.local",
            ]
        );
        assert_eq!(csr.common_name.as_deref(), Some("node"));
        assert_eq!(csr.key, KeySpec::default());
    }

    #[test]
    fn ca_descriptor_omits_common_name() {
        let csr = CsrDescriptor::ca("elasticsearch", "logging", "prod", DistinguishedName::default());
        let json = serde_json::to_value(&csr).unwrap();
        assert!(json.get("CN").is_none());
        assert_eq!(json["hosts"][1], "elasticsearch-prod");
        assert_eq!(json["key"]["algo"], "rsa");
        assert_eq!(json["key"]["size"], 2048);
    }

    #[test]
    fn empty_name_attributes_are_omitted() {
        let dn = DistinguishedName {
            organization: "autogenerated".into(),
            locality: "operator".into(),
            ..DistinguishedName::default()
        };
        let json = serde_json::to_string(&dn).unwrap();
        assert_eq!(json, r#"{"O":"autogenerated","L":"operator"}"#);
    }

    #[test]
    fn policy_document_shape() {
        let doc = SigningPolicy::default().to_document();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["signing"]["default"]["expiry"], "8760h");
        assert_eq!(json["signing"]["default"]["usages"][3], "client auth");
    }

    #[test]
    fn oversized_expiry_is_clamped() {
        let policy = SigningPolicy::new(SigningPolicy::DEFAULT_USAGES, u64::MAX);
        assert_eq!(policy.expiry_string(), "876000h");
    }
}
