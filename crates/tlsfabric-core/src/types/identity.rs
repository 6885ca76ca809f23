//! The fixed set of identities the trust fabric certifies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A certified identity. The set is closed: every identity maps to exactly
/// one CSR descriptor and one signed certificate/key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identity {
    /// The self-signed certificate authority
    #[serde(rename = "ca")]
    Ca,
    /// Cluster data node
    #[serde(rename = "node")]
    Node,
    /// Administrative client (security plugin admin tool)
    #[serde(rename = "sgadmin")]
    Admin,
    /// User-facing UI
    #[serde(rename = "kibana")]
    Ui,
    /// Dashboard proxy in front of the cluster API
    #[serde(rename = "cerebro")]
    DashboardProxy,
}

impl Identity {
    /// Every identity, CA first.
    pub const ALL: [Self; 5] = [
        Self::Ca,
        Self::Node,
        Self::Admin,
        Self::Ui,
        Self::DashboardProxy,
    ];

    /// Leaf identities in issuance order.
    pub const LEAVES: [Self; 4] = [Self::Node, Self::Ui, Self::DashboardProxy, Self::Admin];

    /// File stem used for every artifact of this identity (`node` -> `node.pem`).
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::Ca => "ca",
            Self::Node => "node",
            Self::Admin => "sgadmin",
            Self::Ui => "kibana",
            Self::DashboardProxy => "cerebro",
        }
    }

    /// Well-known CSR descriptor filename in the config directory.
    #[must_use]
    pub const fn csr_file(self) -> &'static str {
        match self {
            Self::Ca => "ca-csr.json",
            Self::Node => "req-node-csr.json",
            Self::Admin => "req-sgadmin-csr.json",
            Self::Ui => "req-kibana-csr.json",
            Self::DashboardProxy => "req-cerebro-csr.json",
        }
    }

    /// Whether this identity is signed by the CA (everything but the CA).
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        !matches!(self, Self::Ca)
    }

    /// Whether this identity gets PKCS12 and Java keystore forms.
    ///
    /// Only the node and admin identities are consumed by the JVM; the UI
    /// and dashboard proxy only need PEM material.
    #[must_use]
    pub const fn needs_keystore(self) -> bool {
        matches!(self, Self::Node | Self::Admin)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

impl FromStr for Identity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ca" => Ok(Self::Ca),
            "node" => Ok(Self::Node),
            "sgadmin" | "admin" => Ok(Self::Admin),
            "kibana" | "ui" => Ok(Self::Ui),
            "cerebro" | "dashboard-proxy" => Ok(Self::DashboardProxy),
            other => Err(format!("unknown identity: {other}")),
        }
    }
}
