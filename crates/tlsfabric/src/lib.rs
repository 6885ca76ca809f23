//! # tlsfabric
//!
//! Provisions the mutually-authenticated TLS trust fabric of a clustered
//! service: a CA, leaf certificates for a fixed set of identities, the
//! PKCS8/PKCS12/JKS encodings their consumers need, and one bundle of all of
//! it per cluster.
//!
//! ## Pipeline
//!
//! ```text
//! workspace::prepare(config_dir)
//!   -> descriptors::generate        ca-config.json, ca-csr.json, req-*-csr.json
//!   -> CertAuthority::issue_ca      cfssl gencert -initca | cfssljson -bare ca
//!   -> CertAuthority::issue_leaves  cfssl gencert -ca ... | cfssljson -bare <id>
//!   -> FormatConverter::convert_all openssl pkcs8/pkcs12, keytool
//!   -> StagedCerts::commit
//!   -> bundle::collect              -> BundleStore::create
//! ```
//!
//! The signer, converter and keystore tool are traits ([`tools::Signer`],
//! [`tools::Converter`], [`tools::KeystoreTool`]); the default
//! implementations run the external binaries through [`PipelineRunner`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use tlsfabric::{FabricConfig, MemoryBundleStore, Provisioner};
//!
//! let config = FabricConfig::load("tlsfabric.toml".as_ref())?;
//! let provisioner = Provisioner::with_process_tools(config)?;
//! let store = MemoryBundleStore::new();
//! provisioner.ensure_bundle(&store, "logging", "prod").await?;
//! ```

pub mod authority;
pub mod bundle;
pub mod config;
pub mod convert;
pub mod descriptors;
pub mod pipeline;
pub mod provision;
pub mod store;
pub mod tools;
pub mod workspace;

pub use authority::CertAuthority;
pub use config::FabricConfig;
pub use convert::{ConversionPlan, FormatConverter};
pub use pipeline::{ExternalCommand, PipelineRunner};
pub use provision::Provisioner;
pub use store::{BundleStore, MemoryBundleStore};

pub use tlsfabric_core::{
    ArtifactName, Bundle, BundleKey, ErrorKind, FabricError, Identity, KeystorePassword, Result,
    Stage,
};
