//! # tlsfabric-core
//!
//! Data model and error taxonomy shared by the tlsfabric provisioning
//! pipeline.
//!
//! A provisioning run produces one [`Bundle`] per `(namespace, cluster)`:
//!
//! ```text
//! Identity (ca, node, sgadmin, kibana, cerebro)
//!   -> CsrDescriptor + SigningPolicy   (JSON descriptors on disk)
//!   -> ArtifactName (identity, encoding) files in the certs directory
//!   -> Bundle { "node.pem" => bytes, "node-keystore.jks" => bytes, ... }
//! ```

pub mod error;
pub mod types;

pub use error::{ErrorKind, FabricError, Result, Stage, StageExt};
pub use types::*;
