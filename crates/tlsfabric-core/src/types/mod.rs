//! Types shared across the provisioning stages.

mod artifact;
mod bundle;
mod descriptor;
mod identity;
mod password;

pub use artifact::{ArtifactName, Encoding};
pub use bundle::{Bundle, BundleKey};
pub use descriptor::{
    service_hosts, CaConfigDocument, CsrDescriptor, DistinguishedName, KeySpec, SigningPolicy,
    SigningProfile, SigningSection,
};
pub use identity::Identity;
pub use password::KeystorePassword;
