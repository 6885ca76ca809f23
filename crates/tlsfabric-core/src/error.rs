use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::Identity;

/// Result type alias for tlsfabric operations
pub type Result<T> = std::result::Result<T, FabricError>;

/// Errors that can occur while provisioning the trust fabric
#[derive(Error, Debug)]
pub enum FabricError {
    /// Filesystem operation failed
    #[error("io error at {}: {source}", path.display())]
    Io {
        /// Path being opened, read, written or removed
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Descriptor could not be encoded
    #[error("failed to encode {file}: {source}")]
    Json {
        /// Descriptor filename
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration is invalid or could not be parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// External process could not be started
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        /// Rendered command line
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// External process exited unsuccessfully
    #[error("`{command}` exited with {status}: {diagnostics}")]
    ProcessFailed {
        /// Rendered command line
        command: String,
        /// Exit status as reported by the OS
        status: String,
        /// Captured stderr/stdout
        diagnostics: String,
    },

    /// External process did not finish before its deadline
    #[error("`{command}` timed out after {after:?}")]
    Timeout {
        /// Rendered command line
        command: String,
        /// Deadline that elapsed
        after: Duration,
    },

    /// Tool reported success but its output file is not there
    #[error("expected output {} was not produced: {diagnostics}", path.display())]
    MissingOutput {
        /// Output file the tool should have written
        path: PathBuf,
        /// Captured stderr/stdout
        diagnostics: String,
    },

    /// A pipeline was run with no commands
    #[error("pipeline has no commands")]
    EmptyPipeline,

    /// Required artifact absent during bundle assembly
    #[error("required artifact {name} missing at {}", path.display())]
    MissingArtifact {
        /// Logical artifact name
        name: String,
        /// Where it was expected
        path: PathBuf,
    },

    /// Bundle already exists in the store
    #[error("bundle {name} already exists in namespace {namespace}")]
    BundleExists {
        /// Namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// Bundle not found in the store
    #[error("bundle {name} not found in namespace {namespace}")]
    BundleNotFound {
        /// Namespace
        namespace: String,
        /// Object or cluster name
        name: String,
    },

    /// Store backend failure
    #[error("store error: {0}")]
    Store(String),

    /// Error raised inside a named pipeline stage
    #[error("{stage}: {source}")]
    Stage {
        /// Stage that failed
        stage: Stage,
        #[source]
        source: Box<FabricError>,
    },
}

/// Coarse error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Directory open/create/read/write/remove failures
    Filesystem,
    /// Descriptor encoding failures
    Serialization,
    /// Invalid configuration or caller input
    Configuration,
    /// Non-zero exit, unreadable output, start failure
    Process,
    /// External process exceeded its deadline
    Timeout,
    /// Required artifact absent during assembly
    MissingArtifact,
    /// Persistence boundary
    Store,
}

/// Pipeline step an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Clearing a working directory
    Clean,
    /// Writing the policy and CSR descriptors
    Configure,
    /// Self-signing the CA
    IssueCa,
    /// Signing a leaf against the CA
    IssueLeaf(Identity),
    /// PKCS8 re-encoding of a private key
    Pkcs8(Identity),
    /// PKCS12 export
    Pkcs12(Identity),
    /// CA import into the trust store
    TrustStore,
    /// PKCS12 import into a per-identity keystore
    KeyStore(Identity),
    /// Staging certs or promoting them into place
    Commit,
    /// Reading artifacts into a bundle
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Configure => write!(f, "configure"),
            Self::IssueCa => write!(f, "issue ca"),
            Self::IssueLeaf(id) => write!(f, "issue {id}"),
            Self::Pkcs8(id) => write!(f, "pkcs8 {id}"),
            Self::Pkcs12(id) => write!(f, "pkcs12 {id}"),
            Self::TrustStore => write!(f, "truststore"),
            Self::KeyStore(id) => write!(f, "keystore {id}"),
            Self::Commit => write!(f, "commit"),
            Self::Assemble => write!(f, "assemble"),
        }
    }
}

impl FabricError {
    /// Create an IO error for a specific path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attribute this error to a stage. Already-attributed errors keep
    /// their innermost stage.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage this error is attributed to, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Classify the error, looking through stage attribution.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Filesystem,
            Self::Json { .. } => ErrorKind::Serialization,
            Self::Config(_) => ErrorKind::Configuration,
            Self::Spawn { .. }
            | Self::ProcessFailed { .. }
            | Self::MissingOutput { .. }
            | Self::EmptyPipeline => ErrorKind::Process,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::MissingArtifact { .. } => ErrorKind::MissingArtifact,
            Self::BundleExists { .. } | Self::BundleNotFound { .. } | Self::Store(_) => {
                ErrorKind::Store
            }
            Self::Stage { source, .. } => source.kind(),
        }
    }

    /// Captured process output, when the error carries any.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ProcessFailed { diagnostics, .. } | Self::MissingOutput { diagnostics, .. } => {
                Some(diagnostics)
            }
            Self::Stage { source, .. } => source.diagnostics(),
            _ => None,
        }
    }
}

/// Attach a stage to the error side of a result.
pub trait StageExt<T> {
    /// See [`FabricError::in_stage`].
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.in_stage(stage))
    }
}
