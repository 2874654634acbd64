//! Error types for testclusters

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while creating, probing, querying or tearing
/// down a test cluster.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The composed cluster name prefix does not match the container name grammar.
    /// Raised before any external resource is touched.
    #[error("total cluster name prefix '{prefix}' looks invalid (valid pattern: {pattern})")]
    InvalidName {
        prefix: String,
        pattern: &'static str,
    },

    /// The provisioning engine failed
    #[error("provisioning failed during {step}: {message}")]
    Provisioning { step: &'static str, message: String },

    /// The provisioning engine could not bind the exposed API port
    #[error(
        "port {port} is already allocated; was another test cluster not cleaned up? \
         Remove leaked clusters with `k3d cluster delete <name>`: {message}"
    )]
    PortAlreadyAllocated { port: u16, message: String },

    /// Credentials could not be fetched from the provisioned cluster
    #[error("failed to retrieve credentials for cluster {cluster}: {message}")]
    CredentialRetrieval { cluster: String, message: String },

    /// An API client could not be built from the credentials
    #[error("failed to initialize API client: {0}")]
    ClientInit(String),

    /// Creating one of the RBAC bootstrap objects failed
    #[error("failed to bootstrap access control ({step}): {source}")]
    AccessBootstrap {
        step: &'static str,
        #[source]
        source: kube::Error,
    },

    /// The readiness retry budget ran out
    #[error("waited too long for {what} after {attempts} attempts: {source}")]
    ReadinessTimeout {
        what: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A node reports a condition that makes it unusable
    #[error("node is not healthy: condition list for {node} indicates a problem: {conditions}")]
    NodeUnhealthy { node: String, conditions: String },

    /// A node reports a condition kind the health check does not know
    #[error("unsupported node condition {kind} on node {node}")]
    UnsupportedCondition { node: String, kind: String },

    /// Node information could not be gathered
    #[error("could not retrieve node info: {0}")]
    NodeInfo(String),

    /// Tearing the cluster down failed
    #[error("failed to terminate cluster {cluster}: {message}")]
    Termination { cluster: String, message: String },

    /// A list query returned a different number of items than expected
    #[error("expected {expected} {kind} but found {actual}")]
    CountMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A manifest could not be applied
    #[error("failed to apply manifest: {0}")]
    Manifest(String),

    /// Invalid argument handed to a helper
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubeconfig handling error
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// Configuration loading error
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// YAML (de)serialization error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a provisioning error for the given step
    pub fn provisioning(step: &'static str, message: impl Into<String>) -> Self {
        Self::Provisioning {
            step,
            message: message.into(),
        }
    }

    /// Create a termination error for the given cluster
    pub fn termination(cluster: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Termination {
            cluster: cluster.into(),
            message: message.into(),
        }
    }

    /// Create a manifest error with the given message
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// True for errors raised before anything was provisioned
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::InvalidName { .. } | Self::InvalidArgument(_))
    }
}
