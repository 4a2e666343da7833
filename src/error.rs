//! Custom error types for kblast.

use thiserror::Error;

/// Errors that abort a drain detection run.
#[derive(Error, Debug)]
pub enum KblastError {
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(String),

    #[error("Failed to {what}: {source}")]
    PrimaryQuery {
        what: String,
        #[source]
        source: AccessError,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(String),
}

impl KblastError {
    /// Wrap a failed mandatory query.
    pub fn primary(what: impl Into<String>, source: AccessError) -> Self {
        KblastError::PrimaryQuery {
            what: what.into(),
            source,
        }
    }
}

/// Errors returned by a cluster accessor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Cannot reach or authenticate to the cluster: {0}")]
    Connection(String),

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("Kubernetes API error: {0}")]
    Api(String),
}

impl AccessError {
    pub fn not_found(kind: &'static str, namespace: &str, name: &str) -> Self {
        AccessError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Malformed resource quantity text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity '{0}'")]
    Invalid(String),

    #[error("unknown suffix '{suffix}' in quantity '{input}'")]
    UnknownSuffix { input: String, suffix: String },

    #[error("quantity '{0}' is out of range")]
    OutOfRange(String),
}

/// Malformed pod CIDR.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CidrError {
    #[error("no pod CIDR assigned")]
    Missing,

    #[error("invalid CIDR '{0}'")]
    Invalid(String),

    #[error("IPv6 CIDR '{0}' is not supported")]
    Ipv6(String),
}

/// Label selector that cannot be expressed as an exact-match query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector is not set")]
    Missing,

    #[error("matchExpressions are not supported ({0} requirement(s))")]
    Unsupported(usize),

    #[error("malformed label '{0}'")]
    Malformed(String),
}
