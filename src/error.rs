//! Error types for the enrollment agent

use thiserror::Error;

use crate::bootstrap::KeyError;
use crate::cluster::ClusterError;
use crate::pki::PkiError;
use crate::state::StoreError;

/// Main error type for enrollment operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bootstrap key could not be decoded
    #[error("malformed bootstrap key: {0}")]
    MalformedKey(#[from] KeyError),

    /// Local configuration does not allow the operation
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Request to the cluster enrollment endpoint failed
    #[error("cluster request failed: {0}")]
    Cluster(#[from] ClusterError),

    /// Enrollment state could not be loaded or saved
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Key pair or CSR generation failed
    #[error("PKI error: {0}")]
    Pki(#[from] PkiError),

    /// Local key, CSR or certificate file could not be written
    #[error("artifact error: {0}")]
    Artifact(#[from] std::io::Error),

    /// Service restart failed
    #[error("restart failed: {0}")]
    Restart(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a restart error with the given message
    pub fn restart(msg: impl Into<String>) -> Self {
        Self::Restart(msg.into())
    }

    /// Short machine-readable error kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedKey(_) => "malformed_key",
            Error::Configuration(_) => "configuration",
            Error::Cluster(ClusterError::Transport(_)) => "transport",
            Error::Cluster(_) => "protocol",
            Error::Persistence(_) => "persistence",
            Error::Pki(_) => "crypto",
            Error::Artifact(_) => "artifact",
            Error::Restart(_) => "restart",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Categories During Enrollment
    // ==========================================================================

    /// Story: A bad bootstrap key is reported as malformed, not as a transport issue
    ///
    /// Operators paste bootstrap keys by hand. A typo must produce an error that
    /// clearly points at the key rather than at the network.
    #[test]
    fn story_malformed_key_is_categorized() {
        let err = Error::from(KeyError::UnrecognizedFormat { fields: 3 });
        assert!(err.to_string().contains("malformed bootstrap key"));
        assert!(err.to_string().contains("3"));
        assert_eq!(err.kind(), "malformed_key");
    }

    /// Story: Missing service account aborts the join with a configuration error
    #[test]
    fn story_configuration_errors() {
        let err = Error::configuration("no insecure user available for cluster communication");
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("insecure user"));
        assert_eq!(err.kind(), "configuration");

        match Error::configuration("any message") {
            Error::Configuration(msg) => assert_eq!(msg, "any message"),
            _ => panic!("Expected Configuration variant"),
        }
    }

    /// Story: Cluster failures split into transport and protocol kinds
    ///
    /// Transport errors mean the cluster was unreachable; protocol errors mean
    /// it answered with something we could not accept.
    #[test]
    fn story_cluster_errors_split_by_kind() {
        let err = Error::from(ClusterError::Transport("connection refused".to_string()));
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("connection refused"));

        let err = Error::from(ClusterError::UnexpectedStatus {
            status: 403,
            body: "bootstrap key already used".to_string(),
        });
        assert_eq!(err.kind(), "protocol");
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("already used"));

        let err = Error::from(ClusterError::InvalidResponse("expected value".to_string()));
        assert_eq!(err.kind(), "protocol");
    }

    /// Story: Persistence and artifact failures keep their source message
    #[test]
    fn story_local_io_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
        let err = Error::from(StoreError::Io(io));
        assert_eq!(err.kind(), "persistence");
        assert!(err.to_string().contains("read-only fs"));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = Error::from(io);
        assert_eq!(err.kind(), "artifact");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn restart_error_display() {
        let err = Error::restart("exit status 1");
        assert_eq!(err.to_string(), "restart failed: exit status 1");
        assert_eq!(err.kind(), "restart");
    }
}
