//! cluster-enroll - node agent that joins a cluster and provisions its TLS certificate
//!
//! An operator hands the node a one-time bootstrap key. The agent decodes the
//! cluster endpoint from it, generates a key pair and CSR, registers the node
//! with the cluster's enrollment API and polls until the cluster approves the
//! node and returns a signed certificate. The certificate is stored locally and
//! the served API is restarted with TLS enabled.
//!
//! # Architecture
//!
//! - A bootstrap key monitor reacts to key changes (new key, same key, cleared)
//! - A certificate poller fetches the node status with fixed-delay retries
//! - All progress is persisted, so a restart mid-enrollment resumes where it left off
//!
//! # Modules
//!
//! - [`agent`] - Key monitor, join requester, certificate poller
//! - [`bootstrap`] - Bootstrap key decoding
//! - [`cluster`] - HTTP client for the cluster enrollment API
//! - [`config`] - YAML agent configuration
//! - [`pki`] - Key pair and CSR generation
//! - [`retry`] - Detached retry scheduling
//! - [`state`] - Persisted enrollment state and local key material
//! - [`error`] - Error types for the agent

#![deny(missing_docs)]

pub mod agent;
pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod error;
pub mod pki;
pub mod retry;
pub mod state;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
