//! Agent configuration
//!
//! Loaded from a YAML file. Every field has a default so a minimal file only
//! needs the local API account list and, optionally, a bootstrap key.
//!
//! ```yaml
//! server:
//!   host: 10.0.0.5
//!   port: 5555
//!   api_base_path: /v2
//! cluster:
//!   node_name: edge-1
//!   bootstrap_key: Y2x1c3Rlci5leGFtcGxlLmNvbTo5OTk5OmFwaS92Mzp4Onk=
//! storage:
//!   state_file: /var/lib/cluster-enroll/state.json
//!   data_dir: /var/lib/cluster-enroll/tls
//! users:
//!   - name: cluster
//!     password: s3cret
//!     insecure: true
//! restart_command: ["systemctl", "reload", "dataplaneapi"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::TransportSettings;
use crate::{Error, Result};

/// Top-level agent configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// This node's own API, reported to the cluster
    pub server: ServerConfig,
    /// Cluster enrollment settings
    pub cluster: ClusterConfig,
    /// Where state and key material are kept
    pub storage: StorageConfig,
    /// Accounts on this node's API; the one marked `insecure` is offered to the cluster
    pub users: Vec<ApiUser>,
    /// Command run after a new certificate is stored (empty: log only)
    pub restart_command: Vec<String>,
}

/// This node's own API endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the cluster should use to reach this node
    pub host: String,
    /// Port the cluster should use to reach this node
    pub port: u16,
    /// Base path of this node's API
    pub api_base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5555,
            api_base_path: "/v2".to_string(),
        }
    }
}

/// Cluster enrollment settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Bootstrap key; `Some("")` clears enrollment, `None` leaves stored state alone
    pub bootstrap_key: Option<String>,
    /// Display name reported to the cluster
    pub node_name: String,
    /// Scheme for the cluster endpoint (the bootstrap key cannot carry one)
    pub scheme: String,
    /// Delay before a failed or pending certificate poll is retried
    pub poll_interval_secs: u64,
    /// Timeout per request to the cluster
    pub request_timeout_secs: u64,
    /// Idle connections kept per cluster host
    pub max_idle_per_host: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bootstrap_key: None,
            node_name: String::new(),
            scheme: "https".to_string(),
            poll_interval_secs: 60,
            request_timeout_secs: 10,
            max_idle_per_host: 20,
        }
    }
}

/// Local storage locations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the enrollment state
    pub state_file: PathBuf,
    /// Directory for the private key, CSR and certificate
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("enrollment.json"),
            data_dir: PathBuf::from("."),
        }
    }
}

/// Account on this node's API
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUser {
    /// User name
    pub name: String,
    /// Password (plain text or crypted, passed through as configured)
    pub password: String,
    /// Whether the password is stored unencrypted and can be handed to the cluster
    #[serde(default)]
    pub insecure: bool,
}

impl std::fmt::Debug for ApiUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiUser")
            .field("name", &self.name)
            .field("insecure", &self.insecure)
            .finish_non_exhaustive()
    }
}

impl AgentConfig {
    /// Parse a YAML configuration document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::configuration(format!("failed to parse config: {}", e)))
    }

    /// Read and parse a YAML configuration file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// Check values that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.cluster.scheme.as_str(), "http" | "https") {
            return Err(Error::configuration(format!(
                "cluster.scheme must be http or https, got {:?}",
                self.cluster.scheme
            )));
        }
        if self.cluster.poll_interval_secs == 0 {
            return Err(Error::configuration(
                "cluster.poll_interval_secs must be greater than zero",
            ));
        }
        if self.cluster.request_timeout_secs == 0 {
            return Err(Error::configuration(
                "cluster.request_timeout_secs must be greater than zero",
            ));
        }
        if self.server.host.is_empty() {
            return Err(Error::configuration("server.host must not be empty"));
        }
        Ok(())
    }

    /// Transport settings for the cluster client
    pub fn transport(&self) -> TransportSettings {
        TransportSettings {
            scheme: self.cluster.scheme.clone(),
            request_timeout: Duration::from_secs(self.cluster.request_timeout_secs),
            max_idle_per_host: self.cluster.max_idle_per_host,
        }
    }

    /// Delay between certificate poll retries
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.cluster.poll_interval_secs)
    }
}
