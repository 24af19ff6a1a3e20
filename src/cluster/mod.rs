//! Cluster enrollment API client
//!
//! Two calls are made against the cluster before this node holds a
//! certificate:
//! - `POST {base}` with the node descriptor and CSR (join)
//! - `GET {base}/{node_id}` until the node is `active` (poll)
//!
//! There is no trust anchor yet, so the client skips server certificate
//! verification. The bootstrap key itself is the shared secret. Do not reuse
//! this client once enrollment has completed.

mod node;

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info};

use crate::bootstrap::ClusterLocation;

pub use node::{Node, NODE_TYPE_COMMUNITY, STATUS_ACTIVE, STATUS_WAITING_APPROVAL};

/// Header carrying the raw bootstrap key on the join request
pub const BOOTSTRAP_KEY_HEADER: &str = "X-Bootstrap-Key";

/// Header carrying the node token returned by the join request
pub const NODE_KEY_HEADER: &str = "X-Node-Key";

/// Cluster API errors
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Request could not be sent or the response could not be read
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// Cluster answered with an unexpected status code
    #[error("status code not proper [{status}] {body}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body, kept for diagnostics
        body: String,
    },

    /// Response body is not a valid node descriptor
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Transport settings for the enrollment client
#[derive(Clone, Debug)]
pub struct TransportSettings {
    /// URL scheme used for the cluster endpoint (`https` or `http`)
    pub scheme: String,
    /// Total timeout per request
    pub request_timeout: Duration,
    /// Idle connections kept per host
    pub max_idle_per_host: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            request_timeout: Duration::from_secs(10),
            max_idle_per_host: 20,
        }
    }
}

/// Result of an accepted join request
#[derive(Clone, Debug)]
pub struct JoinResponse {
    /// Node descriptor returned by the cluster
    pub node: Node,
    /// Token from the `X-Node-Key` header (empty if absent)
    pub token: String,
}

/// HTTP client for the cluster enrollment endpoint
#[derive(Clone, Debug)]
pub struct ClusterClient {
    http: reqwest::Client,
    scheme: String,
}

impl ClusterClient {
    /// Build a client with the given transport settings
    pub fn new(settings: &TransportSettings) -> Result<Self, ClusterError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .pool_max_idle_per_host(settings.max_idle_per_host)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ClusterError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            scheme: settings.scheme.clone(),
        })
    }

    /// URL scheme used for requests
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Register this node with the cluster
    ///
    /// Succeeds only on `201 Created` with a node descriptor body.
    pub async fn join(
        &self,
        location: &ClusterLocation,
        bootstrap_key: &str,
        node: &Node,
    ) -> Result<JoinResponse, ClusterError> {
        let url = location.join_url(&self.scheme);
        info!(url = %url, "Joining cluster");

        let response = self
            .http
            .post(&url)
            .header(BOOTSTRAP_KEY_HEADER, bootstrap_key)
            .json(node)
            .send()
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        let token = response
            .headers()
            .get(NODE_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let node = read_node(response, StatusCode::CREATED).await?;
        Ok(JoinResponse { node, token })
    }

    /// Fetch the current descriptor of an enrolled node
    ///
    /// Succeeds only on `200 OK` with a node descriptor body.
    pub async fn node_status(
        &self,
        location: &ClusterLocation,
        node_id: &str,
        token: &str,
    ) -> Result<Node, ClusterError> {
        let url = location.node_url(&self.scheme, node_id);
        debug!(url = %url, "Fetching node status");

        let response = self
            .http
            .get(&url)
            .header(NODE_KEY_HEADER, token)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        read_node(response, StatusCode::OK).await
    }
}

async fn read_node(response: reqwest::Response, expected: StatusCode) -> Result<Node, ClusterError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ClusterError::Transport(e.to_string()))?;

    if status != expected {
        return Err(ClusterError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| ClusterError::InvalidResponse(e.to_string()))
}
