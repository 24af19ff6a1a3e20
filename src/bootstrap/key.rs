//! Bootstrap key decoding
//!
//! A bootstrap key is the standard base64 encoding of
//! `host:port:api_base_path:reserved:reserved`. It is handed to the operator by
//! the cluster and is the only trust secret available before enrollment.

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

/// Number of `:`-separated fields in a decoded bootstrap key
pub const BOOTSTRAP_KEY_FIELDS: usize = 5;

/// Bootstrap key decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Key is not valid base64 or not valid UTF-8
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Decoded payload does not have exactly five fields
    #[error("unrecognized format: expected {BOOTSTRAP_KEY_FIELDS} fields, found {fields}")]
    UnrecognizedFormat {
        /// Number of fields found
        fields: usize,
    },

    /// Host field is empty
    #[error("missing cluster host")]
    MissingHost,

    /// Port field is not a TCP port number
    #[error("invalid cluster port: {0:?}")]
    InvalidPort(String),
}

/// Cluster enrollment endpoint described by a bootstrap key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterLocation {
    /// Cluster host name or address
    pub host: String,
    /// Cluster API port
    pub port: String,
    /// API base path, without leading or trailing slashes
    pub api_base_path: String,
}

impl ClusterLocation {
    /// Enrollment (join) URL: `{scheme}://{host}:{port}/{api_base_path}`
    pub fn join_url(&self, scheme: &str) -> String {
        format!(
            "{}://{}:{}/{}",
            scheme, self.host, self.port, self.api_base_path
        )
    }

    /// Status URL for an enrolled node: `{join_url}/{node_id}`
    pub fn node_url(&self, scheme: &str, node_id: &str) -> String {
        format!("{}/{}", self.join_url(scheme), node_id)
    }
}

/// Decode a bootstrap key into the cluster location it points at
pub fn decode_bootstrap_key(key: &str) -> Result<ClusterLocation, KeyError> {
    let raw = STANDARD
        .decode(key.trim())
        .map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;
    let payload = String::from_utf8(raw).map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;

    let fields: Vec<&str> = payload.split(':').collect();
    if fields.len() != BOOTSTRAP_KEY_FIELDS {
        return Err(KeyError::UnrecognizedFormat {
            fields: fields.len(),
        });
    }

    let host = fields[0].trim();
    if host.is_empty() {
        return Err(KeyError::MissingHost);
    }

    let port = fields[1].trim();
    if port.parse::<u16>().map_or(true, |p| p == 0) {
        return Err(KeyError::InvalidPort(port.to_string()));
    }

    Ok(ClusterLocation {
        host: host.to_string(),
        port: port.to_string(),
        api_base_path: fields[2].trim().trim_matches('/').to_string(),
    })
}
