//! Node descriptor exchanged with the cluster

use serde::{Deserialize, Serialize};

/// Status of a node that is registered but not yet approved
pub const STATUS_WAITING_APPROVAL: &str = "waiting_approval";

/// Status of an approved node whose certificate has been issued
pub const STATUS_ACTIVE: &str = "active";

/// Node type reported by this agent
pub const NODE_TYPE_COMMUNITY: &str = "community";

/// Node descriptor sent on join and returned by the cluster
///
/// Optional fields are omitted when empty and default when missing from a
/// response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    /// Address this node's API listens on
    pub address: String,
    /// Base path of this node's API
    pub api_base_path: String,
    /// Password of the account the cluster uses to reach this node
    pub api_password: String,
    /// Name of the account the cluster uses to reach this node
    pub api_user: String,
    /// CSR on join, signed certificate once active
    #[serde(skip_serializing_if = "String::is_empty")]
    pub certificate: String,
    /// Free-form description
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Cluster-assigned ID
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Display name
    pub name: String,
    /// Port this node's API listens on
    #[serde(skip_serializing_if = "is_zero")]
    pub port: i64,
    /// Lifecycle status
    pub status: String,
    /// Node type tag
    #[serde(rename = "type")]
    pub node_type: String,
}

impl Node {
    /// Whether the cluster reports this node as active
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

fn is_zero(port: &i64) -> bool {
    *port == 0
}
