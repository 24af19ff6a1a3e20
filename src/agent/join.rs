//! Join request: registers this node with the cluster

use std::sync::Arc;

use tracing::{error, info, warn};

use super::EnrollmentContext;
use crate::bootstrap::ClusterLocation;
use crate::cluster::{Node, NODE_TYPE_COMMUNITY, STATUS_WAITING_APPROVAL};
use crate::config::ApiUser;
use crate::{Error, Result};

/// Result of an accepted join request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Status reported by the cluster
    pub status: String,
    /// Whether the join already produced a stored certificate
    pub activated: bool,
}

/// Pick the account the cluster will use to reach this node
///
/// Exactly the first account flagged `insecure` is chosen, since only its
/// password can be handed over as-is.
pub fn select_cluster_user(users: &[ApiUser]) -> Result<&ApiUser> {
    if users.is_empty() {
        return Err(Error::configuration("no users configured"));
    }
    users
        .iter()
        .find(|u| u.insecure)
        .ok_or_else(|| Error::configuration("no insecure user configured for cluster access"))
}

/// Issues join requests on behalf of the bootstrap key monitor
#[derive(Debug)]
pub struct JoinRequester {
    ctx: Arc<EnrollmentContext>,
}

impl JoinRequester {
    /// Create a requester over the shared enrollment context
    pub fn new(ctx: Arc<EnrollmentContext>) -> Self {
        Self { ctx }
    }

    /// Register this node with the cluster at `location`
    ///
    /// On `201` the assigned node ID, token and status are committed and
    /// `bootstrap_key` becomes the active key. If the cluster approves the node
    /// immediately, the returned certificate is stored and the server restarted.
    /// If storing it fails, the outcome is not `activated` and the poller
    /// fetches it again.
    pub async fn join(
        &self,
        location: &ClusterLocation,
        bootstrap_key: &str,
        csr_pem: &str,
    ) -> Result<JoinOutcome> {
        let node = self.descriptor(csr_pem)?;
        let response = self.ctx.client.join(location, bootstrap_key, &node).await?;
        let status = response.node.status.clone();

        info!(
            node_id = %response.node.id,
            status = %status,
            "Join request accepted"
        );

        let recorded = self.ctx.store.commit(|s| {
            s.node_id = response.node.id.clone();
            s.token = response.token.clone();
            s.active_bootstrap_key = bootstrap_key.to_string();
            s.status = status.clone();
        });
        if let Err(e) = &recorded {
            error!(error = %e, kind = "persistence", "Failed to save join result");
        }

        let activated = if response.node.is_active() {
            if response.node.certificate.is_empty() {
                warn!("Cluster reported node active without a certificate");
                false
            } else {
                match self.ctx.activate(&response.node.certificate).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(
                            error = %e,
                            kind = e.kind(),
                            "Failed to store certificate from join, leaving it to the poller"
                        );
                        // A recorded certificate needs no poll even if saving failed
                        self.ctx.store.cert_fetched()
                    }
                }
            }
        } else {
            false
        };

        recorded?;
        Ok(JoinOutcome { status, activated })
    }

    fn descriptor(&self, csr_pem: &str) -> Result<Node> {
        let users = self.ctx.credentials.users()?;
        let user = select_cluster_user(&users)?;
        let local = &self.ctx.local;

        Ok(Node {
            address: local.address.clone(),
            api_base_path: local.api_base_path.clone(),
            api_user: user.name.clone(),
            api_password: user.password.clone(),
            certificate: csr_pem.to_string(),
            name: self.ctx.store.snapshot().name,
            port: i64::from(local.port),
            status: STATUS_WAITING_APPROVAL.to_string(),
            node_type: NODE_TYPE_COMMUNITY.to_string(),
            ..Default::default()
        })
    }
}
