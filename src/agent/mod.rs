//! Cluster enrollment agent
//!
//! Two loops run for the lifetime of the process:
//! - [`BootstrapKeyMonitor`] reacts to bootstrap key changes: decodes the key,
//!   generates a CSR and issues the join request.
//! - [`CertificatePoller`] polls the cluster until the node is `active` and its
//!   certificate has been stored.
//!
//! The monitor hands work to the poller through a bounded signal channel; the
//! poller re-arms itself through the same channel via [`RetryScheduler`].
//!
//! # Enrollment Flow
//!
//! 1. Operator sets a bootstrap key
//! 2. Monitor decodes it and records the cluster location
//! 3. Monitor generates a key pair and CSR, stores both locally
//! 4. Join request registers the node (status `waiting_approval`)
//! 5. Poller fetches the node status until it is `active`
//! 6. Certificate is stored and the server restarted with TLS

mod join;
mod monitor;
mod poller;
mod restart;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cluster::ClusterClient;
use crate::config::ApiUser;
use crate::pki::CsrGenerator;
use crate::retry::RetryScheduler;
use crate::state::{ArtifactStore, EnrollmentStore};
use crate::Result;

pub use join::{select_cluster_user, JoinOutcome, JoinRequester};
pub use monitor::{BootstrapKeyMonitor, KeyChangeOutcome};
pub use poller::{CertificatePoller, PollOutcome};
pub use restart::{CommandRestarter, ServerRestarter};

/// Capacity of the certificate poll signal channel
///
/// Room for a resume signal and a rotation signal without blocking either sender.
pub const CERT_FETCH_QUEUE_DEPTH: usize = 2;

/// Source of the accounts configured on this node's API
#[cfg_attr(test, mockall::automock)]
pub trait CredentialSource: Send + Sync {
    /// All configured accounts
    fn users(&self) -> Result<Vec<ApiUser>>;
}

/// Fixed account list, taken from the agent configuration
#[derive(Clone, Debug, Default)]
pub struct StaticCredentials {
    users: Vec<ApiUser>,
}

impl StaticCredentials {
    /// Create a source returning `users`
    pub fn new(users: Vec<ApiUser>) -> Self {
        Self { users }
    }
}

impl CredentialSource for StaticCredentials {
    fn users(&self) -> Result<Vec<ApiUser>> {
        Ok(self.users.clone())
    }
}

/// This node's own API, as reported to the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalService {
    /// Address the cluster uses to reach this node
    pub address: String,
    /// Port the cluster uses to reach this node
    pub port: u16,
    /// Base path of this node's API
    pub api_base_path: String,
}

/// Everything the enrollment loops share
pub struct EnrollmentContext {
    /// Enrollment state
    pub store: Arc<EnrollmentStore>,
    /// Local key material
    pub artifacts: ArtifactStore,
    /// Cluster enrollment API client
    pub client: ClusterClient,
    /// Accounts offered to the cluster
    pub credentials: Arc<dyn CredentialSource>,
    /// Applies new TLS material
    pub restarter: Arc<dyn ServerRestarter>,
    /// Key pair and CSR generation
    pub csr_generator: Arc<dyn CsrGenerator>,
    /// This node's API endpoint
    pub local: LocalService,
    /// Delay before a failed or pending poll is retried
    pub poll_interval: Duration,
}

impl EnrollmentContext {
    /// Store an issued certificate, record it and restart the server
    ///
    /// The restart runs even if recording fails, since the certificate is
    /// already on disk.
    pub(crate) async fn activate(&self, certificate: &str) -> Result<()> {
        let path = self.artifacts.write_certificate(certificate).await?;

        let recorded = self.store.commit(|s| {
            s.cert_fetched = true;
            s.certificate_path = path.display().to_string();
        });
        info!(path = %path.display(), "Cluster certificate stored");

        if let Err(e) = self.restarter.restart_server().await {
            error!(error = %e, "Failed to restart server with new certificate");
        }

        recorded.map_err(Into::into)
    }
}

impl std::fmt::Debug for EnrollmentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentContext")
            .field("artifacts", &self.artifacts)
            .field("local", &self.local)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Handle to the running monitor and poller tasks
#[derive(Debug)]
pub struct EnrollmentAgent {
    monitor: JoinHandle<()>,
    poller: JoinHandle<()>,
}

impl EnrollmentAgent {
    /// Start both loops and resume an unfinished enrollment
    pub fn spawn(ctx: Arc<EnrollmentContext>) -> Self {
        let (poll_tx, poll_rx) = mpsc::channel(CERT_FETCH_QUEUE_DEPTH);
        let changes = ctx.store.subscribe();

        let retry = RetryScheduler::new(poll_tx.clone(), ctx.poll_interval);
        let poller = CertificatePoller::new(ctx.clone(), retry);
        let monitor = BootstrapKeyMonitor::new(ctx.clone(), poll_tx);

        let monitor = tokio::spawn(monitor.run(changes));
        let poller = tokio::spawn(poller.run(poll_rx));

        let state = ctx.store.snapshot();
        if !state.bootstrap_key.is_empty() && !state.cert_fetched {
            info!(status = %state.status, "Resuming unfinished cluster enrollment");
            ctx.store.reload_bootstrap_key();
        }

        Self { monitor, poller }
    }

    /// Stop both loops; scheduled retries are dropped with the channel
    pub fn shutdown(self) {
        self.monitor.abort();
        self.poller.abort();
    }
}
