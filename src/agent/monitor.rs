//! Bootstrap key monitor
//!
//! Reacts to every bootstrap key notification from the enrollment store. A new
//! key starts a fresh enrollment (decode, CSR, join); the active key resumes an
//! unfinished one; an empty key resets enrollment.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::join::{JoinOutcome, JoinRequester};
use super::EnrollmentContext;
use crate::bootstrap::decode_bootstrap_key;
use crate::pki::PkiError;
use crate::state::ClusterMode;
use crate::Result;

/// What handling a key notification did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyChangeOutcome {
    /// Key was empty; enrollment was reset
    Cleared,
    /// Key is already active; the poller was signalled to resume
    Resumed,
    /// New key; a join request was accepted
    Joined(JoinOutcome),
}

/// Loop driving enrollment from bootstrap key changes
#[derive(Debug)]
pub struct BootstrapKeyMonitor {
    ctx: Arc<EnrollmentContext>,
    join: JoinRequester,
    poll_signal: mpsc::Sender<()>,
}

impl BootstrapKeyMonitor {
    /// Create a monitor that hands follow-up polling to `poll_signal`
    pub fn new(ctx: Arc<EnrollmentContext>, poll_signal: mpsc::Sender<()>) -> Self {
        Self {
            join: JoinRequester::new(ctx.clone()),
            ctx,
            poll_signal,
        }
    }

    /// Handle notifications one at a time
    ///
    /// Failures are logged and the loop waits for the next notification; a
    /// failed join is not retried until the key is re-supplied.
    pub async fn run(self, mut changes: watch::Receiver<()>) {
        info!("Bootstrap key monitor started");
        while changes.changed().await.is_ok() {
            match self.handle_key_change().await {
                Ok(outcome) => debug!(outcome = ?outcome, "Bootstrap key change handled"),
                Err(e) => error!(
                    error = %e,
                    kind = e.kind(),
                    "Failed to handle bootstrap key change"
                ),
            }
        }
        info!("Bootstrap key monitor stopped");
    }

    /// Handle the current bootstrap key
    pub async fn handle_key_change(&self) -> Result<KeyChangeOutcome> {
        // Every notification re-arms certificate verification
        self.ctx.store.update(|s| s.cert_fetched = false);
        let state = self.ctx.store.snapshot();
        let key = state.bootstrap_key;

        if key.is_empty() {
            self.ctx.store.commit(|s| {
                s.active_bootstrap_key.clear();
                s.cert_fetched = false;
            })?;
            info!("Bootstrap key cleared, enrollment reset");
            return Ok(KeyChangeOutcome::Cleared);
        }

        if key == state.active_bootstrap_key {
            info!(node_id = %state.node_id, "Bootstrap key unchanged, resuming certificate fetch");
            self.signal_poller().await;
            return Ok(KeyChangeOutcome::Resumed);
        }

        let location = decode_bootstrap_key(&key)?;
        info!(
            host = %location.host,
            port = %location.port,
            api_base_path = %location.api_base_path,
            "New bootstrap key received"
        );

        // The previous node identity is only valid at the previous location
        self.ctx.store.commit(|s| {
            s.url = location.host.clone();
            s.port = location.port.clone();
            s.api_base_path = location.api_base_path.clone();
            s.mode = ClusterMode::Cluster;
            s.node_id.clear();
            s.token.clear();
        })?;

        info!("Generating key pair and CSR");
        let generator = self.ctx.csr_generator.clone();
        let request = tokio::task::spawn_blocking(move || generator.generate())
            .await
            .map_err(|e| PkiError::KeyGenerationFailed(e.to_string()))??;

        self.ctx
            .artifacts
            .write_private_key(request.private_key_pem())
            .await?;
        self.ctx.artifacts.write_csr(request.csr_pem()).await?;

        let outcome = self.join.join(&location, &key, request.csr_pem()).await?;
        if !outcome.activated {
            self.signal_poller().await;
        }
        Ok(KeyChangeOutcome::Joined(outcome))
    }

    async fn signal_poller(&self) {
        if self.poll_signal.send(()).await.is_err() {
            warn!("Certificate poller is not running, signal dropped");
        }
    }
}
