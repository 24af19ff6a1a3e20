//! Certificate poller
//!
//! Fetches the node status after a join until the cluster reports the node
//! `active`, then stores the issued certificate. Every failed or pending poll
//! schedules exactly one retry through [`RetryScheduler`]; there is no limit on
//! the number of attempts.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::EnrollmentContext;
use crate::bootstrap::ClusterLocation;
use crate::retry::RetryScheduler;
use crate::state::EnrollmentState;
use crate::Error;

const OPERATION: &str = "fetch_certificate";

/// What a single poll iteration did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing to poll: no key, no token, certificate already stored, a key
    /// whose join was not accepted, or a key change while the request was in
    /// flight
    Skipped,
    /// Node not approved yet (carries the reported status); retry scheduled
    Pending(String),
    /// Certificate stored and restart triggered
    Activated,
    /// Poll failed; retry scheduled
    RetryScheduled,
}

/// Loop fetching the signed certificate for this node
#[derive(Debug)]
pub struct CertificatePoller {
    ctx: Arc<EnrollmentContext>,
    retry: RetryScheduler,
}

impl CertificatePoller {
    /// Create a poller that re-arms itself through `retry`
    pub fn new(ctx: Arc<EnrollmentContext>, retry: RetryScheduler) -> Self {
        Self { ctx, retry }
    }

    /// Handle poll signals one at a time until the channel closes
    pub async fn run(self, mut signals: mpsc::Receiver<()>) {
        info!("Certificate poller started");
        while signals.recv().await.is_some() {
            let outcome = self.poll_once().await;
            debug!(outcome = ?outcome, "Certificate poll finished");
        }
        info!("Certificate poller stopped");
    }

    /// Run one poll iteration
    pub async fn poll_once(&self) -> PollOutcome {
        let state = self.ctx.store.snapshot();
        if state.bootstrap_key.is_empty() || state.token.is_empty() || state.cert_fetched {
            return PollOutcome::Skipped;
        }
        // Location and token may belong to different keys until a join succeeds
        if state.bootstrap_key != state.active_bootstrap_key {
            debug!("Bootstrap key has no accepted join, nothing to poll");
            return PollOutcome::Skipped;
        }

        let location = ClusterLocation {
            host: state.url.clone(),
            port: state.port.clone(),
            api_base_path: state.api_base_path.clone(),
        };

        let node = match self
            .ctx
            .client
            .node_status(&location, &state.node_id, &state.token)
            .await
        {
            Ok(node) => node,
            Err(e) => {
                self.retry.schedule(OPERATION, &e);
                return PollOutcome::RetryScheduled;
            }
        };

        if self.enrollment_changed(&state) {
            info!(node_id = %state.node_id, "Bootstrap key changed during poll, discarding response");
            return PollOutcome::Skipped;
        }

        if let Err(e) = self.ctx.store.commit(|s| s.status = node.status.clone()) {
            error!(error = %e, kind = "persistence", "Failed to save node status");
        }

        if !node.is_active() {
            self.retry
                .schedule(OPERATION, &format!("node status is {}", node.status));
            return PollOutcome::Pending(node.status);
        }

        if node.certificate.is_empty() {
            self.retry
                .schedule(OPERATION, &"node is active but no certificate was returned");
            return PollOutcome::RetryScheduled;
        }

        match self.ctx.activate(&node.certificate).await {
            Ok(()) => PollOutcome::Activated,
            Err(Error::Persistence(e)) => {
                error!(error = %e, kind = "persistence", "Failed to record stored certificate");
                PollOutcome::Activated
            }
            Err(e) => {
                self.retry.schedule(OPERATION, &e);
                PollOutcome::RetryScheduled
            }
        }
    }

    fn enrollment_changed(&self, polled: &EnrollmentState) -> bool {
        let current = self.ctx.store.snapshot();
        current.bootstrap_key != polled.bootstrap_key
            || current.active_bootstrap_key != polled.active_bootstrap_key
            || current.token != polled.token
    }
}
