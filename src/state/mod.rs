//! Persistent enrollment state
//!
//! All enrollment fields live in one [`EnrollmentState`] owned by an
//! [`EnrollmentStore`]. Readers take snapshots; writers either update the
//! in-memory copy or `commit`, which applies the update and saves it through
//! the [`StateBackend`] while holding the lock, so multi-field steps land
//! together.
//!
//! Changes to the bootstrap key are announced on a `watch` channel that the
//! bootstrap key monitor consumes.

mod artifacts;
mod file;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

pub use artifacts::{ArtifactStore, CERTIFICATE_FILE, CSR_FILE, PRIVATE_KEY_FILE};
pub use file::FileStateBackend;

/// State persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the state file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// State file contents could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Whether this node runs standalone or as a cluster member
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMode {
    /// Not enrolled in any cluster
    #[default]
    Single,
    /// Enrolled (or enrolling) in a cluster
    Cluster,
}

/// Enrollment state, persisted across restarts
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentState {
    /// Bootstrap key currently offered by the operator
    pub bootstrap_key: String,
    /// Bootstrap key for which a join request was accepted
    pub active_bootstrap_key: String,
    /// Cluster host decoded from the bootstrap key
    pub url: String,
    /// Cluster port decoded from the bootstrap key
    pub port: String,
    /// Cluster API base path decoded from the bootstrap key
    pub api_base_path: String,
    /// Operating mode
    pub mode: ClusterMode,
    /// Display name reported to the cluster
    pub name: String,
    /// Node ID assigned by the cluster
    pub node_id: String,
    /// Bearer token (`X-Node-Key`) assigned by the cluster
    pub token: String,
    /// Last lifecycle status reported by the cluster
    pub status: String,
    /// Whether a signed certificate has been stored
    pub cert_fetched: bool,
    /// Where the signed certificate is stored
    pub certificate_path: String,
}

/// Durable storage for [`EnrollmentState`]
#[cfg_attr(test, mockall::automock)]
pub trait StateBackend: Send + Sync {
    /// Load the last saved state, `None` on first boot
    fn load(&self) -> Result<Option<EnrollmentState>, StoreError>;

    /// Durably save the state
    fn save(&self, state: &EnrollmentState) -> Result<(), StoreError>;
}

/// Owner of the enrollment state shared by the monitor and the poller
pub struct EnrollmentStore {
    state: Mutex<EnrollmentState>,
    backend: Box<dyn StateBackend>,
    key_changes: watch::Sender<()>,
}

impl EnrollmentStore {
    /// Open the store, loading saved state or starting empty
    pub fn open(backend: impl StateBackend + 'static) -> Result<Self, StoreError> {
        let state = backend.load()?.unwrap_or_default();
        Ok(Self::with_state(backend, state))
    }

    /// Create a store with an explicit initial state (not saved until the first commit)
    pub fn with_state(backend: impl StateBackend + 'static, state: EnrollmentState) -> Self {
        let (key_changes, _) = watch::channel(());
        Self {
            state: Mutex::new(state),
            backend: Box::new(backend),
            key_changes,
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> EnrollmentState {
        self.state.lock().clone()
    }

    /// Current bootstrap key
    pub fn bootstrap_key(&self) -> String {
        self.state.lock().bootstrap_key.clone()
    }

    /// Whether a signed certificate has been stored
    pub fn cert_fetched(&self) -> bool {
        self.state.lock().cert_fetched
    }

    /// Apply an in-memory update; it is persisted by the next `save` or `commit`
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut EnrollmentState),
    {
        let mut state = self.state.lock();
        f(&mut *state);
    }

    /// Apply an update and save the result before releasing the lock
    ///
    /// The in-memory update is kept even if the save fails, so a later
    /// successful save still persists it.
    ///
    /// The save runs synchronously under the lock. State saves are a single
    /// small JSON file, written a handful of times per enrollment.
    pub fn commit<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut EnrollmentState),
    {
        let mut state = self.state.lock();
        f(&mut *state);
        self.backend.save(&*state)
    }

    /// Save the current state
    pub fn save(&self) -> Result<(), StoreError> {
        let state = self.state.lock();
        self.backend.save(&*state)
    }

    /// Store a new bootstrap key and notify the monitor
    ///
    /// An empty key resets enrollment in the same commit. Notifications
    /// coalesce, so the monitor may never observe a clear that is followed
    /// by another key before it wakes.
    pub fn set_bootstrap_key(&self, key: &str) -> Result<(), StoreError> {
        self.commit(|s| {
            s.bootstrap_key = key.to_string();
            if key.is_empty() {
                s.active_bootstrap_key.clear();
                s.cert_fetched = false;
            }
        })?;
        self.reload_bootstrap_key();
        Ok(())
    }

    /// Notify the monitor without changing the key (resume after restart)
    pub fn reload_bootstrap_key(&self) {
        debug!("Bootstrap key change notification");
        self.key_changes.send_replace(());
    }

    /// Subscribe to bootstrap key change notifications
    ///
    /// Only notifications sent after subscribing are observed.
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.key_changes.subscribe()
    }
}

impl std::fmt::Debug for EnrollmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentStore")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
