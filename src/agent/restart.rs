//! Server restart after new TLS material is stored

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{Error, Result};

/// Applies a newly stored certificate by restarting the served API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServerRestarter: Send + Sync {
    /// Restart the server so it picks up the new certificate
    async fn restart_server(&self) -> Result<()>;
}

/// Restarter running an external command
///
/// With no command configured it only logs; the certificate is still on disk
/// for the next manual restart.
#[derive(Clone, Debug, Default)]
pub struct CommandRestarter {
    command: Vec<String>,
}

impl CommandRestarter {
    /// Create a restarter running `command` (program followed by its arguments)
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ServerRestarter for CommandRestarter {
    async fn restart_server(&self) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            warn!("No restart command configured, restart the server to enable TLS");
            return Ok(());
        };

        info!(command = %self.command.join(" "), "Restarting server");
        let status = tokio::process::Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|e| Error::restart(format!("failed to run {}: {}", program, e)))?;

        if !status.success() {
            return Err(Error::restart(format!("{} exited with {}", program, status)));
        }
        Ok(())
    }
}
