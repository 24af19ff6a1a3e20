//! Local key, CSR and certificate files
//!
//! Every rotation overwrites the previous material; only the signed
//! certificate's path is recorded in the enrollment state.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Private key file name
pub const PRIVATE_KEY_FILE: &str = "tls.key";

/// CSR file name
pub const CSR_FILE: &str = "csr.crt";

/// Signed certificate file name
pub const CERTIFICATE_FILE: &str = "tls.crt";

/// Directory holding enrollment key material
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the artifacts
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the private key, readable only by the owner on unix
    ///
    /// The mode is set before any key material is written, including when an
    /// earlier key file with wider permissions is overwritten.
    pub async fn write_private_key(&self, key_pem: &str) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(PRIVATE_KEY_FILE);

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&path).await?;

        // `mode` only applies to newly created files
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
        }

        file.write_all(key_pem.as_bytes()).await?;
        file.flush().await?;
        debug!(path = %path.display(), "Wrote enrollment artifact");
        Ok(path)
    }

    /// Write the CSR
    pub async fn write_csr(&self, csr_pem: &str) -> std::io::Result<PathBuf> {
        self.write(CSR_FILE, csr_pem).await
    }

    /// Write the signed certificate and return its path
    pub async fn write_certificate(&self, cert_pem: &str) -> std::io::Result<PathBuf> {
        self.write(CERTIFICATE_FILE, cert_pem).await
    }

    async fn write(&self, name: &str, contents: &str) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, contents).await?;
        debug!(path = %path.display(), "Wrote enrollment artifact");
        Ok(path)
    }
}
