//! JSON file state backend

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{EnrollmentState, StateBackend, StoreError};

/// Saves [`EnrollmentState`] as JSON, replacing the file atomically
#[derive(Clone, Debug)]
pub struct FileStateBackend {
    path: PathBuf,
}

impl FileStateBackend {
    /// Create a backend for the given state file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateBackend for FileStateBackend {
    fn load(&self) -> Result<Option<EnrollmentState>, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_str(&contents).map_err(|e| {
            StoreError::Serialization(format!("failed to parse {}: {}", self.path.display(), e))
        })?;
        Ok(Some(state))
    }

    fn save(&self, state: &EnrollmentState) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // Write-then-rename so a crash never leaves a truncated state file
        let temp = self.temp_path();
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, &self.path)?;

        debug!(path = %self.path.display(), "Enrollment state saved");
        Ok(())
    }
}
