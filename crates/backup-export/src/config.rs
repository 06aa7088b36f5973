use std::fs;
use std::path::{Path, PathBuf};

use backup_envelope::{OpenLimits, SealSettings};
use serde::{Deserialize, Serialize};

use crate::error::ExportError;

/// Overrides `scratch_dir` when set.
pub const SCRATCH_DIR_ENV: &str = "BACKUP_EXPORT_SCRATCH_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    /// Used when sealing the export package.
    pub envelope: SealSettings,
    /// Ceilings accepted when opening a backup container.
    pub limits: OpenLimits,
    /// Where the decrypted store is staged. System temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl ExportConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ExportError> {
        let raw = fs::read(path)
            .map_err(|e| ExportError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_slice(&raw)
            .map_err(|e| ExportError::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Packages sealed with `envelope` must open under `limits`.
    pub fn validate(&self) -> Result<(), ExportError> {
        self.limits
            .admits(&self.envelope)
            .map_err(|e| ExportError::Config(format!("envelope settings exceed limits: {e}")))
    }

    pub fn scratch_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(SCRATCH_DIR_ENV) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
