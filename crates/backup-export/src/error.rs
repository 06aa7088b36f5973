use std::fmt;

use backup_envelope::EnvelopeError;
use serde::Serialize;
use thiserror::Error;

use crate::source::Platform;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Container error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Backup store is missing table {table}")]
    MissingTable { table: &'static str },

    #[error("Backup store table {table} is missing column {column}")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("Backup store unreadable: {0}")]
    UnreadableStore(String),

    #[error("Unsupported {platform} schema version {version}")]
    UnsupportedSchemaVersion { platform: Platform, version: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// `stage` is the stage that was running, or about to run, when the
    /// cancellation was noticed.
    #[error("Export cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Background worker failed: {0}")]
    Worker(String),
}

/// Pipeline stage a fatal error came from, for the user-facing report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configure,
    Decrypt,
    Load,
    Adapt,
    Convert,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configure => "configure",
            Stage::Decrypt => "decrypt",
            Stage::Load => "load",
            Stage::Adapt => "adapt",
            Stage::Convert => "convert",
            Stage::Output => "output",
        };
        f.write_str(name)
    }
}

impl ExportError {
    pub fn stage(&self) -> Stage {
        match self {
            ExportError::Envelope(_) | ExportError::Worker(_) => Stage::Decrypt,
            ExportError::MissingTable { .. }
            | ExportError::MissingColumn { .. }
            | ExportError::UnreadableStore(_)
            | ExportError::Database(_) => Stage::Load,
            ExportError::UnsupportedSchemaVersion { .. } => Stage::Adapt,
            ExportError::Cancelled { stage } => *stage,
            ExportError::Io(_) | ExportError::Serialisation(_) => Stage::Output,
            ExportError::Config(_) => Stage::Configure,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ExportError::Cancelled { .. } | ExportError::Envelope(EnvelopeError::Cancelled)
        )
    }
}
