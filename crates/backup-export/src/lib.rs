//! backup-export: canonical export of messaging-app backups
//!
//! Pipeline, leaf first:
//!
//! ```text
//! container ──open──▶ scratch SQLite file ──SourceStore──▶ PlaintextStore
//!     ──SchemaAdapter(platform, version)──▶ IntermediateRows
//!     ──convert (per-row isolation)──▶ DTOs + ConversionFailures
//!     ──assemble──▶ ExportOutcome
//! ```
//!
//! Fatal problems (authentication, key derivation, unreadable store,
//! unsupported schema version, cancellation) are `ExportError`s. A bad row is
//! never an error: it becomes one `ConversionFailure` in the report and the
//! rest of the batch carries on.

pub mod adapter;
pub mod assemble;
pub mod config;
pub mod convert;
pub mod error;
pub mod intermediate;
pub mod job;
pub mod model;
pub mod report;
pub mod source;

pub use assemble::{assemble, ExportOutcome};
pub use backup_envelope::CancellationToken;
pub use config::ExportConfig;
pub use error::{ExportError, Stage};
pub use job::{run_export, ExportRequest};
pub use model::CanonicalExport;
pub use report::{ConversionFailure, ExportSummary, FailureReport, RecordCategory};
pub use source::{Platform, PlaintextStore, SourceStore};
