//! Export job driver: decrypt, load, adapt, convert, assemble.
//!
//! The container is decrypted on a blocking worker into a scratch file that
//! lives only as long as the job. Cancellation is checked between stages, at
//! every chunk while decrypting and at every row while converting; a
//! cancelled job returns `ExportError::Cancelled` tagged with the stage it
//! stopped in and produces nothing.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use backup_envelope::{Cancelled, CancellationToken, EnvelopeError};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::adapter;
use crate::assemble::{assemble, ExportOutcome};
use crate::config::ExportConfig;
use crate::convert::{convert_direct, convert_events, convert_members, convert_named};
use crate::error::{ExportError, Stage};
use crate::source::{Platform, SourceStore};

/// One export: which container, how to open it and from whose point of view.
pub struct ExportRequest {
    pub container: PathBuf,
    pub passphrase: Zeroizing<String>,
    pub platform: Platform,
    /// Decides which participant of a direct conversation is "the other".
    pub exporting_user: Uuid,
}

impl ExportRequest {
    pub fn new(
        container: impl Into<PathBuf>,
        passphrase: impl Into<String>,
        platform: Platform,
        exporting_user: Uuid,
    ) -> Self {
        Self {
            container: container.into(),
            passphrase: Zeroizing::new(passphrase.into()),
            platform,
            exporting_user,
        }
    }
}

impl fmt::Debug for ExportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportRequest")
            .field("container", &self.container)
            .field("passphrase", &"<redacted>")
            .field("platform", &self.platform)
            .field("exporting_user", &self.exporting_user)
            .finish()
    }
}

pub async fn run_export(
    request: &ExportRequest,
    config: &ExportConfig,
    cancel: &CancellationToken,
) -> Result<ExportOutcome, ExportError> {
    info!(
        container = %request.container.display(),
        platform = %request.platform,
        "export started"
    );
    let result = run_stages(request, config, cancel).await;
    match &result {
        Ok(outcome) => info!(
            failed = outcome.summary.failed(),
            "export finished"
        ),
        Err(e) if e.is_cancelled() => info!("export cancelled"),
        Err(e) => warn!(stage = %e.stage(), error = %e, "export failed"),
    }
    result
}

async fn run_stages(
    request: &ExportRequest,
    config: &ExportConfig,
    cancel: &CancellationToken,
) -> Result<ExportOutcome, ExportError> {
    let scratch = decrypt_to_scratch(request, config, cancel).await?;
    cancel.check().map_err(cancelled_in(Stage::Load))?;

    let store = SourceStore::open(scratch.path(), request.platform).await?;
    let result = export_from_store(&store, request.exporting_user, cancel).await;
    store.close().await;

    // Removes the plaintext copy.
    if let Err(e) = scratch.close() {
        warn!(error = %e, "failed to remove decrypted scratch file");
    }
    result
}

async fn decrypt_to_scratch(
    request: &ExportRequest,
    config: &ExportConfig,
    cancel: &CancellationToken,
) -> Result<NamedTempFile, ExportError> {
    let container = request.container.clone();
    let passphrase = request.passphrase.clone();
    let limits = config.limits.clone();
    let scratch_dir = config.scratch_dir();
    let cancel = cancel.clone();

    let scratch = tokio::task::spawn_blocking(move || -> Result<NamedTempFile, EnvelopeError> {
        let input = BufReader::new(File::open(&container)?);
        let stream = backup_envelope::open(input, passphrase.as_bytes(), &limits)?;

        fs::create_dir_all(&scratch_dir)?;
        let mut scratch = tempfile::Builder::new()
            .prefix("backup-export-")
            .suffix(".db")
            .tempfile_in(&scratch_dir)?;
        let written = stream.copy_to(BufWriter::new(scratch.as_file_mut()), &cancel)?;
        debug!(bytes = written, path = %scratch.path().display(), "store staged");
        Ok(scratch)
    })
    .await
    .map_err(|e| ExportError::Worker(e.to_string()))??;

    info!("container decrypted");
    Ok(scratch)
}

async fn export_from_store(
    store: &SourceStore,
    exporting_user: Uuid,
    cancel: &CancellationToken,
) -> Result<ExportOutcome, ExportError> {
    let version = store.detect_version().await?;
    let adapter = adapter::lookup(store.platform(), version)?;
    adapter.verify(store).await?;
    info!(platform = %store.platform(), version, "schema version detected");
    cancel.check().map_err(cancelled_in(Stage::Load))?;

    let plaintext = store.load().await?;
    cancel.check().map_err(cancelled_in(Stage::Adapt))?;
    let rows = adapter.adapt(&plaintext);
    cancel.check().map_err(cancelled_in(Stage::Convert))?;

    let converting = cancelled_in(Stage::Convert);
    let named = convert_named(&rows, cancel).map_err(&converting)?;
    let direct = convert_direct(&rows, exporting_user, cancel).map_err(&converting)?;
    let members = convert_members(&rows, cancel).map_err(&converting)?;
    let events = convert_events(&rows, cancel).map_err(&converting)?;

    Ok(assemble(
        rows.platform,
        rows.schema_version,
        named,
        direct,
        members,
        events,
    ))
}

fn cancelled_in(stage: Stage) -> impl Fn(Cancelled) -> ExportError {
    move |_| ExportError::Cancelled { stage }
}
