use crate::error::{ErrorKind, Result};
use crate::files::{remove_sidecars, same_file};
use exn::{OptionExt, ResultExt};
use shelf_storage::{BackendHandle, validate_path};
use shelf_store::snapshot::{scrub_device_paths, use_rollback_journal};
use shelf_store::{Attachment, Database, SyncState, write_flag};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::instrument;

pub const DEFAULT_SNAPSHOT_NAME: &str = "library_backup.db";
const SNAPSHOT_ALIAS: &str = "snapshot";

fn partial_name(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// A snapshot written to its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    /// Where the destination says the snapshot lives.
    pub destination: PathBuf,
    pub bytes: u64,
}

/// Produces privacy-scrubbed, self-contained snapshots of the live store.
///
/// The live file is never modified: everything happens on a private staging
/// copy, which is deleted whether the export succeeds or not.
#[derive(Debug, Clone)]
pub struct Exporter {
    db: Database,
    staging_dir: PathBuf,
}
impl Exporter {
    pub fn new(db: Database) -> Self {
        Self { db, staging_dir: std::env::temp_dir() }
    }

    /// Stage copies somewhere other than the system temporary directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Write a snapshot named `file_name` to `destination`.
    ///
    /// The snapshot holds every committed write, including any still sitting
    /// in the write-ahead log, has no device-specific paths, and carries a
    /// pending sync flag so that the device importing it rebuilds its cover
    /// cache. The snapshot lands under `file_name` only once complete; a
    /// failed upload leaves any earlier snapshot of that name untouched. A
    /// destination that resolves to the live store itself is refused.
    #[instrument(skip(self, destination), fields(destination = destination.name()))]
    pub async fn export(&self, destination: &BackendHandle, file_name: &str) -> Result<Exported> {
        let target = validate_path(file_name).map_err(ErrorKind::storage)?;
        let store = self.db.path().ok_or_raise(|| ErrorKind::InvalidState("in-memory stores can't be exported"))?;
        let location = destination.locate(&target).map_err(ErrorKind::storage)?;
        if same_file(&location, store).await {
            exn::bail!(ErrorKind::InvalidState("the export destination is the live library"));
        }

        let staging = self.stage(store).await?;
        let result = self.deliver(destination, &target, &staging).await;
        self.discard(staging).await;
        let exported = result?;
        tracing::info!(path = %exported.destination.display(), bytes = exported.bytes, "Snapshot exported");
        Ok(exported)
    }

    /// Checkpoint, copy, and transform the copy. Holds the store exclusively
    /// from the checkpoint until the copy is detached.
    async fn stage(&self, store: &Path) -> Result<TempPath> {
        let mut conn = self.db.acquire().await.or_raise(|| ErrorKind::Store)?;
        Database::checkpoint(&mut conn).await.or_raise(|| ErrorKind::Store)?;

        let staging = tempfile::Builder::new()
            .prefix("shelf-export-")
            .suffix(".db")
            .tempfile_in(&self.staging_dir)
            .map_err(|e| ErrorKind::io(e, &self.staging_dir))?
            .into_temp_path();
        if let Err(e) = tokio::fs::copy(store, &staging).await {
            self.discard(staging).await;
            return Err(ErrorKind::io(e, store));
        }
        tracing::debug!(staging = %staging.display(), "Store copied to staging");

        let mut attachment = match Attachment::open(conn, &staging, SNAPSHOT_ALIAS).await {
            Ok(attachment) => attachment,
            Err(e) => {
                self.discard(staging).await;
                return Err(e).or_raise(|| ErrorKind::Store);
            },
        };
        // Detach even when the transformation fails.
        let transformed = Self::transform(&mut attachment).await;
        let detached = attachment.detach().await;
        if let Err(e) = transformed.and(detached) {
            self.discard(staging).await;
            return Err(e).or_raise(|| ErrorKind::Store);
        }
        Ok(staging)
    }

    async fn transform(attachment: &mut Attachment) -> shelf_store::error::Result<()> {
        let schema = shelf_store::Schema::new(SNAPSHOT_ALIAS)?;
        scrub_device_paths(attachment.conn(), schema).await?;
        write_flag(attachment.conn(), schema, SyncState::Pending).await?;
        use_rollback_journal(attachment.conn(), schema).await?;
        Ok(())
    }

    /// Upload under a `.part` name and rename into place, so the destination
    /// only ever holds a complete snapshot and a failure leaves an earlier
    /// snapshot of the same name alone.
    async fn deliver(&self, destination: &BackendHandle, target: &Path, staging: &Path) -> Result<Exported> {
        let bytes = tokio::fs::read(staging).await.map_err(|e| ErrorKind::io(e, staging))?;
        let part = partial_name(target);
        let uploaded = match destination.write(&part, &bytes).await {
            Ok(()) => destination.rename(&part, target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = uploaded {
            if let Err(cleanup) = destination.delete(&part).await {
                tracing::warn!(error = ?cleanup, "Couldn't remove partial snapshot from destination");
            }
            return Err(ErrorKind::storage(e));
        }
        let info = destination.stat(target).await.map_err(ErrorKind::storage)?;
        let location = destination.locate(target).map_err(ErrorKind::storage)?;
        Ok(Exported { destination: location, bytes: info.size })
    }

    /// Delete a staging copy and any journal files SQLite left next to it.
    async fn discard(&self, staging: TempPath) {
        let path = staging.to_path_buf();
        if let Err(e) = staging.close() {
            tracing::warn!(path = %path.display(), error = %e, "Couldn't remove export staging file");
        }
        remove_sidecars(&path).await;
    }
}
