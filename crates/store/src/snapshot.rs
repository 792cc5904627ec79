//! Transformations applied to a store copy before it leaves the device.

use crate::error::{ErrorKind, Result};
use crate::flag::Schema;
use exn::ResultExt;
use sqlx::SqliteConnection;

/// Blank every column that only means something on this device: cached cover
/// locations and the avatar path.
///
/// Cover sources are kept, so the receiving device can download everything
/// again.
pub async fn scrub_device_paths(conn: &mut SqliteConnection, schema: Schema<'_>) -> Result<()> {
    let sql = include_str!("../queries/scrub_device_paths.sql").replace("{schema}", schema.as_str());
    sqlx::query(&sql).execute(conn).await.or_raise(|| ErrorKind::Database)?;
    Ok(())
}

/// Switch a database from write-ahead logging to a rollback journal.
///
/// Leaves a single self-contained file: every committed page is in the main
/// file and no `-wal`/`-shm` sidecars remain.
pub async fn use_rollback_journal(conn: &mut SqliteConnection, schema: Schema<'_>) -> Result<()> {
    let mode: String = sqlx::query_scalar(&format!("PRAGMA {schema}.journal_mode = DELETE"))
        .fetch_one(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if !mode.eq_ignore_ascii_case("delete") {
        exn::bail!(ErrorKind::InvalidData("journal mode"));
    }
    Ok(())
}
