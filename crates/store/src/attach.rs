//! Scoped secondary-database attachments.

use crate::error::{ErrorKind, Result};
use crate::flag::Schema;
use exn::{OptionExt, ResultExt};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection};
use std::path::Path;
use tracing::instrument;

/// Another database file attached to the store's connection under an alias.
///
/// Call [`detach`](Self::detach) when done. An attachment that is dropped
/// without detaching closes its connection instead of handing it back to the
/// pool, so the alias can never leak into unrelated queries.
#[must_use = "an attachment must be detached"]
pub struct Attachment {
    conn: PoolConnection<Sqlite>,
    alias: String,
    attached: bool,
}
impl Attachment {
    /// Attach `file` as `alias` on `conn`.
    ///
    /// On failure `conn` is dropped back into the pool untouched.
    #[instrument(level = "debug", skip(conn), fields(file = %file.display()))]
    pub async fn open(mut conn: PoolConnection<Sqlite>, file: &Path, alias: &str) -> Result<Self> {
        let schema = Schema::new(alias)?;
        let file = file.to_str().ok_or_raise(|| ErrorKind::InvalidData("attachment path"))?;
        sqlx::query(&format!("ATTACH DATABASE ? AS {schema}"))
            .bind(file)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self { conn, alias: alias.to_string(), attached: true })
    }

    /// The schema name to qualify tables of the attached database with.
    pub fn schema(&self) -> Schema<'_> {
        Schema(&self.alias)
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Detach and release the connection back to the pool.
    #[instrument(level = "debug", skip(self), fields(alias = %self.alias))]
    pub async fn detach(mut self) -> Result<()> {
        sqlx::query(&format!("DETACH DATABASE {}", self.schema()))
            .execute(&mut *self.conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        self.attached = false;
        Ok(())
    }
}
impl Drop for Attachment {
    fn drop(&mut self) {
        if self.attached {
            tracing::warn!(alias = %self.alias, "Attachment dropped while attached; closing its connection");
            self.conn.close_on_drop();
        }
    }
}
