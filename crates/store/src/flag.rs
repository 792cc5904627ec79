//! The persisted "reconciliation owed" flag.
//!
//! One row in `app_meta`. The exporter marks it pending inside every snapshot
//! so that a store imported elsewhere resyncs its cover cache on first load;
//! the cover cache clears it once a pass leaves nothing stale behind.

use crate::Database;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::{SqliteConnection, SqlitePool};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::instrument;

const FLAG_PROP: &str = "needs_cover_sync";
const PENDING: &str = "1";
const CLEAR: &str = "0";

/// A database schema name usable in SQL (`main`, or an attachment alias).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema<'a>(pub(crate) &'a str);
impl Schema<'static> {
    pub const MAIN: Self = Schema("main");
}
impl<'a> Schema<'a> {
    /// Only plain identifiers are accepted: the name is spliced into SQL text.
    pub fn new(name: &'a str) -> Result<Self> {
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            exn::bail!(ErrorKind::InvalidSchema(name.to_string()));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }
}
impl Display for Schema<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Clear,
    Pending,
}
impl SyncState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Anything other than an explicit clear reads as pending, including a
    /// missing row: an unnecessary pass is cheap, a skipped one is not.
    fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(CLEAR) => Self::Clear,
            _ => Self::Pending,
        }
    }

    fn as_stored(&self) -> &'static str {
        match self {
            Self::Clear => CLEAR,
            Self::Pending => PENDING,
        }
    }
}
impl Display for SyncState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Clear => "clear",
            Self::Pending => "pending",
        })
    }
}

/// Write the flag into `schema` on an already held connection.
///
/// Idempotent. Used directly by the exporter against an attached snapshot.
pub async fn write_flag(conn: &mut SqliteConnection, schema: Schema<'_>, state: SyncState) -> Result<()> {
    let sql = include_str!("../queries/write_flag.sql").replace("{schema}", schema.as_str());
    sqlx::query(&sql)
        .bind(FLAG_PROP)
        .bind(state.as_stored())
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

/// Reads and writes the live store's sync flag.
#[derive(Debug, Clone)]
pub struct SyncFlag {
    pool: SqlitePool,
}
impl From<&Database> for SyncFlag {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl SyncFlag {
    /// Side-effect free.
    pub async fn read(&self) -> Result<SyncState> {
        let value: Option<String> = sqlx::query_scalar(include_str!("../queries/read_flag.sql"))
            .bind(FLAG_PROP)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(SyncState::from_stored(value.as_deref()))
    }

    #[instrument(skip(self))]
    pub async fn set(&self, reason: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        write_flag(&mut conn, Schema::MAIN, SyncState::Pending).await?;
        tracing::info!("Cover sync marked pending");
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        write_flag(&mut conn, Schema::MAIN, SyncState::Clear).await?;
        tracing::info!("Cover sync flag cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn test_fresh_store_is_clear() {
        let db = Database::connect_in_memory().await.unwrap();
        let flag = SyncFlag::from(&db);
        assert_eq!(flag.read().await.unwrap(), SyncState::Clear);
    }

    #[tokio::test]
    async fn test_set_is_idempotent_and_clear_resets() {
        let db = Database::connect_in_memory().await.unwrap();
        let flag = SyncFlag::from(&db);
        flag.set("test").await.unwrap();
        flag.set("test again").await.unwrap();
        assert!(flag.read().await.unwrap().is_pending());
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_meta").fetch_one(db.pool()).await.unwrap();
        assert_eq!(rows, 1);
        flag.clear().await.unwrap();
        assert_eq!(flag.read().await.unwrap(), SyncState::Clear);
    }

    #[tokio::test]
    async fn test_missing_row_reads_pending() {
        let db = Database::connect_in_memory().await.unwrap();
        sqlx::query("DELETE FROM app_meta").execute(db.pool()).await.unwrap();
        assert!(SyncFlag::from(&db).read().await.unwrap().is_pending());
    }

    #[rstest]
    #[case(Some("0"), SyncState::Clear)]
    #[case(Some(" 0 "), SyncState::Clear)]
    #[case(Some("1"), SyncState::Pending)]
    #[case(Some("true"), SyncState::Pending)]
    #[case(Some(""), SyncState::Pending)]
    #[case(None, SyncState::Pending)]
    fn test_stored_values(#[case] stored: Option<&str>, #[case] expected: SyncState) {
        assert_eq!(SyncState::from_stored(stored), expected);
    }

    #[rstest]
    #[case("main", true)]
    #[case("snapshot", true)]
    #[case("_bk2", true)]
    #[case("", false)]
    #[case("2fast", false)]
    #[case("main; DROP TABLE entries", false)]
    fn test_schema_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(Schema::new(name).is_ok(), valid);
    }
}
