//! Repository for library entries and the local profile.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{EntryRow, LibraryEntry, Profile, now};
use exn::ResultExt;
use sqlx::SqlitePool;
use tracing::instrument;

/// Repository for managing library entries in the store.
///
/// Every method is a single short statement (or one short transaction), so
/// callers running concurrently just queue on the store's connection.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Insert an entry, or replace everything but its creation date.
    pub async fn upsert_entry(&self, entry: &LibraryEntry) -> Result<()> {
        let row = EntryRow::from(entry);
        sqlx::query(include_str!("../queries/upsert_entry.sql"))
            .bind(row.id)
            .bind(row.name)
            .bind(row.description)
            .bind(row.status)
            .bind(row.current_chapter)
            .bind(row.total_chapters)
            .bind(row.year)
            .bind(row.rating)
            .bind(row.is_adult)
            .bind(row.is_pinned)
            .bind(row.cover_path)
            .bind(row.cover_source)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn get_entry(&self, id: impl AsRef<str>) -> Result<Option<LibraryEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/get_entry.sql"))
            .bind(id.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(LibraryEntry::try_from).transpose()
    }

    /// All entries, pinned first, then most recently updated.
    pub async fn list_entries(&self) -> Result<Vec<LibraryEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/list_entries.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(LibraryEntry::try_from).collect()
    }

    /// Returns `true` if an entry was deleted. Its genres go with it.
    pub async fn delete_entry(&self, id: impl AsRef<str>) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_entry.sql"))
            .bind(id.as_ref())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Point an entry's artwork at a new location (or at nothing).
    ///
    /// Deliberately a single independent write: the cover cache calls this once
    /// per downloaded file, never inside a long-running transaction.
    #[instrument(level = "debug", skip(self, id), fields(entry = %id.as_ref()))]
    pub async fn set_cover_pointer(&self, id: impl AsRef<str>, pointer: Option<&str>) -> Result<()> {
        let id = id.as_ref();
        let result = sqlx::query(include_str!("../queries/set_cover_pointer.sql"))
            .bind(pointer)
            .bind(now().unix_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::EntryNotFound(id.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Genres
    // =========================================================================

    pub async fn genres(&self, id: impl AsRef<str>) -> Result<Vec<String>> {
        let genres: Vec<String> = sqlx::query_scalar(include_str!("../queries/get_genres.sql"))
            .bind(id.as_ref())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(genres)
    }

    /// Replace an entry's genre tags.
    pub async fn set_genres<S: AsRef<str>>(&self, id: impl AsRef<str>, genres: &[S]) -> Result<()> {
        let id = id.as_ref();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/delete_genres.sql"))
            .bind(id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for genre in genres.iter().map(|g| g.as_ref().trim()).filter(|g| !g.is_empty()) {
            sqlx::query(include_str!("../queries/insert_genre.sql"))
                .bind(id)
                .bind(genre)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Profile
    // =========================================================================

    pub async fn profile(&self) -> Result<Profile> {
        let profile: Option<Profile> = sqlx::query_as(include_str!("../queries/get_profile.sql"))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(profile.unwrap_or_default())
    }

    pub async fn set_profile(&self, profile: &Profile) -> Result<()> {
        sqlx::query(include_str!("../queries/set_profile.sql"))
            .bind(profile.username.as_deref())
            .bind(profile.avatar_path.as_deref())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let repo = repo().await;
        let entry = LibraryEntry::new("vinland", "Vinland Saga")
            .with_status(Status::Completed)
            .with_progress(214, Some(214))
            .with_cover_source("http://x/vinland.jpg");
        repo.upsert_entry(&entry).await.unwrap();
        assert_eq!(repo.get_entry("vinland").await.unwrap(), Some(entry));
        assert_eq!(repo.get_entry("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_keeps_creation_date() {
        let repo = repo().await;
        let mut entry = LibraryEntry::new("a", "A");
        repo.upsert_entry(&entry).await.unwrap();
        let created = entry.created_at;
        entry.name = "A (renamed)".to_string();
        entry.created_at = created + time::Duration::days(1);
        repo.upsert_entry(&entry).await.unwrap();
        let stored = repo.get_entry("a").await.unwrap().unwrap();
        assert_eq!(stored.name, "A (renamed)");
        assert_eq!(stored.created_at, created);
    }

    #[tokio::test]
    async fn test_list_puts_pinned_first() {
        let repo = repo().await;
        let mut pinned = LibraryEntry::new("b", "B");
        pinned.is_pinned = true;
        repo.upsert_entry(&LibraryEntry::new("a", "A")).await.unwrap();
        repo.upsert_entry(&pinned).await.unwrap();
        let ids = repo.list_entries().await.unwrap().into_iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_set_cover_pointer() {
        let repo = repo().await;
        repo.upsert_entry(&LibraryEntry::new("a", "A")).await.unwrap();
        repo.set_cover_pointer("a", Some("/covers/a.jpg")).await.unwrap();
        let entry = repo.get_entry("a").await.unwrap().unwrap();
        assert_eq!(entry.cover_pointer.as_deref(), Some("/covers/a.jpg"));

        repo.set_cover_pointer("a", None).await.unwrap();
        assert_eq!(repo.get_entry("a").await.unwrap().unwrap().cover_pointer, None);
    }

    #[tokio::test]
    async fn test_set_cover_pointer_on_missing_entry() {
        let repo = repo().await;
        let err = repo.set_cover_pointer("ghost", Some("/covers/ghost.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::EntryNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_genres_replace_and_cascade() {
        let repo = repo().await;
        repo.upsert_entry(&LibraryEntry::new("a", "A")).await.unwrap();
        repo.set_genres("a", &["seinen", "action", " ", "action"]).await.unwrap();
        assert_eq!(repo.genres("a").await.unwrap(), vec!["action", "seinen"]);
        repo.set_genres("a", &["drama"]).await.unwrap();
        assert_eq!(repo.genres("a").await.unwrap(), vec!["drama"]);

        assert!(repo.delete_entry("a").await.unwrap());
        assert!(repo.genres("a").await.unwrap().is_empty());
        assert!(!repo.delete_entry("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_profile() {
        let repo = repo().await;
        assert_eq!(repo.profile().await.unwrap(), Profile::default());
        let profile = Profile { username: Some("reader".into()), avatar_path: Some("/avatars/me.png".into()) };
        repo.set_profile(&profile).await.unwrap();
        assert_eq!(repo.profile().await.unwrap(), profile);
    }
}
