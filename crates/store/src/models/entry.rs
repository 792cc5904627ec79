use crate::error::{Error, ErrorKind};
use crate::models::Status;
use exn::ResultExt;
use time::UtcDateTime;

/// A tracked series and everything the app remembers about it.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntry {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
    pub current_chapter: u32,
    pub total_chapters: Option<u32>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub is_adult: bool,
    pub is_pinned: bool,
    /// Where the artwork is cached on this device.
    ///
    /// Usually a local path. Entries saved straight from a catalog search still
    /// carry the remote URL here until the cover cache downloads it.
    pub cover_pointer: Option<String>,
    /// Where the artwork can be downloaded from.
    pub cover_source: Option<String>,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}
impl LibraryEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            status: Status::default(),
            current_chapter: 0,
            total_chapters: None,
            year: None,
            rating: None,
            is_adult: false,
            is_pinned: false,
            cover_pointer: None,
            cover_source: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_progress(mut self, current: u32, total: Option<u32>) -> Self {
        self.current_chapter = current;
        self.total_chapters = total;
        self
    }

    pub fn with_cover_source(mut self, source: impl Into<String>) -> Self {
        self.cover_source = Some(source.into());
        self
    }

    pub fn with_cover_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.cover_pointer = Some(pointer.into());
        self
    }

    pub fn has_cover_source(&self) -> bool {
        self.cover_source.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Current time at the precision the store keeps (whole seconds).
pub(crate) fn now() -> UtcDateTime {
    let now = UtcDateTime::now();
    now.replace_nanosecond(0).unwrap_or(now)
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) status: String,
    pub(crate) current_chapter: i64,
    pub(crate) total_chapters: Option<i64>,
    pub(crate) year: Option<i64>,
    pub(crate) rating: Option<f64>,
    pub(crate) is_adult: bool,
    pub(crate) is_pinned: bool,
    pub(crate) cover_path: Option<String>,
    pub(crate) cover_source: Option<String>,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}
impl From<&LibraryEntry> for EntryRow {
    fn from(entry: &LibraryEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            description: entry.description.clone(),
            status: entry.status.as_str().to_string(),
            current_chapter: i64::from(entry.current_chapter),
            total_chapters: entry.total_chapters.map(i64::from),
            year: entry.year.map(i64::from),
            rating: entry.rating,
            is_adult: entry.is_adult,
            is_pinned: entry.is_pinned,
            cover_path: entry.cover_pointer.clone(),
            cover_source: entry.cover_source.clone(),
            created_at: entry.created_at.unix_timestamp(),
            updated_at: entry.updated_at.unix_timestamp(),
        }
    }
}
impl TryFrom<EntryRow> for LibraryEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            status: row.status.parse()?,
            current_chapter: u32::try_from(row.current_chapter).or_raise(|| ErrorKind::InvalidData("current chapter"))?,
            total_chapters: row
                .total_chapters
                .map(u32::try_from)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("total chapters"))?,
            year: row.year.map(i32::try_from).transpose().or_raise(|| ErrorKind::InvalidData("year"))?,
            rating: row.rating,
            is_adult: row.is_adult,
            is_pinned: row.is_pinned,
            cover_pointer: row.cover_path,
            cover_source: row.cover_source,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            updated_at: UtcDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::InvalidData("update date"))?,
        })
    }
}
