mod entry;
mod profile;
mod status;

pub use self::entry::LibraryEntry;
pub(crate) use self::entry::{EntryRow, now};
pub use self::profile::Profile;
pub use self::status::Status;
