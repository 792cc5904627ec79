use crate::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Outcome of asking for a reconciliation pass.
#[derive(Debug)]
pub enum Pass {
    /// Another pass was already running; this trigger was dropped.
    Skipped,
    Completed(Reconciliation),
}
impl Pass {
    pub fn report(&self) -> Option<&Reconciliation> {
        match self {
            Self::Skipped => None,
            Self::Completed(report) => Some(report),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// What a completed pass did.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Entries handed to the pass.
    pub checked: usize,
    /// Covers downloaded, including those recovered on retry.
    pub downloaded: usize,
    /// Covers already cached under this device's key whose pointer named
    /// somewhere else. Only the pointer was rewritten.
    pub relinked: usize,
    /// Covers that failed the first sweep and succeeded on retry.
    pub recovered_on_retry: usize,
    /// Entries that failed both attempts. They stay stale until a later pass.
    pub failed: Vec<Failure>,
    /// Entries with a source that still need a download once the pass ends.
    pub remaining_stale: usize,
    /// Set only when the pass was driven by a pending sync flag.
    pub notice: Option<Notice>,
}

#[derive(Debug)]
pub struct Failure {
    pub id: String,
    pub error: Error,
}

/// The single user-facing message of a flag-driven pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Every cover is cached again; the sync flag was cleared.
    Restored,
    /// Some covers are still missing; the sync flag stays pending.
    Incomplete { remaining: usize },
}
impl Display for Notice {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Restored => write!(f, "All covers restored"),
            Self::Incomplete { remaining: 1 } => write!(f, "1 cover could not be restored yet"),
            Self::Incomplete { remaining } => write!(f, "{remaining} covers could not be restored yet"),
        }
    }
}
