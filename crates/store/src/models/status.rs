use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

/// Publication status of a tracked series.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
}
impl Status {
    /// The value stored in the `entries.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ongoing => "ongoing",
            Status::Completed => "completed",
            Status::Hiatus => "hiatus",
            Status::Cancelled => "cancelled",
        }
    }
}
impl FromStr for Status {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "ongoing" | "publishing" => Self::Ongoing,
            "completed" | "finished" => Self::Completed,
            "hiatus" | "on hiatus" => Self::Hiatus,
            "cancelled" | "canceled" | "discontinued" => Self::Cancelled,
            _ => exn::bail!(ErrorKind::InvalidData("status")),
        })
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
