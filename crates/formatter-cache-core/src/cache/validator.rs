use chrono::{DateTime, Utc};

use super::entry::CacheEntry;

/// Decides whether a stored entry may be served as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Accepts entries rendered from a record state at least as new as the
    /// reference change date.
    ChangeDate(DateTime<Utc>),
    /// Rejects everything. Used when the record's change date is unknown.
    NoCache,
}

impl Validator {
    pub fn accepts(&self, entry: &CacheEntry) -> bool {
        match self {
            Self::ChangeDate(reference) => entry.change_date >= *reference,
            Self::NoCache => false,
        }
    }

    /// Validator for an optional change signal
    pub fn from_change_date(change_date: Option<DateTime<Utc>>) -> Self {
        change_date.map_or(Self::NoCache, Self::ChangeDate)
    }
}
