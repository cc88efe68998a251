//! The four disjoint namespaces a URL moves through during a crawl
//!
//! Normal flow is `Todo -> Doing -> Done | Trash`. The only ways back are the
//! administrative redo (`Doing | Trash -> Todo`) and a transient-failure
//! requeue (`Doing -> Todo`).

use std::fmt;

/// Represents which set a canonical URL currently belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Discovered and waiting to be claimed
    Todo,

    /// Claimed by a worker; fetch in flight
    Doing,

    /// Fetched successfully; the value holds the extraction result
    Done,

    /// Failed terminally or ran out of attempts
    Trash,
}

impl Namespace {
    /// Every namespace, in lifecycle order
    pub const ALL: [Namespace; 4] = [Self::Todo, Self::Doing, Self::Done, Self::Trash];

    /// Returns the name used for this namespace in store keys and columns
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
            Self::Trash => "trash",
        }
    }

    /// Parses a namespace from its store name
    ///
    /// Returns None if the string doesn't match any namespace.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "doing" => Some(Self::Doing),
            "done" => Some(Self::Done),
            "trash" => Some(Self::Trash),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
