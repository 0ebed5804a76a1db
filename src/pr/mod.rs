mod sync;

pub use sync::sync_pull_request;

use std::fmt;

/// How a synchronized pull request would land on its target branch. The
/// strings are the vocabulary persisted on the request record; advisory
/// only and recomputed on every sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeFeasibility {
    /// Tips are identical, or the source is already contained.
    NoChange,
    /// The target can move straight to the source tip.
    FastForward,
    /// A three-way merge would leave conflict markers.
    Conflicts,
    /// Clean three-way merge, needs a merge commit.
    Merge,
}

impl MergeFeasibility {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoChange => "NO_CHANGE",
            Self::FastForward => "FFORWARD",
            Self::Conflicts => "CONFLICTS",
            Self::Merge => "MERGE",
        }
    }
}

impl fmt::Display for MergeFeasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The target-repository ref mirroring a pull request's source tip.
#[must_use]
pub fn pull_ref(id: i64) -> String {
    format!("refs/pull/{id}/head")
}
