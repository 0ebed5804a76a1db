use std::fmt;

use serde::{Deserialize, Serialize};

/// AccessLevel is the per-project (or per-group) permission tier.
///
/// Tiers are hierarchical: `Admin` implies `Commit` implies `Ticket`. The
/// derived `Ord` follows that hierarchy, so `user_tier >= AccessLevel::Commit`
/// asks "can this user push".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Ticket,
    Commit,
    Admin,
}

impl AccessLevel {
    /// All tiers, lowest first.
    pub const ALL: [AccessLevel; 3] = [Self::Ticket, Self::Commit, Self::Admin];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Commit => "commit",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<AccessLevel> {
        match s {
            "ticket" => Some(Self::Ticket),
            "commit" => Some(Self::Commit),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Tiers matched by a "combine" query: this tier plus every higher one.
    #[must_use]
    pub fn combined(self) -> &'static [AccessLevel] {
        match self {
            Self::Ticket => &Self::ALL,
            Self::Commit => &[Self::Commit, Self::Admin],
            Self::Admin => &[Self::Admin],
        }
    }

    /// Tiers matched by an "exclusive" query: exactly this tier.
    #[must_use]
    pub fn exclusive(self) -> &'static [AccessLevel] {
        match self {
            Self::Ticket => &[Self::Ticket],
            Self::Commit => &[Self::Commit],
            Self::Admin => &[Self::Admin],
        }
    }

    /// True if this tier grants push access.
    #[must_use]
    pub fn can_commit(self) -> bool {
        self >= Self::Commit
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
