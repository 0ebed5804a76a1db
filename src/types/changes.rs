use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The three lifecycle points git gives a server around one push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    PreReceive,
    Update,
    PostReceive,
}

impl HookType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreReceive => "pre-receive",
            Self::Update => "update",
            Self::PostReceive => "post-receive",
        }
    }

    /// pre-receive and post-receive read change lines from stdin; update
    /// gets exactly one ref as positional arguments.
    #[must_use]
    pub const fn reads_stdin(self) -> bool {
        matches!(self, Self::PreReceive | Self::PostReceive)
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pre-receive" => Ok(Self::PreReceive),
            "update" => Ok(Self::Update),
            "post-receive" => Ok(Self::PostReceive),
            other => Err(Error::Config(format!("unknown hook type: {other}"))),
        }
    }
}

/// One ref's movement within a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub old_rev: String,
    pub new_rev: String,
}

fn is_zero_rev(rev: &str) -> bool {
    !rev.is_empty() && rev.bytes().all(|b| b == b'0')
}

impl RefUpdate {
    #[must_use]
    pub fn new(old_rev: impl Into<String>, new_rev: impl Into<String>) -> Self {
        Self {
            old_rev: old_rev.into(),
            new_rev: new_rev.into(),
        }
    }

    /// An all-zero old rev marks a ref being created.
    #[must_use]
    pub fn is_create(&self) -> bool {
        is_zero_rev(&self.old_rev)
    }

    /// An all-zero new rev marks a ref being deleted.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        is_zero_rev(&self.new_rev)
    }
}

/// The set of refs one push touches, keyed by ref name.
///
/// Backed by a BTreeMap so iteration order is deterministic; plugins and
/// legacy scripts observe refs in the same order on every run. The set is
/// only ever mutated by dropping refs the ACL pass denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    refs: BTreeMap<String, RefUpdate>,
}

impl Changes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `"<old-rev> <new-rev> <ref-name>"` lines as fed to
    /// pre-receive/post-receive on stdin.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut changes = Self::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.trim_end().splitn(3, ' ');
            match (fields.next(), fields.next(), fields.next()) {
                (Some(old), Some(new), Some(refname))
                    if !old.is_empty() && !new.is_empty() && !refname.is_empty() =>
                {
                    changes.insert(refname, RefUpdate::new(old, new));
                }
                _ => return Err(Error::MalformedChange(line)),
            }
        }
        Ok(changes)
    }

    /// The single-entry set an update hook invocation carries.
    #[must_use]
    pub fn from_ref(refname: &str, old_rev: &str, new_rev: &str) -> Self {
        let mut changes = Self::new();
        changes.insert(refname, RefUpdate::new(old_rev, new_rev));
        changes
    }

    pub fn insert(&mut self, refname: &str, update: RefUpdate) {
        self.refs.insert(refname.to_string(), update);
    }

    pub fn remove(&mut self, refname: &str) -> Option<RefUpdate> {
        self.refs.remove(refname)
    }

    #[must_use]
    pub fn get(&self, refname: &str) -> Option<&RefUpdate> {
        self.refs.get(refname)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RefUpdate)> {
        self.refs.iter().map(|(name, update)| (name.as_str(), update))
    }

    pub fn ref_names(&self) -> impl Iterator<Item = &str> {
        self.refs.keys().map(String::as_str)
    }

    /// Renders the stdin payload handed to legacy pre-receive/post-receive
    /// scripts, one `"<old> <new> <ref>\n"` line per ref.
    #[must_use]
    pub fn to_stdin_payload(&self) -> String {
        let mut payload = String::new();
        for (refname, update) in self.iter() {
            payload.push_str(&update.old_rev);
            payload.push(' ');
            payload.push_str(&update.new_rev);
            payload.push(' ');
            payload.push_str(refname);
            payload.push('\n');
        }
        payload
    }
}

impl<'a> IntoIterator for &'a Changes {
    type Item = (&'a String, &'a RefUpdate);
    type IntoIter = std::collections::btree_map::Iter<'a, String, RefUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.refs.iter()
    }
}
