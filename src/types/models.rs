use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The repositories a project can own. Every project has a main code
/// repository; the others exist per project settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    Main,
    Docs,
    Tickets,
    Requests,
}

impl RepoType {
    pub const ALL: [RepoType; 4] = [Self::Main, Self::Docs, Self::Tickets, Self::Requests];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Docs => "docs",
            Self::Tickets => "tickets",
            Self::Requests => "requests",
        }
    }

    pub fn parse(s: &str) -> Option<RepoType> {
        match s {
            "main" => Some(Self::Main),
            "docs" => Some(Self::Docs),
            "tickets" => Some(Self::Tickets),
            "requests" => Some(Self::Requests),
            _ => None,
        }
    }

    /// Path prefix of this repo type under the repositories root; the main
    /// repository lives at the root itself.
    #[must_use]
    pub const fn path_prefix(self) -> Option<&'static str> {
        match self {
            Self::Main => None,
            Self::Docs => Some("docs"),
            Self::Tickets => Some("tickets"),
            Self::Requests => Some("requests"),
        }
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-project booleans persisted as a JSON column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Enforce the pull-request workflow: direct pushes to the main
    /// repository are denied unless they carry an attached pull request.
    pub pull_request_only: bool,
    /// Project owns a docs repository.
    pub documentation: bool,
    /// Project owns tickets and requests repositories.
    pub issue_tracker: bool,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            pull_request_only: false,
            documentation: true,
            issue_tracker: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Username of the owning user.
    pub owner: String,
    pub is_fork: bool,
    pub private: bool,
    pub settings: ProjectSettings,
    /// Region name when the repositories live on a sharded/replicated
    /// backend. Legacy file hooks are arranged externally there and are
    /// never run by the dispatcher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_region: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// The name the project's git repositories are known by: `name`,
    /// `namespace/name`, and for forks `forks/<owner>/...`.
    #[must_use]
    pub fn fullname(&self) -> String {
        let mut fullname = match &self.namespace {
            Some(ns) => format!("{ns}/{}", self.name),
            None => self.name.clone(),
        };
        if self.is_fork {
            fullname = format!("forks/{}/{fullname}", self.owner);
        }
        fullname
    }

    /// Repository name of one of this project's repo types, e.g.
    /// `docs/namespace/name`.
    #[must_use]
    pub fn repo_name(&self, repo_type: RepoType) -> String {
        match repo_type.path_prefix() {
            Some(prefix) => format!("{prefix}/{}", self.fullname()),
            None => self.fullname(),
        }
    }

    /// The repository types this project owns, per its settings. Main is
    /// always owned; docs and tickets/requests follow the settings flags.
    #[must_use]
    pub fn repo_types(&self) -> Vec<RepoType> {
        let mut types = vec![RepoType::Main];
        if self.settings.documentation {
            types.push(RepoType::Docs);
        }
        if self.settings.issue_tracker {
            types.push(RepoType::Tickets);
            types.push(RepoType::Requests);
        }
        types
    }

    #[must_use]
    pub fn is_replicated(&self) -> bool {
        self.replica_region.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub fullname: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A key granting repository access independent of any user account.
///
/// A deploy key binds to exactly one project and never to a user; the
/// binding is the row itself, there is no user-keyed variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployKey {
    pub id: i64,
    pub project_id: i64,
    pub push_access: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeployKey {
    /// The synthetic identity a deploy key pushes as. Stable across key
    /// renames; a project rename changes it and requires an ACL regen.
    #[must_use]
    pub fn identity(&self, project: &Project) -> String {
        format!(
            "deploykey_{}_{}",
            filesystem_safe(&project.fullname()),
            self.id
        )
    }
}

/// Replaces every character outside `[A-Za-z0-9._-]` with an underscore, so
/// project full names (which contain `/`) stay collision-free in identities
/// shared with the ACL compiler.
#[must_use]
pub fn filesystem_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestStatus {
    Open,
    Merged,
    Closed,
}

impl PullRequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Merged => "merged",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<PullRequestStatus> {
        match s {
            "open" => Some(Self::Open),
            "merged" => Some(Self::Merged),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// Stable numeric id; names the `refs/pull/<id>/head` ref.
    pub id: i64,
    pub uid: String,
    /// Target project.
    pub project_id: i64,
    /// Source project when the PR comes from a fork; None when the source
    /// branch lives in the target project itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_from_id: Option<i64>,
    /// Target branch.
    pub branch: String,
    /// Source branch.
    pub branch_from: String,
    /// Username of the opener.
    pub user: String,
    pub status: PullRequestStatus,
    /// Last computed merge feasibility, persisted by the platform. Advisory
    /// only; recomputed on every sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PullRequest {
    /// Fresh UID for a newly opened pull request.
    #[must_use]
    pub fn new_uid() -> String {
        Uuid::new_v4().simple().to_string()
    }
}
