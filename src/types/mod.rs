mod access;
mod changes;
mod models;

pub use access::AccessLevel;
pub use changes::{Changes, HookType, RefUpdate};
pub use models::{
    DeployKey, Group, Project, ProjectSettings, PullRequest, PullRequestStatus, RepoType, User,
    filesystem_safe,
};
