pub mod path;
mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface of the authorization and hook
/// engine. Everything the hooks decide on comes through here.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Project operations
    fn create_project(&self, project: &Project) -> Result<i64>;
    fn get_project(
        &self,
        namespace: Option<&str>,
        name: &str,
        fork_owner: Option<&str>,
    ) -> Result<Option<Project>>;
    fn get_project_by_id(&self, id: i64) -> Result<Option<Project>>;
    fn list_projects(&self) -> Result<Vec<Project>>;

    // User and group operations
    fn create_user(&self, user: &User) -> Result<i64>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn create_group(&self, group: &Group) -> Result<i64>;
    fn list_groups(&self) -> Result<Vec<Group>>;
    fn group_members(&self, group_id: i64) -> Result<Vec<User>>;
    fn add_group_member(&self, group_id: i64, user_id: i64) -> Result<()>;

    // Access grants
    fn set_project_user(&self, project_id: i64, user_id: i64, access: AccessLevel) -> Result<()>;
    fn set_project_group(&self, project_id: i64, group_id: i64, access: AccessLevel) -> Result<()>;
    /// Highest access a user holds on a project, through ownership, a direct
    /// grant, or any group membership.
    fn user_access(&self, project: &Project, username: &str) -> Result<Option<AccessLevel>>;
    fn users_with_access(&self, project_id: i64, levels: &[AccessLevel]) -> Result<Vec<User>>;
    fn groups_with_access(&self, project_id: i64, levels: &[AccessLevel]) -> Result<Vec<Group>>;

    // Deploy keys
    fn create_deploy_key(&self, key: &DeployKey) -> Result<i64>;
    fn deploy_keys(&self, project_id: i64) -> Result<Vec<DeployKey>>;

    // Pull request operations
    fn create_pull_request(&self, pr: &PullRequest) -> Result<i64>;
    fn get_pull_request_by_uid(&self, uid: &str) -> Result<Option<PullRequest>>;
    /// Open pull requests fed by the given source project and branch.
    fn open_pull_requests_from(
        &self,
        project_from_id: i64,
        branch_from: &str,
    ) -> Result<Vec<PullRequest>>;
    fn set_pull_request_merge_status(&self, uid: &str, merge_status: Option<&str>) -> Result<()>;

    // Hook activation and audit
    fn hook_active(&self, project_id: i64, hook: &str) -> Result<bool>;
    fn set_hook_active(&self, project_id: i64, hook: &str, active: bool) -> Result<()>;
    fn record_rejection(
        &self,
        project_id: i64,
        username: &str,
        refname: &str,
        reason: &str,
    ) -> Result<()>;

    fn close(&self) -> Result<()>;
}
