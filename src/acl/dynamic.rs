use super::{AclContext, AclTarget, AuthBackend, pr_only_enforced};
use crate::config::Config;
use crate::error::Result;
use crate::store::Store;
use crate::types::{Project, RepoType};

/// Dynamic backend: answers per ref at push time, straight from the
/// database. Nothing is compiled and nothing persists between pushes.
pub struct DynamicAuth {
    config: Config,
}

impl DynamicAuth {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl AuthBackend for DynamicAuth {
    fn name(&self) -> &'static str {
        "portcullis"
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn generate_acls(
        &self,
        _store: &dyn Store,
        _target: AclTarget<'_>,
        _group: Option<&str>,
    ) -> Result<()> {
        tracing::debug!("Dynamic ACLs, nothing to generate");
        Ok(())
    }

    fn remove_acls(&self, _store: &dyn Store, _project: &Project) -> Result<()> {
        tracing::debug!("Dynamic ACLs, nothing to remove");
        Ok(())
    }

    fn check_acl(&self, store: &dyn Store, ctx: &AclContext<'_>) -> Result<bool> {
        // The platform acting on its own behalf is never restricted.
        if ctx.is_internal {
            tracing::debug!("Internal push to {}, allowed", ctx.project.fullname());
            return Ok(true);
        }

        if ctx.repo_type == RepoType::Main
            && pr_only_enforced(&self.config, ctx.project)
            && ctx.pull_request.is_none()
        {
            // git relays hook stdout to the pusher.
            println!(
                "Direct push to {} is not allowed, please open a pull request",
                ctx.refname
            );
            tracing::info!(
                "Denying direct push to {} by {}: pull-request workflow enforced",
                ctx.project.fullname(),
                ctx.username
            );
            return Ok(false);
        }

        let mut allowed = store
            .user_access(ctx.project, ctx.username)?
            .is_some_and(|level| level.can_commit());

        // A deploy key pushes under its synthetic identity; its own flag
        // decides, it does not add to a user tier.
        for key in store.deploy_keys(ctx.project.id)? {
            if key.identity(ctx.project) == ctx.username {
                allowed = key.push_access;
                break;
            }
        }

        if !allowed {
            println!(
                "Denied push to {} for user {}",
                ctx.refname, ctx.username
            );
        }
        tracing::debug!(
            "Push to {} ({}) by {}: {}",
            ctx.project.fullname(),
            ctx.refname,
            ctx.username,
            if allowed { "allowed" } else { "denied" }
        );
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn seeded_store(temp: &TempDir) -> (SqliteStore, Project) {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let id = store
            .create_project(&Project {
                id: 0,
                name: "test".to_string(),
                namespace: None,
                owner: "pingou".to_string(),
                is_fork: false,
                private: false,
                settings: ProjectSettings::default(),
                replica_region: None,
                created_at: Utc::now(),
            })
            .unwrap();
        let project = store.get_project_by_id(id).unwrap().unwrap();

        let foo = store
            .create_user(&User {
                id: 0,
                username: "foo".to_string(),
                fullname: String::new(),
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .set_project_user(id, foo, AccessLevel::Commit)
            .unwrap();

        let bar = store
            .create_user(&User {
                id: 0,
                username: "bar".to_string(),
                fullname: String::new(),
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .set_project_user(id, bar, AccessLevel::Ticket)
            .unwrap();

        (store, project)
    }

    fn ctx<'a>(project: &'a Project, username: &'a str) -> AclContext<'a> {
        AclContext {
            project,
            username,
            refname: "refs/heads/master",
            repo_type: RepoType::Main,
            old_rev: "0000000000000000000000000000000000000000",
            new_rev: "1111111111111111111111111111111111111111",
            is_update: false,
            is_internal: false,
            pull_request: None,
        }
    }

    #[test]
    fn test_commit_tier_required() {
        let temp = TempDir::new().unwrap();
        let (store, project) = seeded_store(&temp);
        let auth = DynamicAuth::new(Config::default());

        assert!(auth.check_acl(&store, &ctx(&project, "pingou")).unwrap());
        assert!(auth.check_acl(&store, &ctx(&project, "foo")).unwrap());
        // Ticket tier cannot push.
        assert!(!auth.check_acl(&store, &ctx(&project, "bar")).unwrap());
        assert!(!auth.check_acl(&store, &ctx(&project, "stranger")).unwrap());
    }

    #[test]
    fn test_internal_push_always_allowed() {
        let temp = TempDir::new().unwrap();
        let (store, project) = seeded_store(&temp);
        let auth = DynamicAuth::new(Config::default());

        let mut c = ctx(&project, "stranger");
        c.is_internal = true;
        assert!(auth.check_acl(&store, &c).unwrap());
    }

    #[test]
    fn test_pull_request_only_denies_direct_push() {
        let temp = TempDir::new().unwrap();
        let (store, mut project) = seeded_store(&temp);
        project.settings.pull_request_only = true;
        let auth = DynamicAuth::new(Config::default());

        // Even the owner cannot push directly to the main repository.
        assert!(!auth.check_acl(&store, &ctx(&project, "pingou")).unwrap());

        // A push carrying its pull request is evaluated normally.
        let pr = PullRequest {
            id: 1,
            uid: PullRequest::new_uid(),
            project_id: project.id,
            project_from_id: None,
            branch: "master".to_string(),
            branch_from: "feature".to_string(),
            user: "foo".to_string(),
            status: PullRequestStatus::Open,
            merge_status: None,
            created_at: Utc::now(),
        };
        let mut c = ctx(&project, "pingou");
        c.pull_request = Some(&pr);
        assert!(auth.check_acl(&store, &c).unwrap());

        // Other repository types are untouched by the enforcement.
        let mut c = ctx(&project, "pingou");
        c.repo_type = RepoType::Docs;
        assert!(auth.check_acl(&store, &c).unwrap());
    }

    #[test]
    fn test_deploy_key_overrides_tier() {
        let temp = TempDir::new().unwrap();
        let (store, project) = seeded_store(&temp);
        let auth = DynamicAuth::new(Config::default());

        let push_key = store
            .create_deploy_key(&DeployKey {
                id: 0,
                project_id: project.id,
                push_access: true,
                description: Some("deploy".to_string()),
                created_at: Utc::now(),
            })
            .unwrap();
        let read_key = store
            .create_deploy_key(&DeployKey {
                id: 0,
                project_id: project.id,
                push_access: false,
                description: Some("mirror".to_string()),
                created_at: Utc::now(),
            })
            .unwrap();

        let push_identity = format!("deploykey_test_{push_key}");
        let read_identity = format!("deploykey_test_{read_key}");

        assert!(auth.check_acl(&store, &ctx(&project, &push_identity)).unwrap());
        // A read-only key never pushes, whatever else matches.
        assert!(!auth.check_acl(&store, &ctx(&project, &read_identity)).unwrap());
    }
}
