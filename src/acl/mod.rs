mod dynamic;
mod gitolite;

pub use dynamic::DynamicAuth;
pub use gitolite::GitoliteAuth;

use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Project, PullRequest, RepoType};

/// Scope of an ACL regeneration.
#[derive(Debug, Clone, Copy)]
pub enum AclTarget<'a> {
    /// Rebuild the whole configuration from the project directory.
    All,
    /// Leave the configuration untouched, only rerun the compiler.
    RecompileOnly,
    /// Rewrite the stanzas of a single project, preserving the rest.
    Project(&'a Project),
}

/// One ref of one push, as seen by a dynamic backend.
#[derive(Debug, Clone, Copy)]
pub struct AclContext<'a> {
    pub project: &'a Project,
    /// Identity doing the push; may be a deploy key's synthetic name.
    pub username: &'a str,
    pub refname: &'a str,
    pub repo_type: RepoType,
    pub old_rev: &'a str,
    pub new_rev: &'a str,
    /// True for the per-ref update hook, false for whole-push pre-receive.
    pub is_update: bool,
    /// The platform pushing on its own behalf.
    pub is_internal: bool,
    pub pull_request: Option<&'a PullRequest>,
}

/// An authorization backend. Static backends materialize their decisions
/// into an external compiler's configuration; dynamic backends answer per
/// push and persist nothing.
pub trait AuthBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_dynamic(&self) -> bool {
        false
    }

    /// Regenerate the ACLs for the given scope. `group`, when set, limits
    /// the group-table rewrite to that single group.
    fn generate_acls(
        &self,
        store: &dyn Store,
        target: AclTarget<'_>,
        group: Option<&str>,
    ) -> Result<()>;

    /// Drop a deleted project from the ACLs.
    fn remove_acls(&self, store: &dyn Store, project: &Project) -> Result<()>;

    /// Per-ref allow/deny. Only dynamic backends answer.
    fn check_acl(&self, store: &dyn Store, ctx: &AclContext<'_>) -> Result<bool> {
        let _ = (store, ctx);
        Err(Error::UnsupportedOperation {
            operation: "check_acl",
            backend: self.name(),
        })
    }
}

/// Whether direct pushes to the main repository are off limits. The
/// instance-wide switch spares forks, otherwise nobody could feed a pull
/// request; an explicit project setting always wins.
pub(crate) fn pr_only_enforced(config: &Config, project: &Project) -> bool {
    project.settings.pull_request_only || (config.pull_request_only && !project.is_fork)
}

/// Resolves backend names to shared instances. Exactly one instance is
/// cached, keyed by the last-resolved name; asking for a different name
/// drops the previous one.
pub struct AuthRegistry {
    config: Config,
    cached: Mutex<Option<(String, Arc<dyn AuthBackend>)>>,
}

impl AuthRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
        }
    }

    /// Resolve a backend by name, or by the configured default when no name
    /// is given.
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn AuthBackend>> {
        let name = name.unwrap_or(&self.config.git_auth_backend);

        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_name, backend)) = cached.as_ref() {
            if cached_name == name {
                return Ok(Arc::clone(backend));
            }
        }

        let backend = self.build(name)?;
        *cached = Some((name.to_string(), Arc::clone(&backend)));
        Ok(backend)
    }

    fn build(&self, name: &str) -> Result<Arc<dyn AuthBackend>> {
        match name {
            "gitolite" => Ok(Arc::new(GitoliteAuth::new(self.config.clone()))),
            "portcullis" => Ok(Arc::new(DynamicAuth::new(self.config.clone()))),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}
