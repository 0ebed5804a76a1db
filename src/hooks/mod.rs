mod dispatch;
mod legacy;
mod plugins;

pub use dispatch::{DispatchReport, Dispatcher, Phase, PushInfo};
pub use legacy::{LegacyFailure, run_legacy_hooks};

use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::store::Store;
use crate::types::{Changes, Project, PullRequest, RefUpdate, RepoType};

/// What a lifecycle call decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// Something went wrong but the push is not at fault; logged only.
    Degraded(String),
    /// Reject the push (pre-receive) or the ref (update) with this reason.
    Abort(String),
}

/// Everything a lifecycle call may consult.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    pub config: &'a Config,
    pub store: &'a dyn Store,
    pub project: &'a Project,
    pub repo_type: RepoType,
    /// The bare repository being pushed to.
    pub repo_path: &'a Path,
    pub username: &'a str,
    pub is_internal: bool,
    pub pull_request: Option<&'a PullRequest>,
}

/// Typed lifecycle callbacks. Every method defaults to a no-op; a plugin
/// implements the phases it cares about.
pub trait HookLifecycle: Send + Sync {
    fn pre_receive(&self, ctx: &HookContext<'_>, changes: &Changes) -> Result<Outcome> {
        let _ = (ctx, changes);
        Ok(Outcome::Continue)
    }

    fn update(&self, ctx: &HookContext<'_>, refname: &str, change: &RefUpdate) -> Result<Outcome> {
        let _ = (ctx, refname, change);
        Ok(Outcome::Continue)
    }

    fn post_receive(&self, ctx: &HookContext<'_>, changes: &Changes) -> Result<Outcome> {
        let _ = (ctx, changes);
        Ok(Outcome::Continue)
    }
}

/// How a plugin decides it applies to a project.
pub enum Activation {
    /// The project's persisted hook switch, keyed by the plugin name.
    Setting,
    /// Evaluated directly, no persisted state.
    Predicate(fn(&Project) -> bool),
}

/// One registered plugin.
pub struct HookPlugin {
    pub name: &'static str,
    pub description: &'static str,
    pub activation: Activation,
    /// `None` marks a legacy-style plugin: no typed callbacks, only the
    /// file-based hook it installs.
    pub lifecycle: Option<Box<dyn HookLifecycle>>,
    pub installs_legacy_file: bool,
}

/// The fixed table of plugins, built once at startup. Dispatch order is
/// registration order.
pub struct HookRegistry {
    plugins: Vec<HookPlugin>,
}

impl HookRegistry {
    pub fn new(plugins: Vec<HookPlugin>) -> Self {
        Self { plugins }
    }

    /// Every plugin shipped with the platform.
    pub fn builtin() -> Self {
        Self::new(plugins::builtin())
    }

    pub fn plugins(&self) -> &[HookPlugin] {
        &self.plugins
    }

    /// The plugins active on this project, in registration order.
    pub fn enabled_for(&self, store: &dyn Store, project: &Project) -> Result<Vec<&HookPlugin>> {
        let mut enabled = Vec::new();
        for plugin in &self.plugins {
            let active = match plugin.activation {
                Activation::Predicate(applies) => applies(project),
                Activation::Setting => store.hook_active(project.id, plugin.name)?,
            };
            if active {
                enabled.push(plugin);
            }
        }
        Ok(enabled)
    }
}
