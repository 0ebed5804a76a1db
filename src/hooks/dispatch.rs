use std::fmt;
use std::path::Path;

use crate::acl::{AclContext, AuthRegistry};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hooks::{HookContext, HookRegistry, Outcome, run_legacy_hooks};
use crate::store::Store;
use crate::store::path::parse_git_dir;
use crate::types::{Changes, HookType};

/// Identity and markers git carries through the hook environment.
#[derive(Debug, Clone, Default)]
pub struct PushInfo {
    pub username: String,
    /// The platform pushing on its own behalf (`internal=yes`).
    pub is_internal: bool,
    /// UID of the pull request this push realizes, if any.
    pub pull_request_uid: Option<String>,
}

/// Where a dispatch is in its lifecycle. Advances linearly; `Aborted` is
/// terminal from any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    AclChecked,
    PluginsRun,
    LegacyRun,
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::AclChecked => "acl-checked",
            Self::PluginsRun => "plugins-run",
            Self::LegacyRun => "legacy-run",
            Self::Done => "done",
            Self::Aborted => "aborted",
        })
    }
}

/// What a completed dispatch did. Returned on acceptance; an aborted
/// dispatch carries its reason in the error instead.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub phase: Option<Phase>,
    /// Refs the ACL pass dropped (update hook only; pre-receive aborts).
    pub denied_refs: Vec<String>,
    /// Plugin degradations, `name: reason`. Logged, never push-fatal.
    pub degraded: Vec<String>,
}

/// Runs one hook invocation through its phases: ACL pass, typed plugins,
/// legacy scripts, failure aggregation.
pub struct Dispatcher<'a> {
    config: &'a Config,
    registry: &'a HookRegistry,
    auth: &'a AuthRegistry,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a Config, registry: &'a HookRegistry, auth: &'a AuthRegistry) -> Self {
        Self {
            config,
            registry,
            auth,
        }
    }

    /// Dispatch one hook invocation. The store is closed on every exit
    /// path, accepted or aborted.
    pub fn run(
        &self,
        store: &dyn Store,
        hook_type: HookType,
        git_dir: &Path,
        push: &PushInfo,
        changes: Changes,
    ) -> Result<DispatchReport> {
        let result = self.dispatch(store, hook_type, git_dir, push, changes);
        if let Err(e) = store.close() {
            tracing::error!("Failed to close the store: {e}");
        }
        result
    }

    fn dispatch(
        &self,
        store: &dyn Store,
        hook_type: HookType,
        git_dir: &Path,
        push: &PushInfo,
        mut changes: Changes,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let enter = |report: &mut DispatchReport, phase: Phase| {
            report.phase = Some(phase);
            tracing::debug!("{} dispatch for {}: {}", hook_type, git_dir.display(), phase);
        };
        enter(&mut report, Phase::Received);

        // Hooks get GIT_DIR relative to wherever git spawned them.
        let git_dir = git_dir.canonicalize()?;
        let repos_dir = self
            .config
            .repos_dir
            .canonicalize()
            .unwrap_or_else(|_| self.config.repos_dir.clone());

        let parsed = parse_git_dir(&repos_dir, &git_dir)?;
        let project = store
            .get_project(
                parsed.namespace.as_deref(),
                &parsed.name,
                parsed.fork_owner.as_deref(),
            )?
            .ok_or_else(|| Error::NotFound(format!("no project for {}", git_dir.display())))?;
        let repo_type = parsed.repo_type;

        let pull_request = match &push.pull_request_uid {
            Some(uid) => store.get_pull_request_by_uid(uid)?,
            None => None,
        };

        // Internal pushes, static backends and post-receive (never
        // re-checked after acceptance) skip the ACL pass.
        let backend = self.auth.get(None)?;
        if backend.is_dynamic() && !push.is_internal && hook_type != HookType::PostReceive {
            let mut denied: Vec<String> = Vec::new();
            for (refname, change) in changes.iter() {
                let ctx = AclContext {
                    project: &project,
                    username: &push.username,
                    refname,
                    repo_type,
                    old_rev: &change.old_rev,
                    new_rev: &change.new_rev,
                    is_update: hook_type == HookType::Update,
                    is_internal: push.is_internal,
                    pull_request: pull_request.as_ref(),
                };
                if !backend.check_acl(store, &ctx)? {
                    denied.push(refname.to_string());
                }
            }
            for refname in &denied {
                tracing::info!("Denied push to {} for user {}", refname, push.username);
                changes.remove(refname);
                store.record_rejection(project.id, &push.username, refname, "access denied")?;
            }
            // One denied ref vetoes a whole pre-receive; update only loses
            // its own ref.
            if (hook_type == HookType::PreReceive && !denied.is_empty()) || changes.is_empty() {
                enter(&mut report, Phase::Aborted);
                let reason = if denied.is_empty() {
                    "no refs left to push".to_string()
                } else {
                    format!(
                        "Push denied for user {} on: {}",
                        push.username,
                        denied.join(", ")
                    )
                };
                return Err(Error::PolicyDenied(reason));
            }
            report.denied_refs = denied;
        }
        enter(&mut report, Phase::AclChecked);

        // Plugins run in registration order.
        let ctx = HookContext {
            config: self.config,
            store,
            project: &project,
            repo_type,
            repo_path: &git_dir,
            username: &push.username,
            is_internal: push.is_internal,
            pull_request: pull_request.as_ref(),
        };
        let mut failures: Vec<String> = Vec::new();
        for plugin in self.registry.enabled_for(store, &project)? {
            let Some(lifecycle) = &plugin.lifecycle else {
                continue;
            };
            let outcome = match hook_type {
                HookType::PreReceive => lifecycle.pre_receive(&ctx, &changes),
                HookType::PostReceive => lifecycle.post_receive(&ctx, &changes),
                HookType::Update => {
                    let (refname, change) = changes
                        .iter()
                        .next()
                        .ok_or_else(|| Error::Config("update hook without a ref".to_string()))?;
                    lifecycle.update(&ctx, refname, change)
                }
            };

            match outcome {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Degraded(reason)) => {
                    tracing::warn!(
                        "Hook {} degraded on {}: {}",
                        plugin.name,
                        project.fullname(),
                        reason
                    );
                    report.degraded.push(format!("{}: {}", plugin.name, reason));
                }
                Ok(Outcome::Abort(reason)) => {
                    if hook_type == HookType::PostReceive {
                        // The push is already accepted; record, never undo.
                        tracing::error!(
                            "Hook {} failed after acceptance on {}: {}",
                            plugin.name,
                            project.fullname(),
                            reason
                        );
                        failures.push(format!("{}: {}", plugin.name, reason));
                    } else {
                        for refname in changes.ref_names() {
                            store.record_rejection(project.id, &push.username, refname, &reason)?;
                        }
                        enter(&mut report, Phase::Aborted);
                        return Err(Error::PolicyDenied(reason));
                    }
                }
                Err(e) => {
                    if hook_type == HookType::PreReceive && !self.config.hook_debug {
                        enter(&mut report, Phase::Aborted);
                        return Err(Error::Plugin {
                            plugin: plugin.name.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    tracing::error!("Hook {} raised during {}: {}", plugin.name, hook_type, e);
                }
            }
        }
        enter(&mut report, Phase::PluginsRun);

        // Replicated hosting arranges its hooks externally; there are no
        // legacy files on disk to run.
        if project.is_replicated() {
            tracing::debug!(
                "Project {} is replicated, skipping legacy hooks",
                project.fullname()
            );
        } else {
            for failure in run_legacy_hooks(hook_type, &git_dir, &changes) {
                failures.push(format!("{} ({})", failure.script.display(), failure.detail));
            }
        }
        enter(&mut report, Phase::LegacyRun);

        if failures.is_empty() {
            enter(&mut report, Phase::Done);
            Ok(report)
        } else {
            enter(&mut report, Phase::Aborted);
            Err(Error::PushRejected(failures.join("; ")))
        }
    }
}
