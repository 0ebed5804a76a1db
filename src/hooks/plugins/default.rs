use crate::error::Result;
use crate::hooks::{HookContext, HookLifecycle, Outcome};
use crate::pr;
use crate::types::{Changes, RepoType};

/// Always-on baseline: records what a push did and keeps the pull
/// requests opened from the pushed branches in sync.
pub struct DefaultHook;

impl HookLifecycle for DefaultHook {
    fn post_receive(&self, ctx: &HookContext<'_>, changes: &Changes) -> Result<Outcome> {
        let mut stale = Vec::new();
        for (refname, update) in changes.iter() {
            if update.is_create() {
                tracing::info!(
                    "{}: created {} at {}",
                    ctx.project.fullname(),
                    refname,
                    update.new_rev
                );
            } else if update.is_delete() {
                tracing::info!("{}: deleted {}", ctx.project.fullname(), refname);
            } else {
                tracing::info!(
                    "{}: {} moved from {} to {}",
                    ctx.project.fullname(),
                    refname,
                    update.old_rev,
                    update.new_rev
                );
            }

            if ctx.repo_type != RepoType::Main || update.is_delete() {
                continue;
            }
            let Some(branch) = refname.strip_prefix("refs/heads/") else {
                continue;
            };
            for request in ctx.store.open_pull_requests_from(ctx.project.id, branch)? {
                match pr::sync_pull_request(ctx.config, ctx.store, &request) {
                    Ok(feasibility) => {
                        ctx.store.set_pull_request_merge_status(
                            &request.uid,
                            Some(feasibility.as_str()),
                        )?;
                        tracing::debug!(
                            "Pull request #{} resynced, merge status {}",
                            request.id,
                            feasibility.as_str()
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Could not resync pull request #{}: {}", request.id, e);
                        stale.push(format!("pull request #{} left stale: {}", request.id, e));
                    }
                }
            }
        }
        if stale.is_empty() {
            Ok(Outcome::Continue)
        } else {
            Ok(Outcome::Degraded(stale.join("; ")))
        }
    }
}
