use git2::{Oid, Repository};

use crate::error::Result;
use crate::hooks::{HookContext, HookLifecycle, Outcome};
use crate::types::{Changes, RefUpdate};

/// Keeps branch history append-only: no deletions, no rewinds.
pub struct BlockForcePush;

fn check(repo: &Repository, refname: &str, update: &RefUpdate) -> Result<Option<String>> {
    let Some(branch) = refname.strip_prefix("refs/heads/") else {
        return Ok(None);
    };
    if update.is_delete() {
        return Ok(Some(format!("deleting the branch {branch} is not allowed")));
    }
    if update.is_create() || update.old_rev == update.new_rev {
        return Ok(None);
    }
    let old = Oid::from_str(&update.old_rev)?;
    let new = Oid::from_str(&update.new_rev)?;
    if repo.graph_descendant_of(new, old)? {
        Ok(None)
    } else {
        Ok(Some(format!(
            "non-fast-forward push to the branch {branch} is not allowed"
        )))
    }
}

impl HookLifecycle for BlockForcePush {
    fn pre_receive(&self, ctx: &HookContext<'_>, changes: &Changes) -> Result<Outcome> {
        let repo = Repository::open(ctx.repo_path)?;
        for (refname, update) in changes.iter() {
            if let Some(reason) = check(&repo, refname, update)? {
                return Ok(Outcome::Abort(reason));
            }
        }
        Ok(Outcome::Continue)
    }

    fn update(&self, ctx: &HookContext<'_>, refname: &str, change: &RefUpdate) -> Result<Outcome> {
        let repo = Repository::open(ctx.repo_path)?;
        match check(&repo, refname, change)? {
            Some(reason) => Ok(Outcome::Abort(reason)),
            None => Ok(Outcome::Continue),
        }
    }
}
