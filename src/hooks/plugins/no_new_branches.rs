use crate::error::Result;
use crate::hooks::{HookContext, HookLifecycle, Outcome};
use crate::types::Changes;

/// Rejects pushes that would create a branch. Branches come from the
/// platform (project creation, merges); tags pass through.
pub struct NoNewBranches;

impl HookLifecycle for NoNewBranches {
    fn pre_receive(&self, _ctx: &HookContext<'_>, changes: &Changes) -> Result<Outcome> {
        for (refname, update) in changes.iter() {
            let Some(branch) = refname.strip_prefix("refs/heads/") else {
                continue;
            };
            if update.is_create() {
                return Ok(Outcome::Abort(format!(
                    "creating the branch {branch} by push is not allowed"
                )));
            }
        }
        Ok(Outcome::Continue)
    }
}
