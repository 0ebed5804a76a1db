mod block_force_push;
mod default;
mod no_new_branches;

use crate::hooks::{Activation, HookPlugin};

/// The built-in plugin table, in dispatch order. `default` runs first so
/// pull requests tracking a pushed branch are refreshed before anything
/// else reacts to the push.
pub fn builtin() -> Vec<HookPlugin> {
    vec![
        HookPlugin {
            name: "default",
            description: "Record pushed refs and refresh the pull requests opened from them",
            activation: Activation::Predicate(|_| true),
            lifecycle: Some(Box::new(default::DefaultHook)),
            installs_legacy_file: false,
        },
        HookPlugin {
            name: "no_new_branches",
            description: "Forbid creating branches by git push",
            activation: Activation::Setting,
            lifecycle: Some(Box::new(no_new_branches::NoNewBranches)),
            installs_legacy_file: false,
        },
        HookPlugin {
            name: "block_force_push",
            description: "Reject non-fast-forward pushes and branch deletions",
            activation: Activation::Setting,
            lifecycle: Some(Box::new(block_force_push::BlockForcePush)),
            installs_legacy_file: false,
        },
        // Not ported to a typed lifecycle yet; its installed file still
        // runs with the other legacy scripts.
        HookPlugin {
            name: "irc",
            description: "Announce pushes over IRC",
            activation: Activation::Setting,
            lifecycle: None,
            installs_legacy_file: true,
        },
    ]
}
