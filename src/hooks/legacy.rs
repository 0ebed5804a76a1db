use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::types::{Changes, HookType};

/// Hook names the platform itself shipped as repository files in earlier
/// releases. Their work lives in the typed runner now; a stale symlink must
/// not make it happen twice.
const OBSOLETE_HOOKS: &[&str] = &[
    "portcullis",
    "portcullis-tickets",
    "portcullis-requests",
    "default",
];

/// One legacy script that did not run cleanly.
#[derive(Debug)]
pub struct LegacyFailure {
    pub script: PathBuf,
    pub detail: String,
}

/// Run every `<hooktype>.<name>` script in the repository's hooks directory,
/// in filename order. Failures are collected and never short-circuit; the
/// caller decides what they mean for the push.
pub fn run_legacy_hooks(
    hook_type: HookType,
    repo_path: &Path,
    changes: &Changes,
) -> Vec<LegacyFailure> {
    let hooks_dir = repo_path.join("hooks");
    let mut scripts: Vec<PathBuf> = match fs::read_dir(&hooks_dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => return Vec::new(),
    };
    scripts.sort();

    let prefix = format!("{}.", hook_type.as_str());
    let mut failures = Vec::new();

    for script in scripts {
        let Some(file_name) = script.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(name) = file_name.strip_prefix(&prefix) else {
            continue;
        };
        if name == "sample" || name.ends_with(".sample") || OBSOLETE_HOOKS.contains(&name) {
            continue;
        }

        tracing::info!("Running legacy hook {}", script.display());
        if let Err(detail) = run_script(hook_type, &script, changes) {
            tracing::warn!("Legacy hook {} failed: {}", script.display(), detail);
            failures.push(LegacyFailure { script, detail });
        }
    }

    failures
}

fn run_script(
    hook_type: HookType,
    script: &Path,
    changes: &Changes,
) -> std::result::Result<(), String> {
    let mut command = Command::new(script);

    if hook_type.reads_stdin() {
        command.stdin(Stdio::piped());
    } else {
        // update passes its single ref as positional arguments.
        let (refname, change) = changes
            .iter()
            .next()
            .ok_or_else(|| "no ref to pass".to_string())?;
        command.args([refname, &change.old_rev, &change.new_rev]);
        command.stdin(Stdio::null());
    }

    let mut child = command
        .spawn()
        .map_err(|e| format!("failed to spawn: {e}"))?;

    if hook_type.reads_stdin() {
        if let Some(mut stdin) = child.stdin.take() {
            // A script may exit without draining stdin; its exit status is
            // what counts, not the broken pipe.
            if let Err(e) = stdin.write_all(changes.to_stdin_payload().as_bytes()) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(format!("failed to write stdin: {e}"));
                }
            }
        }
    }

    let status = child.wait().map_err(|e| format!("failed to wait: {e}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("exited with {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(hooks_dir: &Path, name: &str, body: &str) {
        let path = hooks_dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn changes() -> Changes {
        Changes::from_ref(
            "refs/heads/master",
            "1111111111111111111111111111111111111111",
            "2222222222222222222222222222222222222222",
        )
    }

    #[test]
    fn test_missing_hooks_dir_is_quiet() {
        let temp = TempDir::new().unwrap();
        let failures = run_legacy_hooks(HookType::PostReceive, temp.path(), &changes());
        assert!(failures.is_empty());
    }

    #[test]
    fn test_filters_and_collects_failures() {
        let temp = TempDir::new().unwrap();
        let hooks_dir = temp.path().join("hooks");
        fs::create_dir_all(&hooks_dir).unwrap();

        let marker = temp.path().join("ran");
        write_script(
            &hooks_dir,
            "post-receive.mirror",
            &format!("#!/bin/sh\ncat > {}\nexit 0\n", marker.display()),
        );
        write_script(&hooks_dir, "post-receive.broken", "#!/bin/sh\nexit 3\n");
        // Skipped: wrong hook type, sample file, obsolete names.
        write_script(&hooks_dir, "pre-receive.other", "#!/bin/sh\nexit 1\n");
        write_script(&hooks_dir, "post-receive.sample", "#!/bin/sh\nexit 1\n");
        write_script(&hooks_dir, "post-receive.portcullis", "#!/bin/sh\nexit 1\n");
        write_script(&hooks_dir, "post-receive.default", "#!/bin/sh\nexit 1\n");

        let failures = run_legacy_hooks(HookType::PostReceive, temp.path(), &changes());

        // Only the genuinely broken script is reported, and the good one
        // still ran and saw the stdin payload.
        assert_eq!(failures.len(), 1);
        assert!(failures[0].script.ends_with("post-receive.broken"));
        assert!(failures[0].detail.contains("exited with"));

        let payload = fs::read_to_string(&marker).unwrap();
        assert_eq!(
            payload,
            "1111111111111111111111111111111111111111 2222222222222222222222222222222222222222 refs/heads/master\n"
        );
    }

    #[test]
    fn test_update_passes_positional_arguments() {
        let temp = TempDir::new().unwrap();
        let hooks_dir = temp.path().join("hooks");
        fs::create_dir_all(&hooks_dir).unwrap();

        let marker = temp.path().join("args");
        write_script(
            &hooks_dir,
            "update.check",
            &format!("#!/bin/sh\necho \"$1 $2 $3\" > {}\n", marker.display()),
        );

        let failures = run_legacy_hooks(HookType::Update, temp.path(), &changes());
        assert!(failures.is_empty());

        let args = fs::read_to_string(&marker).unwrap();
        assert_eq!(
            args.trim_end(),
            "refs/heads/master 1111111111111111111111111111111111111111 2222222222222222222222222222222222222222"
        );
    }

    #[test]
    fn test_unexecutable_script_recorded_not_fatal() {
        let temp = TempDir::new().unwrap();
        let hooks_dir = temp.path().join("hooks");
        fs::create_dir_all(&hooks_dir).unwrap();

        // No exec bit: spawning fails, the failure is recorded.
        fs::write(hooks_dir.join("post-receive.dead"), "#!/bin/sh\n").unwrap();

        let failures = run_legacy_hooks(HookType::PostReceive, temp.path(), &changes());
        assert_eq!(failures.len(), 1);
        assert!(failures[0].detail.contains("failed to spawn"));
    }
}
