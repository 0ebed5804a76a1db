use git2::{Oid, Remote, Repository};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pr::{MergeFeasibility, pull_ref};
use crate::store::Store;
use crate::store::path::repo_path;
use crate::types::{PullRequest, RepoType};

/// Brings `refs/pull/<id>/head` in the target repository up to the tip of
/// the request's source branch and reports how it would merge.
///
/// Idempotent: syncing twice without new source commits leaves the ref
/// where it was. A leftover remote from an interrupted run is reused when
/// its URL still matches and replaced otherwise; the remote and its
/// tracking ref are removed again afterwards, on the error path too.
pub fn sync_pull_request(
    config: &Config,
    store: &dyn Store,
    request: &PullRequest,
) -> Result<MergeFeasibility> {
    let target = store.get_project_by_id(request.project_id)?.ok_or_else(|| {
        Error::NotFound(format!("target project of pull request #{}", request.id))
    })?;
    // A request within one project has no source project of its own.
    let source = match request.project_from_id {
        Some(id) => store.get_project_by_id(id)?.ok_or_else(|| {
            Error::NotFound(format!("source project of pull request #{}", request.id))
        })?,
        None => target.clone(),
    };

    let target_path = repo_path(&config.repos_dir, &target, RepoType::Main);
    let source_path = repo_path(&config.repos_dir, &source, RepoType::Main);

    let repo = Repository::open(&target_path)?;
    let remote_name = format!("{}_{}", request.user, request.uid);
    let url = source_path.to_string_lossy();

    let mut remote = ensure_remote(&repo, &remote_name, &url)?;
    let result = (|| -> Result<Oid> {
        let tip = fetch_source_tip(&repo, &mut remote, &remote_name, &request.branch_from)?;
        repo.reference(&pull_ref(request.id), tip, true, "pull request sync")?;
        Ok(tip)
    })();
    drop(remote);
    cleanup(&repo, &remote_name, &request.branch_from);

    let tip = result?;
    tracing::debug!(
        "Pull request #{} of {} synced to {}",
        request.id,
        target.fullname(),
        tip
    );
    feasibility(&repo, &request.branch, tip)
}

fn ensure_remote<'r>(repo: &'r Repository, name: &str, url: &str) -> Result<Remote<'r>> {
    if let Ok(existing) = repo.find_remote(name) {
        if existing.url() == Some(url) {
            return Ok(existing);
        }
        // Interrupted run pointing somewhere else; start over.
        repo.remote_delete(name)?;
    }
    Ok(repo.remote(name, url)?)
}

fn fetch_source_tip(
    repo: &Repository,
    remote: &mut Remote<'_>,
    remote_name: &str,
    branch_from: &str,
) -> Result<Oid> {
    let refspec = format!("+refs/heads/{branch_from}:refs/remotes/{remote_name}/{branch_from}");
    remote.fetch(&[refspec.as_str()], None, None)?;

    let tracking = format!("refs/remotes/{remote_name}/{branch_from}");
    let reference = repo.find_reference(&tracking)?;
    reference
        .target()
        .ok_or_else(|| Error::Config(format!("tracking ref {tracking} is not a direct ref")))
}

fn cleanup(repo: &Repository, remote_name: &str, branch_from: &str) {
    let tracking = format!("refs/remotes/{remote_name}/{branch_from}");
    if let Ok(mut reference) = repo.find_reference(&tracking) {
        if let Err(e) = reference.delete() {
            tracing::warn!("Could not delete {}: {}", tracking, e);
        }
    }
    if let Err(e) = repo.remote_delete(remote_name) {
        tracing::warn!("Could not remove the sync remote {}: {}", remote_name, e);
    }
}

fn feasibility(
    repo: &Repository,
    target_branch: &str,
    source_tip: Oid,
) -> Result<MergeFeasibility> {
    let target_ref = match repo.find_reference(&format!("refs/heads/{target_branch}")) {
        Ok(r) => r,
        // An unborn target takes the source wholesale.
        Err(_) => return Ok(MergeFeasibility::FastForward),
    };
    let Some(target_tip) = target_ref.target() else {
        return Ok(MergeFeasibility::FastForward);
    };
    if target_tip == source_tip {
        return Ok(MergeFeasibility::NoChange);
    }

    let annotated = repo.find_annotated_commit(source_tip)?;
    let (analysis, _) = repo.merge_analysis_for_ref(&target_ref, &[&annotated])?;
    if analysis.is_up_to_date() {
        return Ok(MergeFeasibility::NoChange);
    }
    if analysis.is_fast_forward() || analysis.is_unborn() {
        return Ok(MergeFeasibility::FastForward);
    }

    // In-memory three-way merge, no working tree involved.
    let ours = repo.find_commit(target_tip)?;
    let theirs = repo.find_commit(source_tip)?;
    let index = repo.merge_commits(&ours, &theirs, None)?;
    if index.has_conflicts() {
        Ok(MergeFeasibility::Conflicts)
    } else {
        Ok(MergeFeasibility::Merge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn commit_file(
        repo: &Repository,
        update_ref: Option<&str>,
        parent: Option<Oid>,
        file: &str,
        content: &[u8],
        message: &str,
    ) -> Oid {
        let sig = git2::Signature::now("tester", "tester@localhost").unwrap();
        let blob = repo.blob(content).unwrap();
        let base_tree = parent.map(|p| repo.find_commit(p).unwrap().tree().unwrap());
        let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
        builder.insert(file, blob, 0o100644).unwrap();
        let tree_id = builder.write().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        let parents = parent
            .map(|p| repo.find_commit(p).unwrap())
            .into_iter()
            .collect::<Vec<_>>();
        let parent_refs = parents.iter().collect::<Vec<_>>();
        repo.commit(update_ref, &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    #[test]
    fn test_feasibility_no_change() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("t.git")).unwrap();
        let base = commit_file(&repo, Some("refs/heads/master"), None, "a", b"base\n", "init");

        assert_eq!(
            feasibility(&repo, "master", base).unwrap(),
            MergeFeasibility::NoChange
        );

        // Source already contained in the target counts as no change too.
        commit_file(
            &repo,
            Some("refs/heads/master"),
            Some(base),
            "a",
            b"more\n",
            "more",
        );
        assert_eq!(
            feasibility(&repo, "master", base).unwrap(),
            MergeFeasibility::NoChange
        );
    }

    #[test]
    fn test_feasibility_fast_forward() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("t.git")).unwrap();
        let base = commit_file(&repo, Some("refs/heads/master"), None, "a", b"base\n", "init");
        let ahead = commit_file(
            &repo,
            Some("refs/heads/feature"),
            Some(base),
            "a",
            b"work\n",
            "work",
        );

        assert_eq!(
            feasibility(&repo, "master", ahead).unwrap(),
            MergeFeasibility::FastForward
        );
        // An unborn target branch is a fast-forward as well.
        assert_eq!(
            feasibility(&repo, "devel", ahead).unwrap(),
            MergeFeasibility::FastForward
        );
    }

    #[test]
    fn test_feasibility_clean_merge() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("t.git")).unwrap();
        let base = commit_file(&repo, Some("refs/heads/master"), None, "a", b"base\n", "init");
        commit_file(
            &repo,
            Some("refs/heads/master"),
            Some(base),
            "ours",
            b"ours\n",
            "ours",
        );
        let theirs = commit_file(
            &repo,
            Some("refs/heads/feature"),
            Some(base),
            "theirs",
            b"theirs\n",
            "theirs",
        );

        assert_eq!(
            feasibility(&repo, "master", theirs).unwrap(),
            MergeFeasibility::Merge
        );
    }

    #[test]
    fn test_feasibility_conflicts() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("t.git")).unwrap();
        let base = commit_file(&repo, Some("refs/heads/master"), None, "a", b"base\n", "init");
        commit_file(
            &repo,
            Some("refs/heads/master"),
            Some(base),
            "a",
            b"ours\n",
            "ours",
        );
        let theirs = commit_file(
            &repo,
            Some("refs/heads/feature"),
            Some(base),
            "a",
            b"theirs\n",
            "theirs",
        );

        assert_eq!(
            feasibility(&repo, "master", theirs).unwrap(),
            MergeFeasibility::Conflicts
        );
    }

    #[test]
    fn test_ensure_remote_replaces_stale_url() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("t.git")).unwrap();

        repo.remote("foo_abc", "/somewhere/else.git").unwrap();
        let remote = ensure_remote(&repo, "foo_abc", "/the/source.git").unwrap();
        assert_eq!(remote.url(), Some("/the/source.git"));
        drop(remote);

        // Matching URL is reused as-is.
        let remote = ensure_remote(&repo, "foo_abc", "/the/source.git").unwrap();
        assert_eq!(remote.url(), Some("/the/source.git"));
    }
}
