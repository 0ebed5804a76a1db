use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Project, RepoType};

/// On-disk location of one of a project's repositories:
/// `<repos_dir>/[type prefix/][forks/<owner>/][namespace/]<name>.git`.
pub fn repo_path(repos_dir: &Path, project: &Project, repo_type: RepoType) -> PathBuf {
    repos_dir.join(format!("{}.git", project.repo_name(repo_type)))
}

/// What a repository directory says about the project it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRepoPath {
    pub repo_type: RepoType,
    pub namespace: Option<String>,
    pub name: String,
    /// Username owning the fork, `None` for the project itself.
    pub fork_owner: Option<String>,
}

/// Inverts [`repo_path`]: recovers project coordinates from a repository
/// directory. Both paths must already be in the same form (hooks receive
/// `GIT_DIR` relative, so callers absolutize first).
pub fn parse_git_dir(repos_dir: &Path, git_dir: &Path) -> Result<ParsedRepoPath> {
    let rel = git_dir.strip_prefix(repos_dir).map_err(|_| {
        Error::Config(format!(
            "repository {} is outside the managed root {}",
            git_dir.display(),
            repos_dir.display()
        ))
    })?;
    let rel = rel
        .to_str()
        .ok_or_else(|| Error::Config(format!("non-utf8 repository path: {}", rel.display())))?;

    let rel = rel
        .strip_suffix(".git")
        .or_else(|| rel.strip_suffix(".git/"))
        .ok_or_else(|| Error::Config(format!("not a bare repository path: {rel}")))?;

    let mut segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();

    // A type prefix only counts when something follows it; a top-level
    // project may itself be called "docs".
    let repo_type = match segments.first().and_then(|s| RepoType::parse(s)) {
        Some(t) if t != RepoType::Main && segments.len() > 1 => {
            segments.remove(0);
            t
        }
        _ => RepoType::Main,
    };

    let fork_owner = if segments.first() == Some(&"forks") {
        if segments.len() < 3 {
            return Err(Error::Config(format!("malformed fork path: {rel}")));
        }
        segments.remove(0);
        Some(segments.remove(0).to_string())
    } else {
        None
    };

    let name = match segments.pop() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(Error::Config(format!("malformed repository path: {rel}"))),
    };
    let namespace = if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    };

    Ok(ParsedRepoPath {
        repo_type,
        namespace,
        name,
        fork_owner,
    })
}
