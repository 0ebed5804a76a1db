//! Shared fixture: a temporary forge with a database, a managed
//! repositories directory, and helpers to seed both.

#![allow(dead_code)]

use std::path::PathBuf;

use chrono::Utc;
use git2::{Oid, Repository};
use tempfile::TempDir;

use portcullis::config::Config;
use portcullis::store::path::repo_path;
use portcullis::store::{SqliteStore, Store};
use portcullis::types::{Project, ProjectSettings, PullRequest, PullRequestStatus, RepoType, User};

pub struct TestForge {
    pub temp: TempDir,
    pub config: Config,
    pub store: SqliteStore,
}

impl TestForge {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let repos_dir = temp.path().join("repositories");
        std::fs::create_dir_all(&repos_dir).expect("create repositories dir");
        let db_path = temp.path().join("portcullis.db");

        let mut config = Config {
            repos_dir,
            db_path: db_path.clone(),
            ..Config::default()
        };
        config.gitolite.config_file = temp.path().join("gitolite.conf");
        let store = SqliteStore::new(&db_path).expect("open store");
        store.initialize().expect("initialize schema");

        Self {
            temp,
            config,
            store,
        }
    }

    pub fn add_project(&self, name: &str, owner: &str) -> Project {
        self.add_project_with(name, owner, |_| {})
    }

    pub fn add_project_with(
        &self,
        name: &str,
        owner: &str,
        tweak: impl FnOnce(&mut Project),
    ) -> Project {
        let mut project = Project {
            id: 0,
            name: name.to_string(),
            namespace: None,
            owner: owner.to_string(),
            is_fork: false,
            private: false,
            settings: ProjectSettings::default(),
            replica_region: None,
            created_at: Utc::now(),
        };
        tweak(&mut project);
        let id = self.store.create_project(&project).expect("create project");
        self.store
            .get_project_by_id(id)
            .expect("fetch project")
            .expect("project just created")
    }

    pub fn add_user(&self, username: &str) -> i64 {
        self.store
            .create_user(&User {
                id: 0,
                username: username.to_string(),
                fullname: String::new(),
                created_at: Utc::now(),
            })
            .expect("create user")
    }

    /// Initializes the project's main bare repository with one commit on
    /// master.
    pub fn init_repo(&self, project: &Project) -> (PathBuf, Oid) {
        let path = repo_path(&self.config.repos_dir, project, RepoType::Main);
        std::fs::create_dir_all(path.parent().expect("repo parent")).expect("create parents");
        let repo = Repository::init_bare(&path).expect("init bare repository");
        let base = commit_file(
            &repo,
            Some("refs/heads/master"),
            None,
            "README.md",
            b"hello\n",
            "init",
        );
        (path, base)
    }

    pub fn open_repo(&self, project: &Project) -> Repository {
        let path = repo_path(&self.config.repos_dir, project, RepoType::Main);
        Repository::open(path).expect("open repository")
    }

    pub fn add_pull_request(&self, request: &PullRequest) -> PullRequest {
        self.store
            .create_pull_request(request)
            .expect("create pull request");
        self.store
            .get_pull_request_by_uid(&request.uid)
            .expect("fetch pull request")
            .expect("pull request just created")
    }
}

/// One commit touching one file, optionally moving a ref. Returns the
/// commit id so callers can chain parents.
pub fn commit_file(
    repo: &Repository,
    update_ref: Option<&str>,
    parent: Option<Oid>,
    file: &str,
    content: &[u8],
    message: &str,
) -> Oid {
    let sig = git2::Signature::now("tester", "tester@localhost").expect("signature");
    let blob = repo.blob(content).expect("write blob");
    let base_tree = parent.map(|p| {
        repo.find_commit(p)
            .expect("parent commit")
            .tree()
            .expect("parent tree")
    });
    let mut builder = repo.treebuilder(base_tree.as_ref()).expect("treebuilder");
    builder.insert(file, blob, 0o100644).expect("insert blob");
    let tree_id = builder.write().expect("write tree");
    let tree = repo.find_tree(tree_id).expect("find tree");

    let parents = parent
        .map(|p| repo.find_commit(p).expect("parent commit"))
        .into_iter()
        .collect::<Vec<_>>();
    let parent_refs = parents.iter().collect::<Vec<_>>();
    repo.commit(update_ref, &sig, &sig, message, &tree, &parent_refs)
        .expect("commit")
}

/// A fresh open pull request record; callers adjust what they need.
pub fn pull_request(target: &Project, source: Option<&Project>, opener: &str) -> PullRequest {
    PullRequest {
        id: 0,
        uid: PullRequest::new_uid(),
        project_id: target.id,
        project_from_id: source.map(|p| p.id),
        branch: "master".to_string(),
        branch_from: "feature".to_string(),
        user: opener.to_string(),
        status: PullRequestStatus::Open,
        merge_status: None,
        created_at: Utc::now(),
    }
}
