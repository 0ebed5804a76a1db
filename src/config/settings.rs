use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::RepoType;

/// Environment variable naming the configuration file. Hooks are spawned by
/// git with a fixed argv, so the file location travels through the
/// environment.
pub const CONFIG_ENV: &str = "PORTCULLIS_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "/etc/portcullis/config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the hosted repositories.
    pub repos_dir: PathBuf,
    pub db_path: PathBuf,
    /// Name of the authorization backend resolved when no explicit name is
    /// given: `gitolite` (static) or `portcullis` (dynamic).
    pub git_auth_backend: String,
    /// Instance-wide pull-request-only enforcement; a project setting can
    /// enable it per project even when this is off.
    pub pull_request_only: bool,
    /// When set, a plugin failure during pre-receive is logged instead of
    /// aborting the push.
    pub hook_debug: bool,
    /// Instance-wide repository-type switches. A disabled type is skipped by
    /// the incremental ACL compile.
    pub docs_repos: bool,
    pub ticket_repos: bool,
    pub gitolite: GitoliteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repos_dir: PathBuf::from("/srv/git/repositories"),
            db_path: PathBuf::from("/var/lib/portcullis/portcullis.db"),
            git_auth_backend: "gitolite".to_string(),
            pull_request_only: false,
            hook_debug: false,
            docs_repos: true,
            ticket_repos: true,
            gitolite: GitoliteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitoliteConfig {
    /// The configuration file the external compiler consumes.
    pub config_file: PathBuf,
    /// Home directory of the gitolite user. Compilation is skipped entirely
    /// when unset; the configuration file is still written.
    pub home: Option<PathBuf>,
    pub command: String,
    /// Files whose verbatim content becomes the header/footer blocks of the
    /// generated configuration.
    pub header: Option<PathBuf>,
    pub footer: Option<PathBuf>,
}

impl Default for GitoliteConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("/var/lib/portcullis/gitolite.conf"),
            home: None,
            command: "gitolite".to_string(),
            header: None,
            footer: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Loads the file named by `PORTCULLIS_CONFIG`, or the default path when
    /// the variable is unset. A missing file is only an error when it was
    /// named explicitly.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// True if the repository type is enabled instance-wide.
    #[must_use]
    pub fn repo_type_enabled(&self, repo_type: RepoType) -> bool {
        match repo_type {
            RepoType::Main => true,
            RepoType::Docs => self.docs_repos,
            RepoType::Tickets | RepoType::Requests => self.ticket_repos,
        }
    }
}
