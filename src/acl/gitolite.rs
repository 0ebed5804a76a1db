use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

use super::{AclTarget, AuthBackend, pr_only_enforced};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{AccessLevel, Project, RepoType};

const HEADER_END: &str = "# end of header";
const GROUPS_END: &str = "# end of groups";
const BODY_END: &str = "# end of body";

/// Static backend: keeps a gitolite configuration file in step with the
/// project directory and shells out to `gitolite` to compile it. External
/// callers must serialize invocations; the read-modify-write below has no
/// locking of its own.
pub struct GitoliteAuth {
    config: Config,
}

/// The managed slice of the configuration file, between the externally
/// owned header and footer blocks.
#[derive(Debug, Default, PartialEq)]
struct ConfigRegions {
    /// `@name  = members` lines.
    groups: Vec<String>,
    /// `repo <name>` stanzas, each ending with a blank line.
    body: Vec<String>,
}

impl GitoliteAuth {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Read the current file and strip it down to the managed regions.
    /// Returns whether a group-table end marker was present.
    fn load_regions(&self) -> Result<(ConfigRegions, bool)> {
        let path = &self.config.gitolite.config_file;
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut lines: Vec<String> = content.lines().map(String::from).collect();

        if self.config.gitolite.header.is_some() {
            if let Some(pos) = lines.iter().position(|l| l == HEADER_END) {
                lines.drain(..=pos);
            }
        }
        if self.config.gitolite.footer.is_some() {
            if let Some(pos) = lines.iter().position(|l| l == BODY_END) {
                lines.truncate(pos);
            }
        }

        let (group_region, body, had_marker) =
            match lines.iter().position(|l| l == GROUPS_END) {
                Some(pos) => {
                    let body = lines.split_off(pos + 1);
                    lines.pop();
                    (lines, body, true)
                }
                None => {
                    // No marker: group lines sit right before the first stanza.
                    let first_repo = lines
                        .iter()
                        .position(|l| l.starts_with("repo "))
                        .unwrap_or(lines.len());
                    let body = lines.split_off(first_repo);
                    (lines, body, false)
                }
            };
        let groups: Vec<String> = group_region
            .into_iter()
            .filter(|l| l.starts_with('@'))
            .collect();

        Ok((ConfigRegions { groups, body }, had_marker))
    }

    /// The `@name  = sorted members` table for every known group. Groups
    /// without members still get a line; stanzas may reference them.
    fn group_table(store: &dyn Store) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for group in store.list_groups()? {
            let members: Vec<String> = store
                .group_members(group.id)?
                .into_iter()
                .map(|u| u.username)
                .collect();
            lines.push(format!("@{}  = {}", group.name, members.join(" ")));
        }
        Ok(lines)
    }

    /// Replace a single group's line in place, or add it at the end of the
    /// table, right before the stanzas.
    fn upsert_group_line(groups: &mut Vec<String>, name: &str, line: String) {
        let prefix = format!("@{name} ");
        match groups.iter_mut().find(|l| l.starts_with(&prefix)) {
            Some(existing) => *existing = line,
            None => groups.push(line),
        }
    }

    /// Emit the stanzas of one project, one per owned and enabled
    /// repository type.
    fn project_stanzas(&self, store: &dyn Store, project: &Project) -> Result<Vec<String>> {
        let groups = store.groups_with_access(project.id, AccessLevel::Commit.combined())?;
        let users = store.users_with_access(project.id, AccessLevel::Commit.combined())?;
        let keys = store.deploy_keys(project.id)?;

        let mut lines = Vec::new();
        for repo_type in project.repo_types() {
            if !self.config.repo_type_enabled(repo_type) {
                continue;
            }
            if repo_type == RepoType::Main && pr_only_enforced(&self.config, project) {
                // Under the pull-request workflow the platform is the only
                // writer of the code repository, through its own identity.
                continue;
            }

            lines.push(format!("repo {}", project.repo_name(repo_type)));
            if !project.private {
                lines.push("  R   = @all".to_string());
            }
            if !groups.is_empty() {
                let names: Vec<String> =
                    groups.iter().map(|g| format!("@{}", g.name)).collect();
                lines.push(format!("  RW+ = {}", names.join(" ")));
            }
            lines.push(format!("  RW+ = {}", project.owner));
            for user in &users {
                if user.username != project.owner {
                    lines.push(format!("  RW+ = {}", user.username));
                }
            }
            for key in &keys {
                let access = if key.push_access { "RW+" } else { "R" };
                lines.push(format!("  {access} = {}", key.identity(project)));
            }
            lines.push(String::new());
        }

        Ok(lines)
    }

    /// Drop every stanza of the project from the body, whatever repository
    /// types it owns today. A stanza runs from its `repo` line to the next
    /// blank line.
    fn clean_project(body: &mut Vec<String>, project: &Project) {
        let keys: Vec<String> = RepoType::ALL
            .iter()
            .map(|&t| format!("repo {}", project.repo_name(t)))
            .collect();

        let mut keep = true;
        body.retain(|line| {
            if keys.iter().any(|k| k == line) {
                keep = false;
                return false;
            }
            if !keep {
                if line.is_empty() {
                    keep = true;
                }
                return false;
            }
            true
        });
    }

    fn read_block(path: Option<&Path>) -> Result<Option<String>> {
        match path {
            Some(path) => fs::read_to_string(path).map(Some).map_err(|e| {
                Error::Config(format!("cannot read {}: {e}", path.display()))
            }),
            None => Ok(None),
        }
    }

    /// Assemble the final file. Consecutive blank lines are collapsed; the
    /// compiler reads a blank line as a stanza boundary, so doubled blanks
    /// change meaning, not just looks.
    fn render(
        header: Option<&str>,
        footer: Option<&str>,
        regions: &ConfigRegions,
        groups_marker: bool,
    ) -> String {
        let mut lines: Vec<&str> = Vec::new();
        if let Some(header) = header {
            lines.extend(header.lines());
            lines.push(HEADER_END);
        }
        lines.extend(regions.groups.iter().map(String::as_str));
        if groups_marker {
            lines.push(GROUPS_END);
        }
        lines.extend(regions.body.iter().map(String::as_str));
        if let Some(footer) = footer {
            lines.push(BODY_END);
            lines.extend(footer.lines());
        }

        let mut out: Vec<&str> = Vec::with_capacity(lines.len());
        for line in lines {
            if line.is_empty() && out.last().is_some_and(|l| l.is_empty()) {
                continue;
            }
            out.push(line);
        }

        let mut content = out.join("\n");
        content.push('\n');
        content
    }

    fn write_config(&self, regions: &ConfigRegions, groups_marker: bool) -> Result<()> {
        let header = Self::read_block(self.config.gitolite.header.as_deref())?;
        let footer = Self::read_block(self.config.gitolite.footer.as_deref())?;
        let content = Self::render(header.as_deref(), footer.as_deref(), regions, groups_marker);

        let path = &self.config.gitolite.config_file;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::ConfigWrite {
                path: path.clone(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| Error::ConfigWrite {
            path: path.clone(),
            source,
        })?;
        tracing::info!("Wrote gitolite configuration to {}", path.display());
        Ok(())
    }

    fn run_compiler(&self, home: &Path, args: &[&str]) -> Result<()> {
        tracing::info!("Running {} {}", self.config.gitolite.command, args.join(" "));
        let output = Command::new(&self.config.gitolite.command)
            .args(args)
            .env("HOME", home)
            .output()?;
        if !output.status.success() {
            return Err(Error::Compile {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    /// Compile what was written. The file stays on disk whatever happens
    /// here; a compiler failure means "config written, compile pending".
    fn compile(&self, target: AclTarget<'_>) -> Result<()> {
        let Some(home) = self.config.gitolite.home.clone() else {
            tracing::warn!("No gitolite home configured, skipping compilation");
            return Ok(());
        };

        match target {
            AclTarget::Project(project) => {
                for repo_type in project.repo_types() {
                    if !self.config.repo_type_enabled(repo_type) {
                        continue;
                    }
                    self.run_compiler(&home, &["compile-1", &project.repo_name(repo_type)])?;
                }
                Ok(())
            }
            AclTarget::All | AclTarget::RecompileOnly => {
                self.run_compiler(&home, &["compile"])?;
                self.run_compiler(&home, &["trigger", "POST_COMPILE"])
            }
        }
    }
}

impl AuthBackend for GitoliteAuth {
    fn name(&self) -> &'static str {
        "gitolite"
    }

    fn generate_acls(
        &self,
        store: &dyn Store,
        target: AclTarget<'_>,
        group: Option<&str>,
    ) -> Result<()> {
        let write_needed = group.is_some() || !matches!(target, AclTarget::RecompileOnly);
        if write_needed {
            let (mut regions, had_marker) = self.load_regions()?;

            match group {
                Some(name) => {
                    let group = store
                        .list_groups()?
                        .into_iter()
                        .find(|g| g.name == name)
                        .ok_or_else(|| Error::NotFound(format!("group {name}")))?;
                    let members: Vec<String> = store
                        .group_members(group.id)?
                        .into_iter()
                        .map(|u| u.username)
                        .collect();
                    let line = format!("@{}  = {}", group.name, members.join(" "));
                    Self::upsert_group_line(&mut regions.groups, name, line);
                }
                None => regions.groups = Self::group_table(store)?,
            }

            match target {
                AclTarget::All => {
                    regions.body.clear();
                    for project in store.list_projects()? {
                        regions.body.extend(self.project_stanzas(store, &project)?);
                    }
                }
                AclTarget::Project(project) => {
                    Self::clean_project(&mut regions.body, project);
                    regions.body.extend(self.project_stanzas(store, project)?);
                }
                AclTarget::RecompileOnly => {}
            }

            let groups_marker =
                had_marker || (group.is_none() && matches!(target, AclTarget::All));
            self.write_config(&regions, groups_marker)?;
        }

        self.compile(target)
    }

    fn remove_acls(&self, _store: &dyn Store, project: &Project) -> Result<()> {
        let (mut regions, had_marker) = self.load_regions()?;
        Self::clean_project(&mut regions.body, project);
        self.write_config(&regions, had_marker)?;
        self.compile(AclTarget::All)?;

        // gitolite cannot delete a repository from its own caches; a stale
        // per-repo config would shadow a later project of the same name.
        if let Some(home) = self.config.gitolite.home.as_deref() {
            for repo_type in RepoType::ALL {
                let conf = home
                    .join("repositories")
                    .join(format!("{}.git", project.repo_name(repo_type)))
                    .join("gl-conf");
                match fs::remove_file(&conf) {
                    Ok(()) => {
                        tracing::info!("Removed compiled config {}", conf.display());
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stanza(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    fn project(name: &str) -> Project {
        Project {
            id: 1,
            name: name.to_string(),
            namespace: None,
            owner: "pingou".to_string(),
            is_fork: false,
            private: false,
            settings: Default::default(),
            replica_region: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_clean_project_removes_all_repo_types() {
        let mut body = stanza(&[
            "repo test",
            "  R   = @all",
            "  RW+ = pingou",
            "",
            "repo docs/test",
            "  RW+ = pingou",
            "",
            "repo other",
            "  RW+ = someone",
            "",
        ]);

        GitoliteAuth::clean_project(&mut body, &project("test"));

        assert_eq!(
            body,
            stanza(&["repo other", "  RW+ = someone", ""])
        );
    }

    #[test]
    fn test_clean_project_ignores_prefix_collisions() {
        // "test2" must not be swept up while cleaning "test".
        let mut body = stanza(&["repo test2", "  RW+ = someone", ""]);
        GitoliteAuth::clean_project(&mut body, &project("test"));
        assert_eq!(body, stanza(&["repo test2", "  RW+ = someone", ""]));
    }

    #[test]
    fn test_upsert_group_line() {
        let mut groups = stanza(&["@infra  = alice bob", "@web  = carol"]);

        GitoliteAuth::upsert_group_line(
            &mut groups,
            "infra",
            "@infra  = alice bob dave".to_string(),
        );
        assert_eq!(
            groups,
            stanza(&["@infra  = alice bob dave", "@web  = carol"])
        );

        GitoliteAuth::upsert_group_line(&mut groups, "new", "@new  = eve".to_string());
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2], "@new  = eve");

        // "@infra " must not match "@infrastructure".
        GitoliteAuth::upsert_group_line(
            &mut groups,
            "infrastructure",
            "@infrastructure  = zed".to_string(),
        );
        assert_eq!(groups.len(), 4);
    }

    #[test]
    fn test_render_collapses_blank_runs() {
        let regions = ConfigRegions {
            groups: vec![],
            body: stanza(&["repo test", "  RW+ = pingou", "", "", "repo two", ""]),
        };
        let content = GitoliteAuth::render(None, None, &regions, false);
        assert_eq!(content, "repo test\n  RW+ = pingou\n\nrepo two\n\n");
    }

    #[test]
    fn test_render_with_header_footer_and_markers() {
        let regions = ConfigRegions {
            groups: stanza(&["@infra  = alice"]),
            body: stanza(&["repo test", "  RW+ = pingou", ""]),
        };
        let content = GitoliteAuth::render(
            Some("# managed by hand\n"),
            Some("repo special\n  RW+ = admin\n"),
            &regions,
            true,
        );
        assert_eq!(
            content,
            "# managed by hand\n\
             # end of header\n\
             @infra  = alice\n\
             # end of groups\n\
             repo test\n\
             \x20 RW+ = pingou\n\
             \n\
             # end of body\n\
             repo special\n\
             \x20 RW+ = admin\n"
        );
    }
}
