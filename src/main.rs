use std::env;
use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use portcullis::acl::{AclTarget, AuthRegistry};
use portcullis::config::Config;
use portcullis::error::Error;
use portcullis::hooks::{Dispatcher, HookRegistry, PushInfo};
use portcullis::store::{SqliteStore, Store};
use portcullis::types::{Changes, HookType, Project};

#[derive(Parser)]
#[command(name = "portcullis")]
#[command(about = "Push authorization and hook dispatch for git forges", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as a server-side git hook (symlink target in hooks/)
    Hook {
        #[command(subcommand)]
        command: HookCommands,
    },

    /// Maintain the access control configuration
    Acl {
        #[command(subcommand)]
        command: AclCommands,
    },
}

#[derive(Subcommand)]
enum HookCommands {
    /// Evaluate a whole push before any ref moves; change lines on stdin
    PreReceive,

    /// Evaluate one ref; called by git once per ref
    Update {
        refname: String,
        old_rev: String,
        new_rev: String,
    },

    /// React to an accepted push; change lines on stdin
    PostReceive,
}

#[derive(Subcommand)]
enum AclCommands {
    /// Regenerate the configuration, for everything or one project
    Regen {
        /// Restrict to one project, by full name
        #[arg(long)]
        project: Option<String>,

        /// Refresh a single user group line in place
        #[arg(long)]
        group: Option<String>,
    },

    /// Recompile the existing configuration without rewriting it
    Recompile,

    /// Drop a project's stanzas and recompile
    Remove {
        /// Project to drop, by full name
        #[arg(long)]
        project: String,
    },
}

/// `forks/<owner>/[namespace/]<name>`, as printed by the platform.
fn find_project(store: &dyn Store, fullname: &str) -> anyhow::Result<Project> {
    let mut rest = fullname;
    let mut fork_owner = None;
    if let Some(suffix) = rest.strip_prefix("forks/") {
        let (owner, remainder) = suffix
            .split_once('/')
            .with_context(|| format!("invalid fork name: {fullname}"))?;
        fork_owner = Some(owner);
        rest = remainder;
    }
    let (namespace, name) = match rest.rsplit_once('/') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, rest),
    };
    store
        .get_project(namespace, name, fork_owner)?
        .with_context(|| format!("project {fullname} not found"))
}

fn run_hook(command: HookCommands) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let (hook_type, changes) = match command {
        HookCommands::PreReceive => (
            HookType::PreReceive,
            Changes::from_reader(io::stdin().lock())?,
        ),
        HookCommands::PostReceive => (
            HookType::PostReceive,
            Changes::from_reader(io::stdin().lock())?,
        ),
        HookCommands::Update {
            refname,
            old_rev,
            new_rev,
        } => (
            HookType::Update,
            Changes::from_ref(&refname, &old_rev, &new_rev),
        ),
    };

    let git_dir: PathBuf = env::var_os("GIT_DIR")
        .map(Into::into)
        .unwrap_or_else(|| PathBuf::from("."));
    let push = PushInfo {
        username: env::var("GL_USER")
            .or_else(|_| env::var("USER"))
            .unwrap_or_default(),
        is_internal: env::var("internal").is_ok_and(|v| v == "yes"),
        pull_request_uid: env::var("pull_request_uid").ok(),
    };

    let store = SqliteStore::new(&config.db_path)?;
    store.initialize()?;
    let registry = HookRegistry::builtin();
    let auth = AuthRegistry::new(config.clone());
    let dispatcher = Dispatcher::new(&config, &registry, &auth);

    match dispatcher.run(&store, hook_type, &git_dir, &push, changes) {
        Ok(report) => {
            tracing::debug!("{} accepted: {:?}", hook_type, report);
            Ok(())
        }
        // git relays the message to the pusher; the exit code rejects.
        Err(e @ (Error::PolicyDenied(_) | Error::PushRejected(_))) => {
            eprintln!("{e}");
            process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn run_acl(command: AclCommands) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = SqliteStore::new(&config.db_path)?;
    store.initialize()?;
    let auth = AuthRegistry::new(config.clone());
    let backend = auth.get(None)?;

    match command {
        AclCommands::Regen { project, group } => match project {
            Some(fullname) => {
                let project = find_project(&store, &fullname)?;
                backend.generate_acls(&store, AclTarget::Project(&project), group.as_deref())?;
            }
            // A bare group refresh touches only that line, never the body.
            None if group.is_some() => {
                backend.generate_acls(&store, AclTarget::RecompileOnly, group.as_deref())?;
            }
            None => backend.generate_acls(&store, AclTarget::All, None)?,
        },
        AclCommands::Recompile => {
            backend.generate_acls(&store, AclTarget::RecompileOnly, None)?;
        }
        AclCommands::Remove { project } => {
            let project = find_project(&store, &project)?;
            backend.remove_acls(&store, &project)?;
        }
    }

    store.close()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("portcullis=info".parse()?))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Hook { command } => run_hook(command),
        Commands::Acl { command } => run_acl(command),
    }
}
