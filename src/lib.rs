//! # Portcullis
//!
//! Push authorization and hook dispatch for self-hosted git forges,
//! usable both as the hook binary git invokes and as a library.
//!
//! A push enters through one of git's server-side hooks and flows through
//! one synchronous dispatch: resolve the repository to a project, evaluate
//! access per ref, run the typed hook plugins, then any legacy hook
//! scripts still on disk, and accept or reject the whole thing with the
//! process exit code.
//!
//! Access control comes in two flavors behind one trait: a static backend
//! that synthesizes and compiles a gitolite configuration out of band, and
//! a dynamic backend that answers per ref at push time straight from the
//! database.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use portcullis::acl::AuthRegistry;
//! use portcullis::config::Config;
//! use portcullis::hooks::{Dispatcher, HookRegistry, PushInfo};
//! use portcullis::store::{SqliteStore, Store};
//! use portcullis::types::{Changes, HookType};
//!
//! let config = Config::from_env()?;
//! let store = SqliteStore::new(&config.db_path)?;
//! store.initialize()?;
//!
//! let registry = HookRegistry::builtin();
//! let auth = AuthRegistry::new(config.clone());
//! let dispatcher = Dispatcher::new(&config, &registry, &auth);
//! dispatcher.run(&store, HookType::PreReceive, git_dir, &push, changes)?;
//! ```

pub mod acl;
pub mod config;
pub mod error;
pub mod hooks;
pub mod pr;
pub mod store;
pub mod types;
