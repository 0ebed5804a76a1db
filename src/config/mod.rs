mod settings;

pub use settings::{Config, GitoliteConfig, CONFIG_ENV};
