//! Configuration management for ptsp-build.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over .env file; command line flags
//! take precedence over both.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::profile::DEFAULT_PROFILE;

/// ptsp-build configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Built-in profile name (default: pardus-2008)
    pub profile: String,
    /// JSON profile file, overrides `profile` when set
    pub profile_file: Option<PathBuf>,
    /// Repository index URL overriding the profile's default
    pub repository: Option<String>,
}

impl Config {
    /// Load `.env` from the working directory (if present), then read the
    /// process environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars().collect())
    }

    /// Load a specific env file instead of `./.env`.
    pub fn load_from(env_file: &Path) -> Self {
        dotenvy::from_path(env_file).ok();
        Self::from_vars(std::env::vars().collect())
    }

    /// Build config from a variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        let non_empty = |key: &str| vars.get(key).filter(|v| !v.trim().is_empty()).cloned();

        Self {
            profile: non_empty("PTSP_PROFILE").unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            profile_file: non_empty("PTSP_PROFILE_FILE").map(PathBuf::from),
            repository: non_empty("PTSP_REPOSITORY"),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  PTSP_PROFILE: {}", self.profile);
        match &self.profile_file {
            Some(path) => println!("  PTSP_PROFILE_FILE: {}", path.display()),
            None => println!("  PTSP_PROFILE_FILE: (unset)"),
        }
        match &self.repository {
            Some(url) => println!("  PTSP_REPOSITORY: {}", url),
            None => println!("  PTSP_REPOSITORY: (profile default)"),
        }
    }
}
