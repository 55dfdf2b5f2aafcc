//! Optional YAML configuration.
//!
//! Every field is optional; command-line flags override whatever the file
//! sets, and built-in defaults fill the rest.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::scan::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};

/// Config file names searched for in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["channeling.yaml", ".channeling.yaml"];

/// Where the DOT graph goes unless configured otherwise.
pub const DEFAULT_GRAPH_OUTPUT: &str = "channel_flow.dot";

/// Dashboard listen address unless configured otherwise.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Parallel scan workers (default: 4)
    #[serde(default)]
    pub workers: Option<usize>,
    /// Capacity of the file queue (default: 100)
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// Glob patterns for root-relative paths to skip (e.g., "vendor/**")
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub graph_output: Option<PathBuf>,
    #[serde(default)]
    pub listen: Option<String>,
    /// Whether to start the dashboard after the report (default: true)
    #[serde(default)]
    pub serve: Option<bool>,
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load an explicit config file, or the first default name present in
    /// `dir`, or fall back to defaults.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::parse_file(path)
                .map_err(|e| anyhow::anyhow!("reading config {}: {}", path.display(), e));
        }
        match discover(dir) {
            Some(path) => Self::parse_file(&path)
                .map_err(|e| anyhow::anyhow!("reading config {}: {}", path.display(), e)),
            None => Ok(Self::default()),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn graph_output(&self) -> PathBuf {
        self.graph_output
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GRAPH_OUTPUT))
    }

    pub fn listen(&self) -> &str {
        self.listen.as_deref().unwrap_or(DEFAULT_LISTEN)
    }

    pub fn should_serve(&self) -> bool {
        self.serve.unwrap_or(true)
    }
}

/// Find a config file by its default names.
pub fn discover(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Validate a config for correctness.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    if config.workers == Some(0) {
        anyhow::bail!("workers must be at least 1");
    }
    if config.queue_capacity == Some(0) {
        anyhow::bail!("queue_capacity must be at least 1");
    }

    for pattern in &config.excluded_paths {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
    }

    config
        .listen()
        .parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid listen address {:?}: {}", config.listen(), e))?;

    Ok(())
}
