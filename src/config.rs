use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::Environment;
use crate::scheduler::Cadence;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Canonical hash definitions, maintained outside this process.
    #[serde(default = "default_reference_source")]
    pub reference_source: PathBuf,
    /// Working copy refreshed from `reference_source` on every run.
    #[serde(default = "default_reference_working")]
    pub reference_working: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            reference_source: default_reference_source(),
            reference_working: default_reference_working(),
            cache_dir: default_cache_dir(),
            state_file: default_state_file(),
        }
    }
}

fn default_reference_source() -> PathBuf {
    PathBuf::from("Hashes.toml")
}
fn default_reference_working() -> PathBuf {
    PathBuf::from("data/Hashes.toml")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/revisions")
}
fn default_state_file() -> PathBuf {
    PathBuf::from("data/last.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_cadence")]
    pub cadence: String,
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cadence: default_cadence(),
            run_on_start: default_run_on_start(),
        }
    }
}

fn default_cadence() -> String {
    "6h".to_string()
}
fn default_run_on_start() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// URL template for the latest revision; `{domain}` is replaced by e.g. `.com.br`.
    pub revision_url: String,
    /// URL template for a build manifest; `{revision}` is replaced.
    pub build_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    format!("harble/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MonitorConfig {
    /// Restrict monitoring to these environments. Empty means all of them.
    #[serde(default)]
    pub environments: Vec<Environment>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Environments to check, in monitoring order.
    pub fn environments(&self) -> Vec<Environment> {
        if self.monitor.environments.is_empty() {
            return Environment::ALL.to_vec();
        }
        Environment::ALL
            .into_iter()
            .filter(|env| self.monitor.environments.contains(env))
            .collect()
    }

    pub fn cadence(&self) -> Result<Cadence> {
        self.schedule
            .cadence
            .parse::<Cadence>()
            .map_err(|e| anyhow::anyhow!("schedule.cadence: {}", e))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate schedule
    config.cadence()?;

    // Validate remote
    if !config.remote.revision_url.contains("{domain}") {
        anyhow::bail!("remote.revision_url must contain the {{domain}} placeholder");
    }
    if !config.remote.build_url.contains("{revision}") {
        anyhow::bail!("remote.build_url must contain the {{revision}} placeholder");
    }
    if config.remote.timeout_secs == 0 {
        anyhow::bail!("remote.timeout_secs must be > 0");
    }

    // Validate monitor
    let mut seen = Vec::new();
    for env in &config.monitor.environments {
        if seen.contains(env) {
            anyhow::bail!("monitor.environments lists '{}' twice", env.slug());
        }
        seen.push(*env);
    }

    if config.storage.reference_source == config.storage.reference_working {
        anyhow::bail!("storage.reference_working must differ from storage.reference_source");
    }

    Ok(config)
}
