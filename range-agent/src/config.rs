//! Agent configuration
//!
//! Handles:
//! - Optional TOML file (`$RANGE_AGENT_CONFIG`, default `<state dir>/agent.toml`)
//! - Environment overrides, which always win over the file
//! - Per-platform defaults for retry budget, MAC interface and state directory

use crate::platform::Platform;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Everything optional: unset keys fall back to platform defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub server_url: Option<String>,
    pub interface: Option<String>,
    pub no_delay: Option<bool>,
    pub max_startup_delay_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub platform: Platform,
    pub server_url: String,
    pub interface: Option<String>,
    pub no_delay: bool,
    pub max_startup_delay: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub command_timeout: Duration,
    pub state_dir: PathBuf,
}

impl AgentConfig {
    /// Reads the process environment and the config file it points at.
    pub fn load() -> Result<Self> {
        Self::from_sources(|name| std::env::var(name).ok(), read_file_config)
    }

    fn from_sources(
        var: impl Fn(&str) -> Option<String>,
        read_file: impl Fn(&Path) -> Result<FileConfig>,
    ) -> Result<Self> {
        let var = |name: &str| var(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let platform = match var("RANGE_AGENT_PLATFORM") {
            Some(name) => name.parse::<Platform>().map_err(anyhow::Error::msg)?,
            None => Platform::detect(),
        };
        let state_dir = var("RANGE_AGENT_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| platform.default_state_dir());
        let config_path = var("RANGE_AGENT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| state_dir.join("agent.toml"));

        let file = if config_path.exists() {
            read_file(&config_path)?
        } else {
            debug!("no config file at {}", config_path.display());
            FileConfig::default()
        };

        let (default_attempts, default_delay) = platform.default_retry();
        let server_url = var("RANGE_SERVER_URL")
            .or(file.server_url)
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        let Some(server_url) = server_url else {
            bail!("no server URL configured (set RANGE_SERVER_URL or server_url in {})", config_path.display());
        };

        Ok(Self {
            platform,
            server_url,
            interface: var("RANGE_INTERFACE")
                .or(file.interface)
                .or_else(|| platform.default_interface().map(String::from)),
            no_delay: env_parsed(&var, "RANGE_NO_DELAY", parse_flag)
                .or(file.no_delay)
                .unwrap_or(false),
            max_startup_delay: secs(
                env_parsed(&var, "RANGE_MAX_STARTUP_DELAY_SECS", |v| v.parse().ok())
                    .or(file.max_startup_delay_secs)
                    .unwrap_or(30),
            ),
            retry_attempts: env_parsed(&var, "RANGE_RETRY_ATTEMPTS", |v| v.parse().ok())
                .or(file.retry_attempts)
                .unwrap_or(default_attempts)
                .max(1),
            retry_delay: env_parsed(&var, "RANGE_RETRY_DELAY_SECS", |v| v.parse().ok())
                .or(file.retry_delay_secs)
                .map(secs)
                .unwrap_or(default_delay),
            request_timeout: secs(file.request_timeout_secs.unwrap_or(30)),
            command_timeout: secs(file.command_timeout_secs.unwrap_or(120)),
            state_dir,
        })
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A value that does not parse is ignored with a warning, like the kernel does.
fn env_parsed<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = var(name)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!("ignoring {name}={raw}: invalid value");
    }
    parsed
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
}
