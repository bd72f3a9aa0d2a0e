//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/facesort.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:5000"
//!
//! [client]                         # optional
//! base_url = "http://127.0.0.1:5000"
//! timeout_secs = 30
//!
//! [naming]                         # optional
//! placeholder_prefix = "Unknown"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::naming::DEFAULT_PLACEHOLDER_PREFIX;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub naming: NamingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct NamingConfig {
    #[serde(default = "default_placeholder_prefix")]
    pub placeholder_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            placeholder_prefix: default_placeholder_prefix(),
        }
    }
}

fn default_placeholder_prefix() -> String {
    DEFAULT_PLACEHOLDER_PREFIX.to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if !config.client.base_url.starts_with("http://")
        && !config.client.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "client.base_url must start with http:// or https://, got '{}'",
            config.client.base_url
        );
    }

    if config.client.timeout_secs == 0 {
        anyhow::bail!("client.timeout_secs must be > 0");
    }

    if config.naming.placeholder_prefix.trim().is_empty() {
        anyhow::bail!("naming.placeholder_prefix must not be empty");
    }

    Ok(())
}
