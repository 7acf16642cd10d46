use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,

    /// Indent multistatus bodies; off keeps responses compact.
    #[serde(default)]
    pub pretty_print: bool,

    #[serde(default)]
    pub locks: LockTuning,

    pub mounts: Vec<MountConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LockTuning {
    #[serde(default = "default_max_timeout")]
    pub max_timeout_seconds: u32,
    #[serde(default = "default_timeout")]
    pub default_timeout_seconds: u32,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl Default for LockTuning {
    fn default() -> Self {
        Self {
            max_timeout_seconds: default_max_timeout(),
            default_timeout_seconds: default_timeout(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

fn default_max_timeout() -> u32 {
    604800
}

fn default_timeout() -> u32 {
    3600
}

fn default_sweep_interval() -> u64 {
    1000
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MountConfig {
    pub prefix: String,
    pub backend: Backend,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Memory,
}

pub fn read_config(config_file: PathBuf) -> Result<Config> {
    let raw = std::fs::read_to_string(&config_file)
        .with_context(|| format!("unable to read {}", config_file.display()))?;
    toml::from_str(&raw).with_context(|| format!("unable to parse {}", config_file.display()))
}
