use std::time::Duration;

use anyhow::{Context, Error};
use config::{Config, Environment, File};

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub docker_socket: String,
    pub docker_timeout_secs: u64,
    /// Service catalog file (`.json`, `.yaml`, `.yml`). Unset means the built-in topology.
    pub catalog_path: Option<String>,
    pub call_timeout_secs: u64,
    pub health_interval_secs: u64,
    pub always_pull: bool,
    pub stop_grace_secs: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            docker_socket: "/var/run/docker.sock".to_string(),
            docker_timeout_secs: 120,
            catalog_path: None,
            call_timeout_secs: 300,
            health_interval_secs: 30,
            always_pull: false,
            stop_grace_secs: 10,
        }
    }
}

impl AppConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Never zero, the health ticker can't run with an empty period.
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }
}

pub fn load_config() -> Result<AppConfig, Error> {
    build(Config::builder()
        .add_source(File::with_name("harbormaster").required(false))
        .add_source(Environment::with_prefix("harbormaster")))
}

fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<AppConfig, Error> {
    builder
        .build()
        .context("Can't load configuration")?
        .try_deserialize()
        .context("Can't deserialize AppConfig from loaded configuration")
}
