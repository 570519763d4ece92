use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use super::{
    spec::{PortMapping, RestartPolicy},
    tier::ResourceEnvelope,
};

/// Parameters of a runtime `create` call, derived from one specification.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerParams {
    pub name: String,
    pub create: CreateParams,
    pub host: HostParams,
    pub network: NetworkParams,
    pub health_check: Option<HealthCheckParams>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateParams {
    pub image: String,
    pub env: Vec<String>,
    pub hostname: Option<String>,
    pub working_dir: Option<String>,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostParams {
    pub binds: Vec<String>,
    pub network_mode: Option<String>,
    pub port_bindings: Vec<PortMapping>,
    pub restart_policy: RestartPolicy,
    pub resources: ResourceEnvelope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkParams {
    pub endpoint: Option<NetworkEndpoint>,
}

/// Attachment to a named network, reachable there under its aliases.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkEndpoint {
    pub network_id: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckParams {
    pub test: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub start_period: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Starting,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Starting => "starting",
            HealthStatus::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeVersion {
    pub api_version: String,
    pub version: String,
    pub os_type: String,
}
