//! Service roles, persisted service records and their validated form.
//!
//! A [`ServiceRecord`] is what configuration ingestion produces: loosely typed,
//! every field optional. [`ServiceRecord::validate`] turns it into an immutable
//! [`ServiceSpecification`], the only shape the rest of the core accepts.

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use log::warn;
use serde::{Deserialize, Serialize};

use super::{
    error::{PortError, SpecError},
    tier::LoadLevel,
};

/// Function a container fills in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    Database,
    Cache,
    LoadBalancer,
    PrimaryServer,
    SecondaryServer,
    Other,
}

impl ServiceRole {
    pub const ALL: [ServiceRole; 6] = [
        ServiceRole::Database,
        ServiceRole::Cache,
        ServiceRole::LoadBalancer,
        ServiceRole::PrimaryServer,
        ServiceRole::SecondaryServer,
        ServiceRole::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRole::Database => "database",
            ServiceRole::Cache => "cache",
            ServiceRole::LoadBalancer => "load_balancer",
            ServiceRole::PrimaryServer => "primary_server",
            ServiceRole::SecondaryServer => "secondary_server",
            ServiceRole::Other => "other",
        }
    }

    /// Well known images for the role, latest tags.
    pub fn suggested_images(&self) -> &'static [&'static str] {
        match self {
            ServiceRole::Database => &[
                "postgres:latest",
                "mysql:latest",
                "mongo:latest",
                "cassandra:latest",
            ],
            ServiceRole::Cache => &["redis:latest", "memcached:latest"],
            ServiceRole::LoadBalancer => &["haproxy:latest", "nginx:latest", "traefik:latest"],
            ServiceRole::PrimaryServer => &["nginx:latest", "httpd:latest", "caddy:latest"],
            ServiceRole::SecondaryServer => &["httpd:latest", "caddy:latest"],
            ServiceRole::Other => &["alpine:latest"],
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceRole {
    type Err = SpecError;

    /// Accepts the canonical names and the short legacy tags (`DB`, `LB`, `Server_main`, ...).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SpecError::MissingRole);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(ServiceRole::Database),
            "cache" => Ok(ServiceRole::Cache),
            "load_balancer" | "lb" => Ok(ServiceRole::LoadBalancer),
            "primary_server" | "server_main" => Ok(ServiceRole::PrimaryServer),
            "secondary_server" | "server_add" => Ok(ServiceRole::SecondaryServer),
            "other" => Ok(ServiceRole::Other),
            _ => Err(SpecError::UnknownRole(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    Always,
    OnFailure,
    No,
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::No => "no",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = SpecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "always" => Ok(RestartPolicy::Always),
            "on-failure" => Ok(RestartPolicy::OnFailure),
            "no" => Ok(RestartPolicy::No),
            "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
            _ => Err(SpecError::InvalidRestartPolicy(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// `host:container[/proto]`, both ports in 1..=65535.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    /// Docker style key of the container side, e.g. `80/tcp`.
    pub fn container_key(&self) -> String {
        format!("{}/{}", self.container, self.protocol.as_str())
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::Tcp => write!(f, "{}:{}", self.host, self.container),
            Protocol::Udp => write!(f, "{}:{}/udp", self.host, self.container),
        }
    }
}

impl FromStr for PortMapping {
    type Err = PortError;

    fn from_str(mapping: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = mapping.split(':').collect();
        let [host, container] = parts.as_slice() else {
            return Err(PortError::Format);
        };
        let (container, protocol) = match container.split_once('/') {
            Some((port, proto)) => match proto.to_ascii_lowercase().as_str() {
                "tcp" => (port, Protocol::Tcp),
                "udp" => (port, Protocol::Udp),
                _ => return Err(PortError::Protocol(proto.to_string())),
            },
            None => (*container, Protocol::Tcp),
        };
        Ok(PortMapping {
            host: parse_port(host).ok_or_else(|| PortError::HostPort(host.to_string()))?,
            container: parse_port(container)
                .ok_or_else(|| PortError::ContainerPort(container.to_string()))?,
            protocol,
        })
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u16>().ok().filter(|port| *port != 0)
}

/// Bind string `source:target[:mode]`, kept verbatim for the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeMapping(String);

impl VolumeMapping {
    pub fn source(&self) -> &str {
        self.0.split_once(':').map(|(source, _)| source).unwrap_or_default()
    }

    pub fn target(&self) -> &str {
        self.0.split_once(':').map(|(_, target)| target).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for VolumeMapping {
    type Err = SpecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.contains(':') {
            Ok(VolumeMapping(raw.to_string()))
        } else {
            Err(SpecError::InvalidVolume(raw.to_string()))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckRecord {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    pub start_period: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    pub test: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub start_period: Duration,
}

/// Lenient duration parse: empty or unparseable text is a zero duration.
pub fn parse_duration_lenient(field: &str, raw: &str) -> Duration {
    let raw = raw.trim();
    if raw.is_empty() {
        return Duration::ZERO;
    }
    humantime::parse_duration(raw).unwrap_or_else(|e| {
        warn!("Health check {} '{}' can't be parsed ({}), using 0s", field, raw, e);
        Duration::ZERO
    })
}

/// One persisted service entry, as read from a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceRecord {
    #[serde(alias = "container_type")]
    pub role: String,
    pub load_level: LoadLevel,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(alias = "cmd")]
    pub command: Vec<String>,
    pub env_vars: BTreeMap<String, String>,
    pub volumes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    pub ports: Vec<String>,
    pub restart_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckRecord>,
}

impl Default for ServiceRecord {
    fn default() -> Self {
        Self {
            role: String::new(),
            load_level: LoadLevel::default(),
            image: String::new(),
            container_name: None,
            hostname: None,
            working_dir: None,
            command: Vec::new(),
            env_vars: BTreeMap::new(),
            volumes: Vec::new(),
            network_mode: None,
            ports: Vec::new(),
            restart_policy: RestartPolicy::No.as_str().to_string(),
            network_id: None,
            health_check: None,
        }
    }
}

impl ServiceRecord {
    pub fn new(role: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Checks, in order: role, image, ports, volumes, restart policy.
    pub fn validate(self) -> Result<ServiceSpecification, SpecError> {
        let role: ServiceRole = self.role.parse()?;
        let image = self.image.trim();
        if image.is_empty() {
            return Err(SpecError::MissingImage);
        }
        let ports = self
            .ports
            .iter()
            .map(|mapping| {
                mapping.parse::<PortMapping>().map_err(|reason| SpecError::InvalidPort {
                    mapping: mapping.clone(),
                    reason,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let volumes = self
            .volumes
            .iter()
            .map(|volume| volume.parse::<VolumeMapping>())
            .collect::<Result<Vec<_>, _>>()?;
        let restart_policy: RestartPolicy = self.restart_policy.parse()?;

        let health_check = self
            .health_check
            .filter(|check| !check.test.is_empty())
            .map(|check| HealthCheckSpec {
                interval: parse_duration_lenient("interval", &check.interval),
                timeout: parse_duration_lenient("timeout", &check.timeout),
                start_period: parse_duration_lenient("start_period", &check.start_period),
                retries: check.retries,
                test: check.test,
            });

        Ok(ServiceSpecification {
            role,
            load_level: self.load_level,
            image: image.to_string(),
            container_name: non_empty(self.container_name),
            hostname: non_empty(self.hostname),
            working_dir: non_empty(self.working_dir),
            command: self.command,
            env_vars: self.env_vars,
            volumes,
            network_mode: non_empty(self.network_mode),
            ports,
            restart_policy,
            network_id: non_empty(self.network_id),
            health_check,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<ServiceRecord> for ServiceSpecification {
    type Error = SpecError;

    fn try_from(record: ServiceRecord) -> Result<Self, Self::Error> {
        record.validate()
    }
}

/// Validated, immutable description of one container's desired configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpecification {
    role: ServiceRole,
    load_level: LoadLevel,
    image: String,
    container_name: Option<String>,
    hostname: Option<String>,
    working_dir: Option<String>,
    command: Vec<String>,
    env_vars: BTreeMap<String, String>,
    volumes: Vec<VolumeMapping>,
    network_mode: Option<String>,
    ports: Vec<PortMapping>,
    restart_policy: RestartPolicy,
    network_id: Option<String>,
    health_check: Option<HealthCheckSpec>,
}

impl ServiceSpecification {
    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn load_level(&self) -> LoadLevel {
        self.load_level
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn container_name(&self) -> Option<&str> {
        self.container_name.as_deref()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// `KEY=value` pairs, sorted by key.
    pub fn env(&self) -> Vec<String> {
        self.env_vars
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }

    pub fn volumes(&self) -> &[VolumeMapping] {
        &self.volumes
    }

    pub fn network_mode(&self) -> Option<&str> {
        self.network_mode.as_deref()
    }

    pub fn ports(&self) -> &[PortMapping] {
        &self.ports
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy
    }

    pub fn network_id(&self) -> Option<&str> {
        self.network_id.as_deref()
    }

    pub fn health_check(&self) -> Option<&HealthCheckSpec> {
        self.health_check.as_ref()
    }
}

impl From<&ServiceSpecification> for ServiceRecord {
    fn from(spec: &ServiceSpecification) -> Self {
        ServiceRecord {
            role: spec.role.as_str().to_string(),
            load_level: spec.load_level,
            image: spec.image.clone(),
            container_name: spec.container_name.clone(),
            hostname: spec.hostname.clone(),
            working_dir: spec.working_dir.clone(),
            command: spec.command.clone(),
            env_vars: spec.env_vars.clone(),
            volumes: spec.volumes.iter().map(|v| v.as_str().to_string()).collect(),
            network_mode: spec.network_mode.clone(),
            ports: spec.ports.iter().map(ToString::to_string).collect(),
            restart_policy: spec.restart_policy.as_str().to_string(),
            network_id: spec.network_id.clone(),
            health_check: spec.health_check.as_ref().map(|check| HealthCheckRecord {
                test: check.test.clone(),
                interval: humantime::format_duration(check.interval).to_string(),
                timeout: humantime::format_duration(check.timeout).to_string(),
                retries: check.retries,
                start_period: humantime::format_duration(check.start_period).to_string(),
            }),
        }
    }
}
