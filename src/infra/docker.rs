use std::{collections::HashMap, time::Duration};

use anyhow::{anyhow, Context, Error};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, NetworkingConfig,
        StartContainerOptions, StopContainerOptions,
    },
    image::CreateImageOptions,
    secret::{
        CreateImageInfo, EndpointSettings, HealthConfig, HealthStatusEnum, HostConfig,
        PortBinding, RestartPolicy as DockerRestartPolicy, RestartPolicyNameEnum,
    },
    Docker,
};
use futures::TryStreamExt;
use log::{debug, info};
use map_macro::hash_map;

use crate::domain::{
    model::{ContainerParams, HealthStatus, RuntimeVersion},
    port::ContainerRuntime,
    spec::RestartPolicy,
};

pub struct DockerRuntime {
    pub docker: Docker,
    /// Pull even when the image is already present locally.
    pub always_pull: bool,
    /// Seconds the engine waits before killing a stopping container.
    pub stop_grace_secs: i64,
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<RuntimeVersion, Error> {
        let version = self
            .docker
            .version()
            .await
            .context("Can't reach docker daemon")?;
        Ok(RuntimeVersion {
            api_version: version.api_version.unwrap_or_default(),
            version: version.version.unwrap_or_default(),
            os_type: version.os.unwrap_or_default(),
        })
    }

    async fn create(&self, params: &ContainerParams) -> Result<String, Error> {
        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: params.name.clone(),
                    platform: None,
                }),
                container_config(params),
            )
            .await
            .context(format!("Error while creating container {}", params.name))?;
        for warning in container.warnings {
            info!("Docker warning for {}: {}", params.name, warning);
        }
        Ok(container.id)
    }

    async fn start(&self, container_id: &str) -> Result<(), Error> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .context(format!("Error while starting container {}", container_id))
    }

    async fn stop(&self, container_id: &str) -> Result<(), Error> {
        self.docker
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: self.stop_grace_secs,
                }),
            )
            .await
            .context(format!("Error while stopping container {}", container_id))
    }

    async fn inspect_health(&self, container_id: &str) -> Result<HealthStatus, Error> {
        let container = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .context(format!("Error while inspecting container {}", container_id))?;
        Ok(health_status(
            container
                .state
                .and_then(|state| state.health)
                .and_then(|health| health.status),
        ))
    }

    async fn pull_image(&self, image: &str) -> Result<(), Error> {
        if !self.always_pull && self.docker.inspect_image(image).await.is_ok() {
            debug!("Image {} already present, skipping pull", image);
            return Ok(());
        }
        info!("Pull image {}", image);
        let progress = self
            .docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: image,
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<CreateImageInfo>>()
            .await
            .context("Error while pulling image")?;
        // The daemon reports some failures inside an otherwise successful stream.
        match progress.into_iter().find_map(|info| info.error) {
            Some(error) => Err(anyhow!("Error while pulling image: {}", error)),
            None => Ok(()),
        }
    }
}

fn container_config(params: &ContainerParams) -> Config<String> {
    let create = &params.create;
    let host = &params.host;

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for mapping in &host.port_bindings {
        port_bindings
            .entry(mapping.container_key())
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: None,
                host_port: Some(mapping.host.to_string()),
            });
    }
    let exposed_ports: HashMap<String, HashMap<(), ()>> = port_bindings
        .keys()
        .map(|key| (key.clone(), HashMap::new()))
        .collect();

    Config {
        image: Some(create.image.clone()),
        env: non_empty(create.env.clone()),
        hostname: create.hostname.clone(),
        working_dir: create.working_dir.clone(),
        cmd: non_empty(create.command.clone()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        healthcheck: params.health_check.as_ref().map(|check| HealthConfig {
            test: Some(check.test.clone()),
            interval: nanos(check.interval),
            timeout: nanos(check.timeout),
            retries: Some(i64::from(check.retries)),
            start_period: nanos(check.start_period),
            ..Default::default()
        }),
        host_config: Some(HostConfig {
            binds: non_empty(host.binds.clone()),
            network_mode: host.network_mode.clone(),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            restart_policy: Some(DockerRestartPolicy {
                name: Some(restart_policy_name(host.restart_policy)),
                maximum_retry_count: None,
            }),
            cpu_shares: Some(host.resources.cpu_shares),
            memory: Some(host.resources.memory),
            memory_reservation: Some(host.resources.memory_reservation),
            memory_swap: Some(host.resources.memory_swap),
            blkio_weight: Some(host.resources.blkio_weight),
            ..Default::default()
        }),
        networking_config: params.network.endpoint.as_ref().map(|endpoint| NetworkingConfig {
            endpoints_config: hash_map! {
                endpoint.network_id.clone() => EndpointSettings {
                    aliases: non_empty(endpoint.aliases.clone()),
                    ..Default::default()
                }
            },
        }),
        ..Default::default()
    }
}

fn restart_policy_name(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}

/// Containers without a health check report no health at all.
fn health_status(status: Option<HealthStatusEnum>) -> HealthStatus {
    match status {
        Some(HealthStatusEnum::HEALTHY) => HealthStatus::Healthy,
        Some(HealthStatusEnum::UNHEALTHY) => HealthStatus::Unhealthy,
        Some(HealthStatusEnum::STARTING) => HealthStatus::Starting,
        _ => HealthStatus::Unknown,
    }
}

fn nanos(duration: Duration) -> Option<i64> {
    match duration.as_nanos() {
        0 => None,
        n => Some(i64::try_from(n).unwrap_or(i64::MAX)),
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}
