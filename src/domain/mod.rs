use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};

use anyhow::anyhow;
use entity::{ContainerEntity, EntityStatus};
use error::{OrchestrationError, Result};
use futures::future::join_all;
use itertools::Itertools;
use log::{debug, error, info, warn};
use model::HealthStatus;
use port::ContainerRuntime;
use registry::ContainerRegistry;
use spec::ServiceRole;
use split_iter::Splittable;
use tokio_util::sync::CancellationToken;

pub mod catalog;
pub mod defaults;
pub mod entity;
pub mod error;
pub mod model;
pub mod port;
pub mod registry;
pub mod spec;
pub mod tier;

#[cfg(test)]
pub(crate) mod testing;

/// A per-entity runtime error, recorded instead of aborting sibling work.
#[derive(Debug)]
pub struct RoleFailure {
    pub role: ServiceRole,
    pub error: OrchestrationError,
}

/// Outcome of a fan-out over the registry. Empty means every entity succeeded.
#[derive(Debug, Default)]
pub struct FailureReport {
    pub failures: Vec<RoleFailure>,
}

impl FailureReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn roles(&self) -> Vec<ServiceRole> {
        self.failures.iter().map(|failure| failure.role).collect()
    }

    fn record(&mut self, error: OrchestrationError) {
        match error.role() {
            Some(role) => self.failures.push(RoleFailure { role, error }),
            None => warn!("Dropping failure without a role: {}", error),
        }
    }
}

/// Health per role; a failed poll is kept as that role's error.
#[derive(Debug, Default)]
pub struct HealthReport {
    pub results: BTreeMap<ServiceRole, Result<HealthStatus>>,
}

impl HealthReport {
    pub fn status(&self, role: ServiceRole) -> Option<HealthStatus> {
        self.results
            .get(&role)
            .and_then(|result| result.as_ref().ok().copied())
    }

    pub fn failures(&self) -> impl Iterator<Item = (ServiceRole, &OrchestrationError)> {
        self.results
            .iter()
            .filter_map(|(role, result)| result.as_ref().err().map(|error| (*role, error)))
    }

    /// True when every role answered and none is unhealthy.
    pub fn is_healthy(&self) -> bool {
        self.results
            .values()
            .all(|result| matches!(result, Ok(status) if *status != HealthStatus::Unhealthy))
    }
}

/// Drives container lifecycles against a runtime.
///
/// Holds no registry: every operation borrows one for its duration and only
/// writes entity `id`/`status`, always after the runtime answered. Creates
/// are never rolled back; a container whose start failed stays created on the
/// runtime and is left to the caller to reconcile. Nothing is retried here.
pub struct Orchestrator {
    runtime: Box<dyn ContainerRuntime + Send + Sync>,
    call_timeout: Duration,
}

impl Orchestrator {
    /// Pings the runtime once and refuses to build when it does not answer.
    pub async fn connect(
        runtime: Box<dyn ContainerRuntime + Send + Sync>,
        call_timeout: Duration,
    ) -> Result<Self> {
        let orchestrator = Self {
            runtime,
            call_timeout,
        };
        let version = orchestrator
            .guarded(&CancellationToken::new(), orchestrator.runtime.ping())
            .await
            .map_err(OrchestrationError::RuntimeUnavailable)?;
        info!(
            "Container runtime reachable: engine {} (API {}) on {}",
            version.version, version.api_version, version.os_type
        );
        Ok(orchestrator)
    }

    /// Applies the call deadline and the caller's cancellation to one runtime call.
    async fn guarded<T, F>(&self, cancel: &CancellationToken, call: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(anyhow!("operation cancelled")),
            outcome = tokio::time::timeout(self.call_timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(anyhow!(
                    "no answer within {}",
                    humantime::format_duration(self.call_timeout)
                )),
            },
        }
    }

    /// Pulls every distinct image once. A failed pull is reported for every
    /// role using that image; only those still `Defined` become `Failed`, so
    /// containers that already exist keep their lifecycle. All pulls are
    /// always attempted.
    pub async fn ensure_images(
        &self,
        registry: &ContainerRegistry,
        cancel: &CancellationToken,
    ) -> FailureReport {
        let by_image = registry
            .entities()
            .await
            .into_iter()
            .into_group_map_by(|entity| entity.image().to_string());

        let outcomes = join_all(by_image.into_iter().map(|(image, entities)| async move {
            match self.guarded(cancel, self.runtime.pull_image(&image)).await {
                Ok(()) => {
                    info!("Image {} available for {}", image, roles_of(&entities));
                    Vec::new()
                }
                Err(e) => {
                    error!("Error pulling image {}: {:#}", image, e);
                    let reason = format!("{:#}", e);
                    let mut failures = Vec::with_capacity(entities.len());
                    for entity in entities {
                        let _lifecycle = entity.lock_lifecycle().await;
                        if entity.status().await == EntityStatus::Defined {
                            entity.mark_failed().await;
                        }
                        failures.push(OrchestrationError::ImagePull {
                            role: entity.role(),
                            image: image.clone(),
                            source: anyhow!(reason.clone()),
                        });
                    }
                    failures
                }
            }
        }))
        .await;

        let mut report = FailureReport::default();
        outcomes.into_iter().flatten().for_each(|e| report.record(e));
        report
    }

    /// Creates then starts one entity. Either failure leaves it `Failed`; a
    /// start failure leaves the created container behind on the runtime.
    pub async fn create_and_start(
        &self,
        entity: &ContainerEntity,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _lifecycle = entity.lock_lifecycle().await;
        let role = entity.role();
        let status = entity.status().await;
        if status != EntityStatus::Defined {
            return Err(OrchestrationError::InvalidTransition {
                role,
                from: status,
                to: EntityStatus::Created,
            });
        }

        let id = match self.guarded(cancel, self.runtime.create(entity.params())).await {
            Ok(id) => id,
            Err(source) => {
                error!("Failed to create container {} for {}: {:#}", entity.name(), role, source);
                entity.mark_failed().await;
                return Err(OrchestrationError::Create { role, source });
            }
        };
        entity.mark_created(id.clone()).await?;
        info!("Container {} created for {} ({})", entity.name(), role, id);

        if let Err(source) = self.guarded(cancel, self.runtime.start(&id)).await {
            error!(
                "Failed to start container {} for {}, left created: {:#}",
                id, role, source
            );
            entity.mark_failed().await;
            return Err(OrchestrationError::Start { role, source });
        }
        entity.transition(EntityStatus::Running).await?;
        info!("Container {} started for {}", id, role);
        Ok(())
    }

    pub async fn start(
        &self,
        registry: &ContainerRegistry,
        role: ServiceRole,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let entity = registry.get(role).await?;
        self.start_entity(&entity, cancel).await
    }

    pub async fn stop(
        &self,
        registry: &ContainerRegistry,
        role: ServiceRole,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let entity = registry.get(role).await?;
        self.stop_entity(&entity, cancel).await
    }

    /// Status is untouched when the runtime refuses; the caller may retry.
    async fn start_entity(&self, entity: &ContainerEntity, cancel: &CancellationToken) -> Result<()> {
        let _lifecycle = entity.lock_lifecycle().await;
        let id = runtime_id(entity, EntityStatus::Running).await?;
        self.guarded(cancel, self.runtime.start(&id))
            .await
            .map_err(|source| {
                error!("Failed to start container {}: {:#}", id, source);
                OrchestrationError::Start {
                    role: entity.role(),
                    source,
                }
            })?;
        entity.transition(EntityStatus::Running).await?;
        info!("Container {} started for {}", id, entity.role());
        Ok(())
    }

    async fn stop_entity(&self, entity: &ContainerEntity, cancel: &CancellationToken) -> Result<()> {
        let _lifecycle = entity.lock_lifecycle().await;
        let id = runtime_id(entity, EntityStatus::Stopped).await?;
        self.guarded(cancel, self.runtime.stop(&id))
            .await
            .map_err(|source| {
                error!("Failed to stop container {}: {:#}", id, source);
                OrchestrationError::Stop {
                    role: entity.role(),
                    source,
                }
            })?;
        entity.transition(EntityStatus::Stopped).await?;
        info!("Container {} stopped for {}", id, entity.role());
        Ok(())
    }

    pub async fn poll_health(
        &self,
        registry: &ContainerRegistry,
        role: ServiceRole,
        cancel: &CancellationToken,
    ) -> Result<HealthStatus> {
        let entity = registry.get(role).await?;
        self.poll_entity(&entity, cancel).await
    }

    async fn poll_entity(
        &self,
        entity: &ContainerEntity,
        cancel: &CancellationToken,
    ) -> Result<HealthStatus> {
        let role = entity.role();
        if !entity.has_health_check() {
            return Ok(HealthStatus::Unknown);
        }
        let summary = entity.summary().await;
        let id = match (summary.status, summary.id) {
            (EntityStatus::Running, Some(id)) => id,
            (status, _) => {
                return Err(OrchestrationError::HealthCheck {
                    role,
                    source: anyhow!("container is {}, not running", status),
                })
            }
        };
        let health = self
            .guarded(cancel, self.runtime.inspect_health(&id))
            .await
            .map_err(|source| OrchestrationError::HealthCheck { role, source })?;
        debug!("Container {} for {} is {}", id, role, health);
        Ok(health)
    }

    /// Polls every role concurrently; one failed poll never hides the others.
    pub async fn poll_all_health(
        &self,
        registry: &ContainerRegistry,
        cancel: &CancellationToken,
    ) -> HealthReport {
        let entities = registry.entities().await;
        let results = join_all(entities.iter().map(|entity| async move {
            (entity.role(), self.poll_entity(entity, cancel).await)
        }))
        .await;

        for (role, result) in &results {
            match result {
                Ok(status) => info!("{} health status: {}", role, status),
                Err(e) => error!("Error checking health: {}", e.describe()),
            }
        }
        HealthReport {
            results: results.into_iter().collect(),
        }
    }

    /// Pulls images, then creates and starts every entity still `Defined`.
    pub async fn provision(
        &self,
        registry: &ContainerRegistry,
        cancel: &CancellationToken,
    ) -> FailureReport {
        let mut report = self.ensure_images(registry, cancel).await;

        let entities = registry.entities().await;
        let statuses = join_all(entities.iter().map(|entity| entity.status())).await;
        let (skipped, eligible) = entities
            .into_iter()
            .zip(statuses)
            .split(|(_, status)| *status == EntityStatus::Defined);
        let skipped: Vec<ServiceRole> = skipped.map(|(entity, _)| entity.role()).collect();
        if !skipped.is_empty() {
            warn!("Not starting {} ({} service(s) not defined)", skipped.iter().join(", "), skipped.len());
        }

        let eligible: Vec<Arc<ContainerEntity>> = eligible.map(|(entity, _)| entity).collect();
        let outcomes = join_all(
            eligible
                .iter()
                .map(|entity| self.create_and_start(entity, cancel)),
        )
        .await;
        outcomes
            .into_iter()
            .filter_map(|outcome| outcome.err())
            .for_each(|e| report.record(e));

        if report.is_success() {
            info!("All {} services provisioned", eligible.len());
        } else {
            warn!("{} service(s) failed to provision", report.failures.len());
        }
        report
    }

    /// Stops every running entity, collecting failures per role.
    pub async fn stop_all(
        &self,
        registry: &ContainerRegistry,
        cancel: &CancellationToken,
    ) -> FailureReport {
        let entities = registry.entities().await;
        let statuses = join_all(entities.iter().map(|entity| entity.status())).await;
        let running: Vec<&Arc<ContainerEntity>> = entities
            .iter()
            .zip(statuses)
            .filter(|(_, status)| *status == EntityStatus::Running)
            .map(|(entity, _)| entity)
            .collect();

        let outcomes = join_all(running.into_iter().map(|entity| self.stop_entity(entity, cancel))).await;
        let mut report = FailureReport::default();
        outcomes
            .into_iter()
            .filter_map(|outcome| outcome.err())
            .for_each(|e| report.record(e));
        report
    }
}

/// Runtime id of an entity allowed to move to `next`.
async fn runtime_id(entity: &ContainerEntity, next: EntityStatus) -> Result<String> {
    let summary = entity.summary().await;
    match summary.id {
        Some(id) if summary.status.can_become(next) => Ok(id),
        _ => Err(OrchestrationError::InvalidTransition {
            role: entity.role(),
            from: summary.status,
            to: next,
        }),
    }
}

fn roles_of(entities: &[Arc<ContainerEntity>]) -> String {
    entities.iter().map(|entity| entity.role()).join(", ")
}
