use std::{fmt, sync::Arc};

use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use super::{
    error::{OrchestrationError, Result},
    model::{
        ContainerParams, CreateParams, HealthCheckParams, HostParams, NetworkEndpoint,
        NetworkParams,
    },
    spec::{ServiceRole, ServiceSpecification},
    tier::tier,
};

/// Lifecycle of a managed container. `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Defined,
    Created,
    Running,
    Stopped,
    Failed,
}

impl EntityStatus {
    pub fn can_become(self, next: EntityStatus) -> bool {
        use EntityStatus::*;
        match (self, next) {
            (Failed, _) => false,
            (_, Failed) => true,
            (Defined, Created) | (Created, Running) | (Running, Stopped) | (Stopped, Running) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityStatus::Defined => "defined",
            EntityStatus::Created => "created",
            EntityStatus::Running => "running",
            EntityStatus::Stopped => "stopped",
            EntityStatus::Failed => "failed",
        })
    }
}

#[derive(Debug)]
struct EntityState {
    id: Option<String>,
    status: EntityStatus,
}

/// Point-in-time copy of an entity, safe to hand out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
    pub role: ServiceRole,
    pub name: String,
    pub image: String,
    pub id: Option<String>,
    pub status: EntityStatus,
}

/// Runtime-facing translation of one specification plus its lifecycle state.
///
/// The derived call parameters never change after construction. `id` and
/// `status` sit behind their own lock and are only written by the
/// orchestrator after the runtime confirmed a call.
#[derive(Debug)]
pub struct ContainerEntity {
    spec: Arc<ServiceSpecification>,
    params: ContainerParams,
    state: RwLock<EntityState>,
    // Serialises lifecycle operations (create, start, stop) on this entity.
    lifecycle: Mutex<()>,
}

impl ContainerEntity {
    /// Pure translation, no runtime call is made.
    pub fn new(spec: Arc<ServiceSpecification>) -> Result<Self> {
        let role = spec.role();
        let name = match spec.container_name() {
            Some(name) => name.to_string(),
            None => generated_name(role),
        };
        if !is_valid_container_name(&name) {
            return Err(OrchestrationError::EntityConstruction {
                role,
                reason: format!(
                    "container name '{}' must match [a-zA-Z0-9][a-zA-Z0-9_.-]+",
                    name
                ),
            });
        }

        let params = ContainerParams {
            name,
            create: CreateParams {
                image: spec.image().to_string(),
                env: spec.env(),
                hostname: spec.hostname().map(str::to_string),
                working_dir: spec.working_dir().map(str::to_string),
                command: spec.command().to_vec(),
            },
            host: HostParams {
                binds: spec.volumes().iter().map(|v| v.as_str().to_string()).collect(),
                network_mode: spec.network_mode().map(str::to_string),
                port_bindings: spec.ports().to_vec(),
                restart_policy: spec.restart_policy(),
                resources: tier(spec.load_level()),
            },
            network: NetworkParams {
                endpoint: spec.network_id().map(|network_id| NetworkEndpoint {
                    network_id: network_id.to_string(),
                    aliases: spec.hostname().map(str::to_string).into_iter().collect(),
                }),
            },
            health_check: spec.health_check().map(|check| HealthCheckParams {
                test: check.test.clone(),
                interval: check.interval,
                timeout: check.timeout,
                retries: check.retries,
                start_period: check.start_period,
            }),
        };

        Ok(Self {
            spec,
            params,
            state: RwLock::new(EntityState {
                id: None,
                status: EntityStatus::Defined,
            }),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn role(&self) -> ServiceRole {
        self.spec.role()
    }

    pub fn specification(&self) -> &Arc<ServiceSpecification> {
        &self.spec
    }

    pub fn params(&self) -> &ContainerParams {
        &self.params
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn image(&self) -> &str {
        &self.params.create.image
    }

    pub fn has_health_check(&self) -> bool {
        self.params.health_check.is_some()
    }

    pub async fn id(&self) -> Option<String> {
        self.state.read().await.id.clone()
    }

    pub async fn status(&self) -> EntityStatus {
        self.state.read().await.status
    }

    pub async fn summary(&self) -> EntitySummary {
        let state = self.state.read().await;
        EntitySummary {
            role: self.role(),
            name: self.params.name.clone(),
            image: self.params.create.image.clone(),
            id: state.id.clone(),
            status: state.status,
        }
    }

    pub(crate) async fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    pub(crate) async fn transition(&self, next: EntityStatus) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.status.can_become(next) {
            return Err(OrchestrationError::InvalidTransition {
                role: self.role(),
                from: state.status,
                to: next,
            });
        }
        state.status = next;
        Ok(())
    }

    /// Records the identifier the runtime assigned on create.
    pub(crate) async fn mark_created(&self, id: String) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.status.can_become(EntityStatus::Created) {
            return Err(OrchestrationError::InvalidTransition {
                role: self.role(),
                from: state.status,
                to: EntityStatus::Created,
            });
        }
        state.id = Some(id);
        state.status = EntityStatus::Created;
        Ok(())
    }

    pub(crate) async fn mark_failed(&self) {
        self.state.write().await.status = EntityStatus::Failed;
    }
}

fn generated_name(role: ServiceRole) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();
    format!("{}_{}", role, suffix.to_ascii_lowercase())
}

fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    name.len() > 1 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
