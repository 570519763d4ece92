//! Scripted in-memory runtime for controller tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Error};
use async_trait::async_trait;

use super::{
    model::{ContainerParams, HealthStatus, RuntimeVersion},
    port::ContainerRuntime,
};

#[derive(Default)]
struct MockState {
    unreachable: bool,
    bad_images: HashSet<String>,
    failing_create: HashSet<String>,
    failing_start: HashSet<String>,
    failing_stop: HashSet<String>,
    failing_inspect: HashSet<String>,
    pull_delay: Option<Duration>,
    health: HashMap<String, HealthStatus>,
    containers: HashMap<String, String>,
    pulls: Vec<String>,
    created: Vec<String>,
    started: Vec<String>,
    stopped: Vec<String>,
}

/// Clones share state, so a test keeps one handle after boxing another.
#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(self, change: impl FnOnce(&mut MockState)) -> Self {
        change(&mut self.state.lock().unwrap());
        self
    }

    pub fn unreachable(self) -> Self {
        self.with(|state| state.unreachable = true)
    }

    pub fn failing_pull(self, image: &str) -> Self {
        self.with(|state| {
            state.bad_images.insert(image.to_string());
        })
    }

    pub fn failing_create(self, image: &str) -> Self {
        self.with(|state| {
            state.failing_create.insert(image.to_string());
        })
    }

    pub fn failing_start(self, image: &str) -> Self {
        self.with(|state| {
            state.failing_start.insert(image.to_string());
        })
    }

    pub fn failing_stop(self, image: &str) -> Self {
        self.with(|state| {
            state.failing_stop.insert(image.to_string());
        })
    }

    pub fn failing_inspect(self, image: &str) -> Self {
        self.with(|state| {
            state.failing_inspect.insert(image.to_string());
        })
    }

    pub fn slow_pulls(self, delay: Duration) -> Self {
        self.with(|state| state.pull_delay = Some(delay))
    }

    pub fn health(self, image: &str, status: HealthStatus) -> Self {
        self.with(|state| {
            state.health.insert(image.to_string(), status);
        })
    }

    pub fn boxed(&self) -> Box<dyn ContainerRuntime + Send + Sync> {
        Box::new(self.clone())
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().unwrap().stopped.clone()
    }

    fn image_of(&self, container_id: &str) -> Result<String, Error> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(container_id)
            .cloned()
            .ok_or_else(|| anyhow!("no such container: {}", container_id))
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<RuntimeVersion, Error> {
        if self.state.lock().unwrap().unreachable {
            return Err(anyhow!("connection refused"));
        }
        Ok(RuntimeVersion {
            api_version: "1.45".to_string(),
            version: "mock".to_string(),
            os_type: "linux".to_string(),
        })
    }

    async fn create(&self, params: &ContainerParams) -> Result<String, Error> {
        let mut state = self.state.lock().unwrap();
        if state.failing_create.contains(&params.create.image) {
            return Err(anyhow!("conflict: name {} already in use", params.name));
        }
        let id = format!("mock-{}", state.containers.len() + 1);
        state.containers.insert(id.clone(), params.create.image.clone());
        state.created.push(params.name.clone());
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> Result<(), Error> {
        let image = self.image_of(container_id)?;
        let mut state = self.state.lock().unwrap();
        if state.failing_start.contains(&image) {
            return Err(anyhow!("port is already allocated"));
        }
        state.started.push(container_id.to_string());
        Ok(())
    }

    async fn stop(&self, container_id: &str) -> Result<(), Error> {
        let image = self.image_of(container_id)?;
        let mut state = self.state.lock().unwrap();
        if state.failing_stop.contains(&image) {
            return Err(anyhow!("container did not stop in time"));
        }
        state.stopped.push(container_id.to_string());
        Ok(())
    }

    async fn inspect_health(&self, container_id: &str) -> Result<HealthStatus, Error> {
        let image = self.image_of(container_id)?;
        let state = self.state.lock().unwrap();
        if state.failing_inspect.contains(&image) {
            return Err(anyhow!("inspect failed"));
        }
        Ok(state.health.get(&image).copied().unwrap_or(HealthStatus::Healthy))
    }

    async fn pull_image(&self, image: &str) -> Result<(), Error> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.pulls.push(image.to_string());
            if state.bad_images.contains(image) {
                return Err(anyhow!("pull access denied for {}", image));
            }
            state.pull_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}
