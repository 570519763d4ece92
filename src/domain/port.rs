use anyhow::Error;
use async_trait::async_trait;

use super::model::{ContainerParams, HealthStatus, RuntimeVersion};

/// Everything the orchestration core needs from a container engine.
///
/// Calls block until the engine answered; deadlines and cancellation are
/// applied by the caller around each future.
#[async_trait]
pub trait ContainerRuntime {
    async fn ping(&self) -> Result<RuntimeVersion, Error>;

    /// Creates the container and returns its runtime identifier.
    async fn create(&self, params: &ContainerParams) -> Result<String, Error>;

    async fn start(&self, container_id: &str) -> Result<(), Error>;

    async fn stop(&self, container_id: &str) -> Result<(), Error>;

    async fn inspect_health(&self, container_id: &str) -> Result<HealthStatus, Error>;

    /// Resolves only once the progress stream has been fully drained.
    async fn pull_image(&self, image: &str) -> Result<(), Error>;
}
