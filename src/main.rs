use anyhow::Context;
use bollard::{Docker, API_DEFAULT_VERSION};
use harbormaster::{
    config::load_config,
    domain::{
        catalog::SpecificationCatalog,
        defaults::{default_catalog, DEFAULT_TOPOLOGY},
        registry::ContainerRegistry,
        FailureReport, Orchestrator,
    },
    infra::{docker::DockerRuntime, ingest::load_catalog},
};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Start Harbormaster - container orchestration for a fixed service topology");

    let config = load_config()?;
    info!("Loaded config {:?}", config);
    let docker = Docker::connect_with_socket(
        &config.docker_socket,
        config.docker_timeout_secs,
        API_DEFAULT_VERSION,
    )
    .context("Can't connect to docker socket")?;

    let orchestrator = Orchestrator::connect(
        Box::new(DockerRuntime {
            docker,
            always_pull: config.always_pull,
            stop_grace_secs: config.stop_grace_secs,
        }),
        config.call_timeout(),
    )
    .await?;

    let catalog: SpecificationCatalog = match config.catalog_path {
        Some(ref path) => load_catalog(path),
        None => {
            info!("No catalog file configured, using the default topology");
            default_catalog(&DEFAULT_TOPOLOGY)
        }
    }
    .context("Can't build the service catalog")?;
    let registry = ContainerRegistry::new(&catalog)?;
    info!("Managing {} service(s): {:?}", catalog.len(), catalog.roles());

    let cancel = CancellationToken::new();
    let provisioning = orchestrator.provision(&registry, &cancel);
    tokio::pin!(provisioning);
    // Ctrl-C cancels in-flight calls and lets provisioning record what it created.
    let interrupted = tokio::select! {
        provisioned = &mut provisioning => {
            report("Provisioning", &provisioned);
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested during provisioning, cancelling");
            cancel.cancel();
            report("Provisioning", &(&mut provisioning).await);
            true
        }
    };
    for summary in registry.summaries().await {
        info!(
            "{} -> {} [{}] {}",
            summary.role,
            summary.name,
            summary.status,
            summary.id.as_deref().unwrap_or("-")
        );
    }

    if !interrupted {
        let mut ticker = tokio::time::interval(config.health_interval());
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested, stopping running containers");
                    cancel.cancel();
                    break;
                }
                _ = ticker.tick() => {
                    let health = orchestrator.poll_all_health(&registry, &cancel).await;
                    if !health.is_healthy() {
                        warn!("Not every service is healthy");
                    }
                }
            }
        }
    }

    // The provisioning token is cancelled, shutdown gets a fresh one.
    report("Shutdown", &orchestrator.stop_all(&registry, &CancellationToken::new()).await);
    Ok(())
}

fn report(stage: &str, report: &FailureReport) {
    for failure in &report.failures {
        if failure.error.is_per_entity() {
            error!("{} failed for {}: {}", stage, failure.role, failure.error.describe());
        } else {
            warn!("{} skipped {}: {}", stage, failure.role, failure.error.describe());
        }
    }
}
