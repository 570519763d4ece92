//! Orchestration core for a fixed topology of service containers.
//!
//! `domain` holds the validated model, the registry and the [`domain::Orchestrator`];
//! `infra` holds the Docker runtime and catalog-file adapters.

pub mod config;
pub mod domain;
pub mod infra;
