use thiserror::Error;

use super::{entity::EntityStatus, spec::ServiceRole};

/// Why a single port mapping is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("must have format 'hostPort:containerPort[/proto]'")]
    Format,
    #[error("invalid host port '{0}': must be a number between 1 and 65535")]
    HostPort(String),
    #[error("invalid container port '{0}': must be a number between 1 and 65535")]
    ContainerPort(String),
    #[error("invalid protocol '{0}': must be tcp or udp")]
    Protocol(String),
}

/// Why a service record fails validation. Carries the offending field value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("service role is required")]
    MissingRole,
    #[error("unknown service role '{0}'")]
    UnknownRole(String),
    #[error("image is required")]
    MissingImage,
    #[error("invalid port mapping '{mapping}': {reason}")]
    InvalidPort { mapping: String, reason: PortError },
    #[error("invalid volume format '{0}', must be 'source:target'")]
    InvalidVolume(String),
    #[error("invalid restart policy '{0}'")]
    InvalidRestartPolicy(String),
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("specification #{index} is invalid")]
    InvalidSpecification {
        index: usize,
        #[source]
        source: SpecError,
    },

    #[error("unsupported catalog file extension '{0}'")]
    UnsupportedFormat(String),

    #[error("failed to deserialize catalog file {path}: {reason}")]
    Deserialization { path: String, reason: String },

    #[error("can't read catalog file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("can't build container entity for {role}: {reason}")]
    EntityConstruction { role: ServiceRole, reason: String },

    /// Registry and catalog sizes diverged. Always a bug, never user input.
    #[error("registry holds {registry} entities but catalog holds {catalog} specifications")]
    RegistryMismatch { catalog: usize, registry: usize },

    #[error("container runtime unavailable")]
    RuntimeUnavailable(#[source] anyhow::Error),

    #[error("no container registered for {0}")]
    NotFound(ServiceRole),

    #[error("{role} can't move from {from} to {to}")]
    InvalidTransition {
        role: ServiceRole,
        from: EntityStatus,
        to: EntityStatus,
    },

    #[error("failed to pull image {image} for {role}")]
    ImagePull {
        role: ServiceRole,
        image: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create container for {role}")]
    Create {
        role: ServiceRole,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to start container for {role}")]
    Start {
        role: ServiceRole,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to stop container for {role}")]
    Stop {
        role: ServiceRole,
        #[source]
        source: anyhow::Error,
    },

    #[error("health check failed for {role}")]
    HealthCheck {
        role: ServiceRole,
        #[source]
        source: anyhow::Error,
    },
}

impl OrchestrationError {
    /// Message followed by every underlying cause, `: `-separated.
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        text
    }

    /// Per-entity runtime errors are aggregated; everything else aborts the caller.
    pub fn is_per_entity(&self) -> bool {
        matches!(
            self,
            Self::ImagePull { .. }
                | Self::Create { .. }
                | Self::Start { .. }
                | Self::Stop { .. }
                | Self::HealthCheck { .. }
        )
    }

    pub fn role(&self) -> Option<ServiceRole> {
        match self {
            Self::EntityConstruction { role, .. }
            | Self::InvalidTransition { role, .. }
            | Self::ImagePull { role, .. }
            | Self::Create { role, .. }
            | Self::Start { role, .. }
            | Self::Stop { role, .. }
            | Self::HealthCheck { role, .. } => Some(*role),
            Self::NotFound(role) => Some(*role),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn port_error_names_the_host_segment() {
        let err = SpecError::InvalidPort {
            mapping: "abc:80".to_string(),
            reason: PortError::HostPort("abc".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "invalid port mapping 'abc:80': invalid host port 'abc': must be a number between 1 and 65535"
        );
    }

    #[test]
    fn index_is_stamped_on_invalid_specification() {
        let err = OrchestrationError::InvalidSpecification {
            index: 2,
            source: SpecError::MissingImage,
        };
        assert_eq!(err.to_string(), "specification #2 is invalid");
        assert_eq!(err.describe(), "specification #2 is invalid: image is required");
    }

    #[test]
    fn runtime_failures_are_per_entity() {
        let pull = OrchestrationError::ImagePull {
            role: ServiceRole::Cache,
            image: "redis:latest".to_string(),
            source: anyhow!("manifest unknown"),
        };
        assert!(pull.is_per_entity());
        assert_eq!(
            pull.describe(),
            "failed to pull image redis:latest for cache: manifest unknown"
        );
        assert_eq!(pull.role(), Some(ServiceRole::Cache));

        let mismatch = OrchestrationError::RegistryMismatch {
            catalog: 2,
            registry: 1,
        };
        assert!(!mismatch.is_per_entity());
        assert_eq!(mismatch.role(), None);
    }
}
