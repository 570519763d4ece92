use std::{collections::HashMap, sync::Arc};

use log::warn;

use super::{
    error::{OrchestrationError, Result},
    spec::{ServiceRecord, ServiceRole, ServiceSpecification},
};

/// Validated specifications keyed by role, at most one per role.
///
/// Immutable once built. When the input names a role twice the later entry
/// replaces the earlier one (logged, not an error).
#[derive(Debug, Clone, Default)]
pub struct SpecificationCatalog {
    specs: HashMap<ServiceRole, Arc<ServiceSpecification>>,
}

impl SpecificationCatalog {
    /// Validates every record in order; the first invalid one aborts with its index.
    pub fn new(records: impl IntoIterator<Item = ServiceRecord>) -> Result<Self> {
        let specs = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                record
                    .validate()
                    .map_err(|source| OrchestrationError::InvalidSpecification { index, source })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_specifications(specs))
    }

    pub fn from_specifications(specs: impl IntoIterator<Item = ServiceSpecification>) -> Self {
        let mut catalog = Self::default();
        for spec in specs {
            let role = spec.role();
            if let Some(previous) = catalog.specs.insert(role, Arc::new(spec)) {
                warn!(
                    "Duplicate specification for {}, image {} replaced by a later entry",
                    role,
                    previous.image()
                );
            }
        }
        catalog
    }

    pub fn get(&self, role: ServiceRole) -> Option<Arc<ServiceSpecification>> {
        self.specs.get(&role).cloned()
    }

    pub fn contains(&self, role: ServiceRole) -> bool {
        self.specs.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Roles in a stable order.
    pub fn roles(&self) -> Vec<ServiceRole> {
        let mut roles: Vec<ServiceRole> = self.specs.keys().copied().collect();
        roles.sort();
        roles
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServiceRole, &Arc<ServiceSpecification>)> {
        self.specs.iter().map(|(role, spec)| (*role, spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::SpecError;

    #[test]
    fn builds_one_entry_per_role() {
        let catalog = SpecificationCatalog::new(vec![
            ServiceRecord::new("database", "postgres:latest"),
            ServiceRecord {
                ports: vec!["8080:8080".to_string()],
                ..ServiceRecord::new("load_balancer", "haproxy:latest")
            },
        ])
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.roles(), vec![ServiceRole::Database, ServiceRole::LoadBalancer]);
        assert_eq!(catalog.get(ServiceRole::Database).unwrap().image(), "postgres:latest");
        assert!(catalog.get(ServiceRole::Cache).is_none());
    }

    #[test]
    fn duplicate_roles_keep_the_last_entry() {
        let catalog = SpecificationCatalog::new(vec![
            ServiceRecord::new("DB", "a"),
            ServiceRecord::new("database", "b"),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(ServiceRole::Database).unwrap().image(), "b");
    }

    #[test]
    fn size_equals_distinct_roles() {
        let records = vec![
            ServiceRecord::new("cache", "redis:7"),
            ServiceRecord::new("db", "postgres:16"),
            ServiceRecord::new("cache", "redis:latest"),
            ServiceRecord::new("other", "alpine:latest"),
            ServiceRecord::new("db", "mysql:latest"),
        ];
        let catalog = SpecificationCatalog::new(records).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(ServiceRole::Cache).unwrap().image(), "redis:latest");
        assert_eq!(catalog.get(ServiceRole::Database).unwrap().image(), "mysql:latest");
    }

    #[test]
    fn first_invalid_record_aborts_with_its_index() {
        let err = SpecificationCatalog::new(vec![
            ServiceRecord::new("cache", "redis:latest"),
            ServiceRecord {
                ports: vec!["abc:80".to_string()],
                ..ServiceRecord::new("lb", "haproxy:latest")
            },
            ServiceRecord::new("db", ""),
        ])
        .unwrap_err();

        match err {
            OrchestrationError::InvalidSpecification { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(source, SpecError::InvalidPort { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn accessors_share_the_stored_specification() {
        let catalog = SpecificationCatalog::new(vec![ServiceRecord::new("cache", "redis:latest")]).unwrap();
        let first = catalog.get(ServiceRole::Cache).unwrap();
        let second = catalog.get(ServiceRole::Cache).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
