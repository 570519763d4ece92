use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use super::{
    catalog::SpecificationCatalog,
    entity::{ContainerEntity, EntitySummary},
    error::{OrchestrationError, Result},
    spec::ServiceRole,
};

/// Container entities keyed by role, built 1:1 from a catalog.
///
/// Membership sits behind one reader/writer lock owned by this value. Public
/// methods take the lock themselves and never call each other while holding
/// it, so none of them may be invoked from inside another's critical section.
/// Accessors hand out `Arc` handles and snapshots, never the inner map.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    entities: RwLock<HashMap<ServiceRole, Arc<ContainerEntity>>>,
}

impl ContainerRegistry {
    /// All or nothing: the first entity that fails to build aborts the whole registry.
    pub fn new(catalog: &SpecificationCatalog) -> Result<Self> {
        let entities = catalog
            .iter()
            .map(|(role, spec)| {
                ContainerEntity::new(spec.clone()).map(|entity| (role, Arc::new(entity)))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        if entities.len() != catalog.len() {
            return Err(OrchestrationError::RegistryMismatch {
                catalog: catalog.len(),
                registry: entities.len(),
            });
        }

        Ok(Self {
            entities: RwLock::new(entities),
        })
    }

    /// Inserts or replaces the entity for `role`, returning the replaced one.
    pub async fn add(
        &self,
        role: ServiceRole,
        entity: ContainerEntity,
    ) -> Result<Option<Arc<ContainerEntity>>> {
        if entity.role() != role {
            return Err(OrchestrationError::EntityConstruction {
                role,
                reason: format!("entity was built for {}", entity.role()),
            });
        }
        Ok(self.entities.write().await.insert(role, Arc::new(entity)))
    }

    pub async fn remove(&self, role: ServiceRole) -> Result<Arc<ContainerEntity>> {
        self.entities
            .write()
            .await
            .remove(&role)
            .ok_or(OrchestrationError::NotFound(role))
    }

    pub async fn get(&self, role: ServiceRole) -> Result<Arc<ContainerEntity>> {
        self.entities
            .read()
            .await
            .get(&role)
            .cloned()
            .ok_or(OrchestrationError::NotFound(role))
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Handles to every entity, ordered by role. The lock is released on return.
    pub async fn entities(&self) -> Vec<Arc<ContainerEntity>> {
        let mut entities: Vec<Arc<ContainerEntity>> =
            self.entities.read().await.values().cloned().collect();
        entities.sort_by_key(|entity| entity.role());
        entities
    }

    pub async fn summaries(&self) -> Vec<EntitySummary> {
        let mut summaries = Vec::new();
        for entity in self.entities().await {
            summaries.push(entity.summary().await);
        }
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{entity::EntityStatus, spec::ServiceRecord};

    fn catalog(records: Vec<ServiceRecord>) -> SpecificationCatalog {
        SpecificationCatalog::new(records).unwrap()
    }

    #[tokio::test]
    async fn registry_mirrors_the_catalog() {
        let catalog = catalog(vec![
            ServiceRecord::new("database", "postgres:latest"),
            ServiceRecord {
                ports: vec!["8080:8080".to_string()],
                ..ServiceRecord::new("load_balancer", "haproxy:latest")
            },
        ]);
        let registry = ContainerRegistry::new(&catalog).unwrap();

        assert_eq!(registry.len().await, catalog.len());
        for summary in registry.summaries().await {
            assert_eq!(summary.status, EntityStatus::Defined);
            assert_eq!(summary.id, None);
        }
        let lb = registry.get(ServiceRole::LoadBalancer).await.unwrap();
        assert!(Arc::ptr_eq(
            lb.specification(),
            &catalog.get(ServiceRole::LoadBalancer).unwrap()
        ));
    }

    #[tokio::test]
    async fn one_bad_entity_fails_the_whole_build() {
        let catalog = catalog(vec![
            ServiceRecord::new("cache", "redis:latest"),
            ServiceRecord {
                container_name: Some("-leading-dash".to_string()),
                ..ServiceRecord::new("db", "postgres:latest")
            },
        ]);
        let err = ContainerRegistry::new(&catalog).unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::EntityConstruction { role: ServiceRole::Database, .. }
        ));
    }

    #[tokio::test]
    async fn add_remove_and_get() {
        let registry = ContainerRegistry::new(&catalog(vec![ServiceRecord::new("cache", "redis:latest")])).unwrap();

        assert!(matches!(
            registry.get(ServiceRole::Database).await,
            Err(OrchestrationError::NotFound(ServiceRole::Database))
        ));

        let spec = Arc::new(ServiceRecord::new("db", "postgres:latest").validate().unwrap());
        let replaced = registry
            .add(ServiceRole::Database, ContainerEntity::new(spec.clone()).unwrap())
            .await
            .unwrap();
        assert!(replaced.is_none());
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.get(ServiceRole::Database).await.unwrap().image(), "postgres:latest");

        let removed = registry.remove(ServiceRole::Database).await.unwrap();
        assert_eq!(removed.role(), ServiceRole::Database);
        assert!(matches!(
            registry.remove(ServiceRole::Database).await,
            Err(OrchestrationError::NotFound(ServiceRole::Database))
        ));

        let err = registry
            .add(ServiceRole::Cache, ContainerEntity::new(spec).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::EntityConstruction { .. }));
    }

    #[tokio::test]
    async fn snapshots_do_not_change_membership() {
        let registry = ContainerRegistry::new(&catalog(vec![
            ServiceRecord::new("cache", "redis:latest"),
            ServiceRecord::new("db", "postgres:latest"),
        ]))
        .unwrap();

        let mut handles = registry.entities().await;
        assert_eq!(handles[0].role(), ServiceRole::Database);
        handles.clear();
        assert_eq!(registry.len().await, 2);
    }
}
