// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the unit of work defined in the domain
//! layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve controller records
//! - **Pattern:** Repository (DDD), Unit of Work
//!
//! # Available Implementations
//!
//! - **PostgresStore** - `sqlx` transaction per unit of work
//! - **InMemoryStore** - snapshot per unit of work, for tests and offline planning
//!
//! # Design Principles
//!
//! 1. **Atomicity**: a unit of work dropped without commit leaves no trace
//! 2. **Uniqueness in storage**: duplicate rows surface as `RepositoryError::Conflict`
//! 3. **Cascades in storage**: deleting a microservice removes its owned rows

pub mod postgres;

pub use postgres::{PostgresStore, PostgresUnitOfWork};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::change_tracking::{ChangeCategory, ChangeTracking};
use crate::domain::fleet::{HostId, Registry, Router};
use crate::domain::microservice::{
    EnvVar, Image, Microservice, MicroserviceFilter, MicroserviceId, MicroserviceStatus,
    VolumeMapping, VolumeMappingRequest,
};
use crate::domain::port_mapping::{
    NewPortMapping, NewPublicPort, PortMapping, PortMappingId, PublicPort, PublicPortId,
};
use crate::domain::repository::{
    ArgRepository, ChangeTrackingRepository, EnvRepository, ImageRepository,
    MicroserviceRepository, MicroserviceStatusRepository, PortMappingRepository,
    PublicPortRepository, RegistryRepository, RepositoryError, RouteRepository,
    RouterRepository, TransactionCoordinator, UnitOfWork, VolumeMappingRepository,
};
use crate::domain::route::{NewRoute, Route, RouteId};

/// Every table of the in-memory store
#[derive(Debug, Clone, Default)]
struct StoreState {
    microservices: Vec<Microservice>,
    port_mappings: BTreeMap<i64, PortMapping>,
    public_ports: BTreeMap<i64, PublicPort>,
    volume_mappings: BTreeMap<i64, VolumeMapping>,
    routes: BTreeMap<i64, Route>,
    statuses: HashMap<MicroserviceId, MicroserviceStatus>,
    env: HashMap<MicroserviceId, Vec<EnvVar>>,
    args: HashMap<MicroserviceId, Vec<String>>,
    images: HashMap<MicroserviceId, Vec<Image>>,
    registries: BTreeMap<i64, Registry>,
    routers: Vec<Router>,
    change_tracking: HashMap<HostId, ChangeTracking>,
    /// Every mark in order, including repeats
    change_log: Vec<(HostId, ChangeCategory)>,
    last_id: i64,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// In-memory transaction coordinator
///
/// One unit of work at a time holds the store lock. Writes go to a private
/// copy that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_registry(&self, registry: Registry) {
        self.state.lock().await.registries.insert(registry.id, registry);
    }

    pub async fn add_router(&self, router: Router) {
        self.state.lock().await.routers.push(router);
    }

    pub async fn microservices(&self) -> Vec<Microservice> {
        self.state.lock().await.microservices.clone()
    }

    pub async fn port_mappings(&self) -> Vec<PortMapping> {
        self.state.lock().await.port_mappings.values().cloned().collect()
    }

    pub async fn public_ports(&self) -> Vec<PublicPort> {
        self.state.lock().await.public_ports.values().cloned().collect()
    }

    pub async fn routes(&self) -> Vec<Route> {
        self.state.lock().await.routes.values().cloned().collect()
    }

    pub async fn volume_mappings(&self) -> Vec<VolumeMapping> {
        self.state.lock().await.volume_mappings.values().cloned().collect()
    }

    pub async fn status(&self, uuid: &MicroserviceId) -> Option<MicroserviceStatus> {
        self.state.lock().await.statuses.get(uuid).cloned()
    }

    pub async fn change_tracking(&self, host: &HostId) -> Option<ChangeTracking> {
        self.state.lock().await.change_tracking.get(host).cloned()
    }

    /// Pending flags of every host
    pub async fn all_change_tracking(&self) -> Vec<ChangeTracking> {
        let state = self.state.lock().await;
        let mut all: Vec<_> = state.change_tracking.values().cloned().collect();
        all.sort_by(|a, b| a.iofog_uuid.cmp(&b.iofog_uuid));
        all
    }

    pub async fn change_log(&self) -> Vec<(HostId, ChangeCategory)> {
        self.state.lock().await.change_log.clone()
    }
}

#[async_trait]
impl TransactionCoordinator for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }
}

pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn microservices(&mut self) -> &mut dyn MicroserviceRepository {
        self
    }
    fn port_mappings(&mut self) -> &mut dyn PortMappingRepository {
        self
    }
    fn public_ports(&mut self) -> &mut dyn PublicPortRepository {
        self
    }
    fn volume_mappings(&mut self) -> &mut dyn VolumeMappingRepository {
        self
    }
    fn routes(&mut self) -> &mut dyn RouteRepository {
        self
    }
    fn statuses(&mut self) -> &mut dyn MicroserviceStatusRepository {
        self
    }
    fn env(&mut self) -> &mut dyn EnvRepository {
        self
    }
    fn args(&mut self) -> &mut dyn ArgRepository {
        self
    }
    fn images(&mut self) -> &mut dyn ImageRepository {
        self
    }
    fn registries(&mut self) -> &mut dyn RegistryRepository {
        self
    }
    fn routers(&mut self) -> &mut dyn RouterRepository {
        self
    }
    fn change_tracking(&mut self) -> &mut dyn ChangeTrackingRepository {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl MicroserviceRepository for InMemoryUnitOfWork {
    async fn create(&mut self, microservice: &Microservice) -> Result<(), RepositoryError> {
        if self.working.microservices.iter().any(|m| m.uuid == microservice.uuid) {
            return Err(RepositoryError::Conflict(format!(
                "microservice {} already exists",
                microservice.uuid
            )));
        }
        self.working.microservices.push(microservice.clone());
        Ok(())
    }

    async fn find(&mut self, filter: &MicroserviceFilter) -> Result<Option<Microservice>, RepositoryError> {
        Ok(self
            .working
            .microservices
            .iter()
            .find(|m| filter.matches(m))
            .cloned())
    }

    async fn list(&mut self, filter: &MicroserviceFilter) -> Result<Vec<Microservice>, RepositoryError> {
        Ok(self
            .working
            .microservices
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    async fn update(&mut self, microservice: &Microservice) -> Result<(), RepositoryError> {
        let existing = self
            .working
            .microservices
            .iter_mut()
            .find(|m| m.uuid == microservice.uuid)
            .ok_or_else(|| RepositoryError::NotFound(format!("microservice {}", microservice.uuid)))?;
        *existing = microservice.clone();
        Ok(())
    }

    async fn delete(&mut self, uuid: &MicroserviceId) -> Result<(), RepositoryError> {
        let state = &mut self.working;
        let before = state.microservices.len();
        state.microservices.retain(|m| &m.uuid != uuid);
        if state.microservices.len() == before {
            return Err(RepositoryError::NotFound(format!("microservice {}", uuid)));
        }
        state.env.remove(uuid);
        state.args.remove(uuid);
        state.images.remove(uuid);
        state.statuses.remove(uuid);
        state.volume_mappings.retain(|_, v| &v.microservice_uuid != uuid);
        Ok(())
    }
}

#[async_trait]
impl PortMappingRepository for InMemoryUnitOfWork {
    async fn create(&mut self, mapping: NewPortMapping) -> Result<PortMapping, RepositoryError> {
        if self.working.port_mappings.values().any(|m| {
            m.microservice_uuid == mapping.microservice_uuid
                && m.collides_with(mapping.port_internal, mapping.port_external)
        }) {
            return Err(RepositoryError::Conflict(format!(
                "port mapping {}:{} of microservice {}",
                mapping.port_internal, mapping.port_external, mapping.microservice_uuid
            )));
        }
        let id = self.working.next_id();
        let created = PortMapping {
            id: PortMappingId(id),
            microservice_uuid: mapping.microservice_uuid,
            port_internal: mapping.port_internal,
            port_external: mapping.port_external,
            is_public: mapping.is_public,
            user_id: mapping.user_id,
        };
        self.working.port_mappings.insert(id, created.clone());
        Ok(created)
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<PortMapping>, RepositoryError> {
        Ok(self
            .working
            .port_mappings
            .values()
            .filter(|m| &m.microservice_uuid == uuid)
            .cloned()
            .collect())
    }

    async fn delete(&mut self, id: PortMappingId) -> Result<(), RepositoryError> {
        self.working
            .port_mappings
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("port mapping {}", id)))
    }
}

#[async_trait]
impl PublicPortRepository for InMemoryUnitOfWork {
    async fn create(&mut self, port: NewPublicPort) -> Result<PublicPort, RepositoryError> {
        if port.host_id.is_some()
            && self
                .working
                .public_ports
                .values()
                .any(|p| p.host_id == port.host_id && p.public_port == port.public_port)
        {
            return Err(RepositoryError::Conflict(format!(
                "public port {} already published",
                port.public_port
            )));
        }
        let id = self.working.next_id();
        let created = PublicPort {
            id: PublicPortId(id),
            port_id: port.port_id,
            host_id: port.host_id,
            local_proxy_id: port.local_proxy_id,
            remote_proxy_id: port.remote_proxy_id,
            public_port: port.public_port,
            queue_name: port.queue_name,
            is_tcp: port.is_tcp,
        };
        self.working.public_ports.insert(id, created.clone());
        Ok(created)
    }

    async fn find_by_port(&mut self, port_id: PortMappingId) -> Result<Option<PublicPort>, RepositoryError> {
        Ok(self
            .working
            .public_ports
            .values()
            .find(|p| p.port_id == port_id)
            .cloned())
    }

    async fn find_published(
        &mut self,
        host_id: Option<&HostId>,
        public_port: u16,
    ) -> Result<Option<PublicPort>, RepositoryError> {
        Ok(self
            .working
            .public_ports
            .values()
            .find(|p| p.host_id.as_ref() == host_id && p.public_port == public_port)
            .cloned())
    }

    async fn set_remote_proxy(
        &mut self,
        id: PublicPortId,
        remote_proxy_id: Option<&MicroserviceId>,
    ) -> Result<(), RepositoryError> {
        let port = self
            .working
            .public_ports
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("public port {}", id.0)))?;
        port.remote_proxy_id = remote_proxy_id.cloned();
        Ok(())
    }

    async fn delete(&mut self, id: PublicPortId) -> Result<(), RepositoryError> {
        self.working
            .public_ports
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("public port {}", id.0)))
    }
}

#[async_trait]
impl VolumeMappingRepository for InMemoryUnitOfWork {
    async fn create_bulk(
        &mut self,
        uuid: &MicroserviceId,
        volumes: &[VolumeMappingRequest],
    ) -> Result<Vec<VolumeMapping>, RepositoryError> {
        let mut created = Vec::with_capacity(volumes.len());
        for volume in volumes {
            let id = self.working.next_id();
            let mapping = VolumeMapping {
                id,
                microservice_uuid: uuid.clone(),
                host_destination: volume.host_destination.clone(),
                container_destination: volume.container_destination.clone(),
                access_mode: volume.access_mode,
            };
            self.working.volume_mappings.insert(id, mapping.clone());
            created.push(mapping);
        }
        Ok(created)
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<VolumeMapping>, RepositoryError> {
        Ok(self
            .working
            .volume_mappings
            .values()
            .filter(|v| &v.microservice_uuid == uuid)
            .cloned()
            .collect())
    }

    async fn delete_for(&mut self, uuid: &MicroserviceId) -> Result<(), RepositoryError> {
        self.working
            .volume_mappings
            .retain(|_, v| &v.microservice_uuid != uuid);
        Ok(())
    }
}

#[async_trait]
impl RouteRepository for InMemoryUnitOfWork {
    async fn create(&mut self, route: NewRoute) -> Result<Route, RepositoryError> {
        if self.working.routes.values().any(|r| {
            r.source_microservice_uuid == route.source_microservice_uuid
                && r.dest_microservice_uuid == route.dest_microservice_uuid
        }) {
            return Err(RepositoryError::Conflict(format!(
                "route {} -> {}",
                route.source_microservice_uuid, route.dest_microservice_uuid
            )));
        }
        let id = self.working.next_id();
        let created = Route {
            id: RouteId(id),
            source_microservice_uuid: route.source_microservice_uuid,
            dest_microservice_uuid: route.dest_microservice_uuid,
            source_iofog_uuid: route.source_iofog_uuid,
            dest_iofog_uuid: route.dest_iofog_uuid,
            is_network_connection: route.is_network_connection,
        };
        self.working.routes.insert(id, created.clone());
        Ok(created)
    }

    async fn find(
        &mut self,
        source: &MicroserviceId,
        dest: &MicroserviceId,
    ) -> Result<Option<Route>, RepositoryError> {
        Ok(self
            .working
            .routes
            .values()
            .find(|r| &r.source_microservice_uuid == source && &r.dest_microservice_uuid == dest)
            .cloned())
    }

    async fn list_involving(&mut self, uuid: &MicroserviceId) -> Result<Vec<Route>, RepositoryError> {
        Ok(self
            .working
            .routes
            .values()
            .filter(|r| r.involves(uuid))
            .cloned()
            .collect())
    }

    async fn delete(&mut self, id: RouteId) -> Result<(), RepositoryError> {
        self.working
            .routes
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("route {}", id.0)))
    }
}

#[async_trait]
impl MicroserviceStatusRepository for InMemoryUnitOfWork {
    async fn create(&mut self, status: &MicroserviceStatus) -> Result<(), RepositoryError> {
        self.working
            .statuses
            .insert(status.microservice_uuid.clone(), status.clone());
        Ok(())
    }

    async fn find(&mut self, uuid: &MicroserviceId) -> Result<Option<MicroserviceStatus>, RepositoryError> {
        Ok(self.working.statuses.get(uuid).cloned())
    }
}

#[async_trait]
impl EnvRepository for InMemoryUnitOfWork {
    async fn replace(&mut self, uuid: &MicroserviceId, env: &[EnvVar]) -> Result<(), RepositoryError> {
        self.working.env.insert(uuid.clone(), env.to_vec());
        Ok(())
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<EnvVar>, RepositoryError> {
        Ok(self.working.env.get(uuid).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ArgRepository for InMemoryUnitOfWork {
    async fn replace(&mut self, uuid: &MicroserviceId, args: &[String]) -> Result<(), RepositoryError> {
        self.working.args.insert(uuid.clone(), args.to_vec());
        Ok(())
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<String>, RepositoryError> {
        Ok(self.working.args.get(uuid).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ImageRepository for InMemoryUnitOfWork {
    async fn replace(&mut self, uuid: &MicroserviceId, images: &[Image]) -> Result<(), RepositoryError> {
        self.working.images.insert(uuid.clone(), images.to_vec());
        Ok(())
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<Image>, RepositoryError> {
        Ok(self.working.images.get(uuid).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl RegistryRepository for InMemoryUnitOfWork {
    async fn find(&mut self, id: i64) -> Result<Option<Registry>, RepositoryError> {
        Ok(self.working.registries.get(&id).cloned())
    }
}

#[async_trait]
impl RouterRepository for InMemoryUnitOfWork {
    async fn find_for_host(&mut self, host: &HostId) -> Result<Option<Router>, RepositoryError> {
        Ok(self
            .working
            .routers
            .iter()
            .find(|r| r.iofog_uuid.as_ref() == Some(host))
            .cloned())
    }

    async fn find_default(&mut self) -> Result<Option<Router>, RepositoryError> {
        Ok(self.working.routers.iter().find(|r| r.is_default).cloned())
    }
}

#[async_trait]
impl ChangeTrackingRepository for InMemoryUnitOfWork {
    async fn mark(&mut self, host: &HostId, category: ChangeCategory) -> Result<(), RepositoryError> {
        self.working
            .change_tracking
            .entry(host.clone())
            .or_insert_with(|| ChangeTracking::new(host.clone()))
            .mark(category);
        self.working.change_log.push((host.clone(), category));
        Ok(())
    }

    async fn find(&mut self, host: &HostId) -> Result<Option<ChangeTracking>, RepositoryError> {
        Ok(self.working.change_tracking.get(host).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fleet::User;
    use crate::domain::microservice::MicroserviceDefinition;

    fn microservice(uuid: &str) -> Microservice {
        let definition: MicroserviceDefinition = serde_json::from_value(serde_json::json!({
            "name": uuid,
            "flowId": 1,
            "iofogUuid": "h1",
        }))
        .unwrap();
        Microservice::from_definition(MicroserviceId::new(uuid), &definition, &User::new(1), 50, 1)
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = InMemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.microservices().create(&microservice("a")).await.unwrap();
        drop(tx);

        assert!(store.microservices().await.is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.microservices().create(&microservice("a")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.microservices().await.len(), 1);
    }

    #[tokio::test]
    async fn test_uniqueness_enforced() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let ms = microservice("a");
        tx.microservices().create(&ms).await.unwrap();

        let err = tx.microservices().create(&ms).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let new_mapping = |internal, external| NewPortMapping {
            microservice_uuid: ms.uuid.clone(),
            port_internal: internal,
            port_external: external,
            is_public: false,
            user_id: 1,
        };
        tx.port_mappings().create(new_mapping(80, 8080)).await.unwrap();
        let err = tx.port_mappings().create(new_mapping(81, 8080)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_cascades_owned_rows() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let ms = microservice("a");
        tx.microservices().create(&ms).await.unwrap();
        tx.env()
            .replace(&ms.uuid, &[EnvVar { key: "K".to_string(), value: "V".to_string() }])
            .await
            .unwrap();
        tx.statuses().create(&MicroserviceStatus::initial(ms.uuid.clone())).await.unwrap();
        tx.volume_mappings()
            .create_bulk(
                &ms.uuid,
                &[VolumeMappingRequest {
                    host_destination: "/var/data".to_string(),
                    container_destination: "/data".to_string(),
                    access_mode: Default::default(),
                }],
            )
            .await
            .unwrap();

        tx.microservices().delete(&ms.uuid).await.unwrap();
        assert!(tx.env().list_for(&ms.uuid).await.unwrap().is_empty());
        assert!(tx.statuses().find(&ms.uuid).await.unwrap().is_none());
        assert!(tx.volume_mappings().list_for(&ms.uuid).await.unwrap().is_empty());
    }
}
