// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory catalog, fleet and flow registries
//!
//! Stand-ins for the services that own these records. They ignore the unit of
//! work: their data is seeded up front and never written by the core.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::domain::collaborators::{CatalogService, FleetRegistry, FlowRegistry};
use crate::domain::errors::ControllerError;
use crate::domain::fleet::{CatalogItem, Flow, Host, HostFilter, ScopeMode, User};
use crate::domain::repository::UnitOfWork;

// ============================================================================
// Catalog
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    items: Arc<RwLock<Vec<CatalogItem>>>,
    proxy_item_id: Arc<RwLock<Option<i64>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(self, item: CatalogItem) -> Self {
        self.add_item(item);
        self
    }

    /// Registers the item proxy microservices are created from
    pub fn with_proxy_item(self, item: CatalogItem) -> Self {
        *self.proxy_item_id.write() = Some(item.id);
        self.with_item(item)
    }

    pub fn add_item(&self, item: CatalogItem) {
        let mut items = self.items.write();
        items.retain(|existing| existing.id != item.id);
        items.push(item);
    }

    fn lookup(&self, id: i64) -> Option<CatalogItem> {
        self.items.read().iter().find(|item| item.id == id).cloned()
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalog {
    async fn get_catalog_item(
        &self,
        id: i64,
        user: &User,
        scope: ScopeMode,
        _tx: &mut dyn UnitOfWork,
    ) -> Result<CatalogItem, ControllerError> {
        self.lookup(id)
            .filter(|item| scope.permits(user, item.user_id))
            .ok_or_else(|| ControllerError::not_found("catalog item", id))
    }

    async fn get_proxy_catalog_item(&self, _tx: &mut dyn UnitOfWork) -> Result<CatalogItem, ControllerError> {
        let id = *self.proxy_item_id.read();
        id.and_then(|id| self.lookup(id))
            .ok_or_else(|| ControllerError::not_found("catalog item", "proxy"))
    }

    async fn find_catalog_item(
        &self,
        id: i64,
        _tx: &mut dyn UnitOfWork,
    ) -> Result<Option<CatalogItem>, ControllerError> {
        Ok(self.lookup(id))
    }
}

// ============================================================================
// Fleet
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryFleet {
    hosts: Arc<RwLock<Vec<Host>>>,
}

impl InMemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(self, host: Host) -> Self {
        self.add_host(host);
        self
    }

    pub fn add_host(&self, host: Host) {
        let mut hosts = self.hosts.write();
        hosts.retain(|existing| existing.uuid != host.uuid);
        hosts.push(host);
    }

    pub fn remove_host(&self, filter: &HostFilter) {
        self.hosts.write().retain(|host| !filter.matches(host));
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.hosts.read().clone()
    }

    fn lookup(&self, filter: &HostFilter) -> Option<Host> {
        self.hosts.read().iter().find(|host| filter.matches(host)).cloned()
    }
}

#[async_trait]
impl FleetRegistry for InMemoryFleet {
    async fn get_host(
        &self,
        filter: &HostFilter,
        user: &User,
        scope: ScopeMode,
        _tx: &mut dyn UnitOfWork,
    ) -> Result<Host, ControllerError> {
        self.lookup(filter)
            .filter(|host| scope.permits(user, Some(host.user_id)))
            .ok_or_else(|| ControllerError::not_found("host", filter))
    }

    async fn find_host(
        &self,
        filter: &HostFilter,
        _tx: &mut dyn UnitOfWork,
    ) -> Result<Option<Host>, ControllerError> {
        Ok(self.lookup(filter))
    }
}

// ============================================================================
// Flows
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryFlows {
    flows: Arc<RwLock<Vec<Flow>>>,
}

impl InMemoryFlows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flow(self, flow: Flow) -> Self {
        self.add_flow(flow);
        self
    }

    pub fn add_flow(&self, flow: Flow) {
        let mut flows = self.flows.write();
        flows.retain(|existing| existing.id != flow.id);
        flows.push(flow);
    }
}

#[async_trait]
impl FlowRegistry for InMemoryFlows {
    async fn find_flow(&self, id: i64, _tx: &mut dyn UnitOfWork) -> Result<Option<Flow>, ControllerError> {
        Ok(self.flows.read().iter().find(|flow| flow.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fleet::{CatalogCategory, HostId};
    use crate::domain::repository::TransactionCoordinator;
    use crate::infrastructure::repositories::InMemoryStore;

    fn item(id: i64, category: CatalogCategory, user_id: Option<i64>) -> CatalogItem {
        CatalogItem {
            id,
            name: format!("item-{}", id),
            category,
            images: Vec::new(),
            registry_id: None,
            user_id,
        }
    }

    fn host(uuid: &str, user_id: i64, is_system: bool) -> Host {
        Host {
            uuid: HostId::new(uuid),
            name: uuid.to_string(),
            is_system,
            is_default: false,
            user_id,
        }
    }

    #[tokio::test]
    async fn catalog_item_is_scoped_to_owner() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let catalog = InMemoryCatalog::new()
            .with_item(item(1, CatalogCategory::User, Some(7)))
            .with_item(item(2, CatalogCategory::Utilities, None));

        let owner = User::new(7);
        let other = User::new(8);

        assert!(catalog
            .get_catalog_item(1, &owner, ScopeMode::OwnerScoped, tx.as_mut())
            .await
            .is_ok());
        let err = catalog
            .get_catalog_item(1, &other, ScopeMode::OwnerScoped, tx.as_mut())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // Operator access and shared items bypass ownership
        assert!(catalog
            .get_catalog_item(1, &other, ScopeMode::Unscoped, tx.as_mut())
            .await
            .is_ok());
        assert!(catalog
            .get_catalog_item(2, &other, ScopeMode::OwnerScoped, tx.as_mut())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn proxy_item_must_be_registered() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let empty = InMemoryCatalog::new();
        assert!(empty.get_proxy_catalog_item(tx.as_mut()).await.unwrap_err().is_not_found());

        let catalog = InMemoryCatalog::new().with_proxy_item(item(9, CatalogCategory::System, None));
        let proxy = catalog.get_proxy_catalog_item(tx.as_mut()).await.unwrap();
        assert_eq!(proxy.id, 9);
        assert!(proxy.is_system());
    }

    #[tokio::test]
    async fn fleet_resolves_filters() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let fleet = InMemoryFleet::new()
            .with_host(host("edge", 7, false))
            .with_host(host("system", 1, true));

        let system = fleet.find_host(&HostFilter::System, tx.as_mut()).await.unwrap();
        assert_eq!(system.unwrap().uuid, HostId::new("system"));
        assert!(fleet.find_host(&HostFilter::Default, tx.as_mut()).await.unwrap().is_none());

        let err = fleet
            .get_host(
                &HostFilter::ById(HostId::new("edge")),
                &User::new(8),
                ScopeMode::OwnerScoped,
                tx.as_mut(),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        fleet.remove_host(&HostFilter::System);
        assert_eq!(fleet.hosts().len(), 1);
    }

    #[tokio::test]
    async fn flows_lookup_by_id() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let flows = InMemoryFlows::new().with_flow(Flow {
            id: 3,
            name: "pipeline".to_string(),
            user_id: 7,
            is_activated: true,
        });

        assert_eq!(flows.find_flow(3, tx.as_mut()).await.unwrap().unwrap().name, "pipeline");
        assert!(flows.find_flow(4, tx.as_mut()).await.unwrap().is_none());
    }
}
