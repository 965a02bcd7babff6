// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use std::sync::Arc;

use edgefleet_core::application::{MicroserviceService, StandardMicroserviceService};
use edgefleet_core::domain::collaborators::{CatalogService, FleetRegistry};
use edgefleet_core::domain::controller_config::{MicroserviceSettings, ProxySettings};
use edgefleet_core::domain::errors::ControllerError;
use edgefleet_core::domain::fleet::{
    CatalogCategory, CatalogItem, Flow, Host, HostId, Registry, Router, ScopeMode, User,
};
use edgefleet_core::domain::microservice::{
    Image, Microservice, MicroserviceDefinition, MicroserviceId, MicroserviceView,
};
use edgefleet_core::domain::repository::TransactionCoordinator;
use edgefleet_core::infrastructure::{
    InMemoryCatalog, InMemoryFleet, InMemoryFlows, InMemoryStore, StandardInputValidator,
};

pub const SYSTEM_HOST: &str = "system-host";
pub const EDGE_HOST: &str = "edge-1";
pub const OTHER_EDGE_HOST: &str = "edge-2";
pub const OWNER: i64 = 7;
pub const FLOW_ID: i64 = 1;
pub const USER_ITEM_ID: i64 = 10;
pub const SYSTEM_ITEM_ID: i64 = 11;
pub const PROXY_ITEM_ID: i64 = 100;
pub const ROUTER_HOST: &str = "1.2.3.4";
pub const ROUTER_PORT: u16 = 5672;

pub fn host(uuid: &str, user_id: i64, is_system: bool) -> Host {
    Host {
        uuid: HostId::new(uuid),
        name: uuid.to_string(),
        is_system,
        is_default: false,
        user_id,
    }
}

pub fn image(name: &str) -> Image {
    Image {
        container_image: name.to_string(),
        fog_type_id: 1,
    }
}

pub fn catalog_item(id: i64, category: CatalogCategory, image_name: &str) -> CatalogItem {
    CatalogItem {
        id,
        name: format!("item-{}", id),
        category,
        images: vec![image(image_name)],
        registry_id: Some(1),
        user_id: None,
    }
}

pub struct Fixture {
    pub store: InMemoryStore,
    pub fleet: InMemoryFleet,
    pub catalog: InMemoryCatalog,
    pub flows: InMemoryFlows,
    pub service: StandardMicroserviceService,
    pub user: User,
}

impl Fixture {
    /// Edge hosts owned by the caller, a system host running the default router
    pub async fn new() -> Self {
        let fleet = InMemoryFleet::new()
            .with_host(host(SYSTEM_HOST, 1, true))
            .with_host(host(EDGE_HOST, OWNER, false))
            .with_host(host(OTHER_EDGE_HOST, OWNER, false));
        Self::with_fleet(fleet).await
    }

    pub async fn without_system_host() -> Self {
        let fleet = InMemoryFleet::new()
            .with_host(host(EDGE_HOST, OWNER, false))
            .with_host(host(OTHER_EDGE_HOST, OWNER, false));
        Self::with_fleet(fleet).await
    }

    /// Caller also owns the system host, so microservices may be placed on it
    pub async fn with_owned_system_host() -> Self {
        let fleet = InMemoryFleet::new()
            .with_host(host(SYSTEM_HOST, OWNER, true))
            .with_host(host(EDGE_HOST, OWNER, false));
        Self::with_fleet(fleet).await
    }

    pub async fn with_fleet(fleet: InMemoryFleet) -> Self {
        let catalog = InMemoryCatalog::new()
            .with_item(catalog_item(USER_ITEM_ID, CatalogCategory::User, "nginx:1.27"))
            .with_item(catalog_item(SYSTEM_ITEM_ID, CatalogCategory::System, "edgefleet/router"))
            .with_proxy_item(catalog_item(PROXY_ITEM_ID, CatalogCategory::System, "edgefleet/proxy"));
        Self::with_collaborators(fleet.clone(), catalog.clone(), Arc::new(fleet), Arc::new(catalog)).await
    }

    /// Seeds the usual records but lets a test swap in its own collaborators
    pub async fn with_collaborators(
        fleet: InMemoryFleet,
        catalog: InMemoryCatalog,
        fleet_registry: Arc<dyn FleetRegistry>,
        catalog_service: Arc<dyn CatalogService>,
    ) -> Self {
        let store = InMemoryStore::new();
        store
            .add_registry(Registry {
                id: 1,
                url: "registry.hub.docker.com".to_string(),
                is_public: true,
            })
            .await;
        store
            .add_router(Router {
                id: 1,
                host: ROUTER_HOST.to_string(),
                messaging_port: ROUTER_PORT,
                iofog_uuid: Some(HostId::new(SYSTEM_HOST)),
                is_default: true,
            })
            .await;

        let flows = InMemoryFlows::new().with_flow(Flow {
            id: FLOW_ID,
            name: "pipeline".to_string(),
            user_id: OWNER,
            is_activated: true,
        });

        let service = StandardMicroserviceService::new(
            catalog_service,
            fleet_registry,
            Arc::new(flows.clone()),
            Arc::new(StandardInputValidator::new()),
            MicroserviceSettings::default(),
            ProxySettings::default(),
        );

        Self {
            store,
            fleet,
            catalog,
            flows,
            service,
            user: User::new(OWNER),
        }
    }

    pub fn definition(&self, name: &str, host: &str) -> MicroserviceDefinition {
        MicroserviceDefinition {
            name: name.to_string(),
            config: None,
            catalog_item_id: Some(USER_ITEM_ID),
            images: Vec::new(),
            flow_id: FLOW_ID,
            iofog_uuid: HostId::new(host),
            root_host_access: false,
            log_limit: None,
            registry_id: None,
            volume_mappings: Vec::new(),
            ports: Vec::new(),
            routes: Vec::new(),
            env: Vec::new(),
            cmd: Vec::new(),
        }
    }

    /// Create in its own unit of work; commits only on success
    pub async fn create(&self, definition: MicroserviceDefinition) -> Result<MicroserviceView, ControllerError> {
        let mut tx = self.store.begin().await?;
        let view = self
            .service
            .create_microservice(definition, &self.user, ScopeMode::OwnerScoped, tx.as_mut())
            .await?;
        tx.commit().await?;
        Ok(view)
    }

    pub async fn delete(&self, uuid: &MicroserviceId) -> Result<(), ControllerError> {
        let mut tx = self.store.begin().await?;
        self.service
            .delete_microservice(uuid, &self.user, ScopeMode::OwnerScoped, tx.as_mut())
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn find(&self, uuid: &MicroserviceId) -> Option<Microservice> {
        self.store
            .microservices()
            .await
            .into_iter()
            .find(|ms| &ms.uuid == uuid)
    }

    /// Microservices created from the proxy catalog item
    pub async fn proxies(&self) -> Vec<Microservice> {
        self.store
            .microservices()
            .await
            .into_iter()
            .filter(|ms| ms.catalog_item_id == Some(PROXY_ITEM_ID))
            .collect()
    }
}
