// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use edgefleet_core::domain::change_tracking::ChangeCategory;
use edgefleet_core::domain::collaborators::CatalogService;
use edgefleet_core::domain::errors::ControllerError;
use edgefleet_core::domain::fleet::{CatalogItem, HostId, ScopeMode, User};
use edgefleet_core::domain::port_mapping::{Exposure, PortMappingRequest, PublicExposure};
use edgefleet_core::domain::repository::UnitOfWork;
use edgefleet_core::infrastructure::InMemoryCatalog;

/// Catalog whose proxy lookup is unavailable
struct UnavailableProxyCatalog {
    inner: InMemoryCatalog,
}

#[async_trait]
impl CatalogService for UnavailableProxyCatalog {
    async fn get_catalog_item(
        &self,
        id: i64,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<CatalogItem, ControllerError> {
        self.inner.get_catalog_item(id, user, scope, tx).await
    }

    async fn get_proxy_catalog_item(&self, _tx: &mut dyn UnitOfWork) -> Result<CatalogItem, ControllerError> {
        Err(ControllerError::Upstream("catalog service unavailable".to_string()))
    }

    async fn find_catalog_item(
        &self,
        id: i64,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Option<CatalogItem>, ControllerError> {
        self.inner.find_catalog_item(id, tx).await
    }
}

fn public_on(internal: u16, external: u16, public_port: u16, host: Option<&str>, is_tcp: bool) -> PortMappingRequest {
    PortMappingRequest {
        internal,
        external,
        exposure: Exposure::Public(PublicExposure {
            public_port,
            host_preference: host.map(HostId::new),
            is_tcp,
        }),
    }
}

fn router_json() -> String {
    format!(r#""networkRouter":{{"host":"{}","port":{}}}"#, ROUTER_HOST, ROUTER_PORT)
}

#[tokio::test]
async fn test_public_port_builds_local_and_remote_proxies() {
    let fixture = Fixture::new().await;
    let mut definition = fixture.definition("web", EDGE_HOST);
    definition.ports = vec![PortMappingRequest::public(1, 1, 1234)];

    let view = fixture.create(definition).await.unwrap();
    let uuid = view.microservice.uuid.as_str().to_string();

    let proxies = fixture.proxies().await;
    assert_eq!(proxies.len(), 2);
    let local = proxies
        .iter()
        .find(|p| p.iofog_uuid == HostId::new(EDGE_HOST))
        .unwrap();
    let remote = proxies
        .iter()
        .find(|p| p.iofog_uuid == HostId::new(SYSTEM_HOST))
        .unwrap();

    assert_eq!(
        local.config,
        format!(r#"{{"mappings":["amqp:{}=>http:1"],{}}}"#, uuid, router_json())
    );
    assert_eq!(
        remote.config,
        format!(r#"{{"mappings":["http:1234=>amqp:{}"],{}}}"#, uuid, router_json())
    );
    assert_eq!(local.flow_id, None);
    assert_eq!(local.name, "Proxy");
    assert!(local.root_host_access);

    let public_ports = fixture.store.public_ports().await;
    assert_eq!(public_ports.len(), 1);
    let public_port = &public_ports[0];
    assert_eq!(public_port.queue_name, uuid);
    assert_eq!(public_port.public_port, 1234);
    assert_eq!(public_port.host_id, Some(HostId::new(SYSTEM_HOST)));
    assert_eq!(public_port.local_proxy_id, local.uuid);
    assert_eq!(public_port.remote_proxy_id.as_ref(), Some(&remote.uuid));

    assert_eq!(view.ports[0].public_port, Some(1234));
    assert_eq!(view.ports[0].protocol.as_deref(), Some("http"));
    assert_eq!(view.ports[0].public_link.as_deref(), Some("http://1.2.3.4:1234"));

    let system = fixture
        .store
        .change_tracking(&HostId::new(SYSTEM_HOST))
        .await
        .unwrap();
    assert!(system.is_pending(ChangeCategory::MicroserviceList));
}

#[tokio::test]
async fn test_without_system_host_only_local_proxy_is_built() {
    let fixture = Fixture::without_system_host().await;
    let mut definition = fixture.definition("web", EDGE_HOST);
    definition.ports = vec![PortMappingRequest::public(1, 1, 1234)];

    let view = fixture.create(definition).await.unwrap();

    let proxies = fixture.proxies().await;
    assert_eq!(proxies.len(), 1);
    assert_eq!(proxies[0].iofog_uuid, HostId::new(EDGE_HOST));

    let public_ports = fixture.store.public_ports().await;
    let public_port = &public_ports[0];
    assert_eq!(public_port.host_id, None);
    assert_eq!(public_port.remote_proxy_id, None);
    assert_eq!(view.ports[0].public_port, Some(1234));
    assert_eq!(view.ports[0].public_link, None);
}

#[tokio::test]
async fn test_tcp_exposure_uses_tcp_endpoints() {
    let fixture = Fixture::new().await;
    let mut definition = fixture.definition("db", EDGE_HOST);
    definition.ports = vec![public_on(5432, 5432, 15432, None, true)];

    let view = fixture.create(definition).await.unwrap();
    let uuid = view.microservice.uuid.as_str().to_string();

    let configs: Vec<String> = fixture.proxies().await.into_iter().map(|p| p.config).collect();
    assert!(configs.contains(&format!(
        r#"{{"mappings":["amqp:{}=>tcp:5432"],{}}}"#,
        uuid,
        router_json()
    )));
    assert!(configs.contains(&format!(
        r#"{{"mappings":["tcp:15432=>amqp:{}"],{}}}"#,
        uuid,
        router_json()
    )));
    assert_eq!(view.ports[0].public_link.as_deref(), Some("tcp://1.2.3.4:15432"));
}

#[tokio::test]
async fn test_host_preference_places_remote_proxy() {
    let fixture = Fixture::new().await;
    let mut definition = fixture.definition("web", EDGE_HOST);
    definition.ports = vec![public_on(80, 8080, 8000, Some(OTHER_EDGE_HOST), false)];

    fixture.create(definition).await.unwrap();

    let hosts: Vec<HostId> = fixture.proxies().await.into_iter().map(|p| p.iofog_uuid).collect();
    assert!(hosts.contains(&HostId::new(EDGE_HOST)));
    assert!(hosts.contains(&HostId::new(OTHER_EDGE_HOST)));
    assert!(!hosts.contains(&HostId::new(SYSTEM_HOST)));
    assert_eq!(
        fixture.store.public_ports().await[0].host_id,
        Some(HostId::new(OTHER_EDGE_HOST))
    );
}

#[tokio::test]
async fn test_unknown_host_preference_is_not_found() {
    let fixture = Fixture::new().await;
    let mut definition = fixture.definition("web", EDGE_HOST);
    definition.ports = vec![public_on(80, 8080, 8000, Some("edge-404"), false)];

    let err = fixture.create(definition).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(fixture.store.microservices().await.is_empty());
}

#[tokio::test]
async fn test_public_port_taken_on_host_conflicts() {
    let fixture = Fixture::new().await;
    let mut first = fixture.definition("a", EDGE_HOST);
    first.ports = vec![PortMappingRequest::public(80, 8080, 1234)];
    fixture.create(first).await.unwrap();

    let mut second = fixture.definition("b", OTHER_EDGE_HOST);
    second.ports = vec![PortMappingRequest::public(80, 8080, 1234)];
    let err = fixture.create(second).await.unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(fixture.proxies().await.len(), 2);
    assert_eq!(fixture.store.public_ports().await.len(), 1);
}

#[tokio::test]
async fn test_proxy_catalog_failure_aborts_create() {
    let fixture = Fixture::new().await;
    let catalog = UnavailableProxyCatalog {
        inner: fixture.catalog.clone(),
    };
    let fixture = Fixture::with_collaborators(
        fixture.fleet.clone(),
        fixture.catalog.clone(),
        Arc::new(fixture.fleet.clone()),
        Arc::new(catalog),
    )
    .await;

    let mut definition = fixture.definition("web", EDGE_HOST);
    definition.ports = vec![PortMappingRequest::public(1, 1, 1234)];
    let err = fixture.create(definition).await.unwrap_err();

    assert!(matches!(err, ControllerError::Upstream(_)));
    assert!(fixture.store.microservices().await.is_empty());
    assert!(fixture.store.port_mappings().await.is_empty());
    assert!(fixture.store.all_change_tracking().await.is_empty());
}

#[tokio::test]
async fn test_delete_withdraws_proxies() {
    let fixture = Fixture::new().await;
    let mut definition = fixture.definition("web", EDGE_HOST);
    definition.ports = vec![PortMappingRequest::public(1, 1, 1234)];
    let view = fixture.create(definition).await.unwrap();

    fixture.delete(&view.microservice.uuid).await.unwrap();

    assert!(fixture.proxies().await.is_empty());
    assert!(fixture.store.public_ports().await.is_empty());
    assert!(fixture.store.port_mappings().await.is_empty());

    let system = fixture
        .store
        .change_tracking(&HostId::new(SYSTEM_HOST))
        .await
        .unwrap();
    assert!(system.is_pending(ChangeCategory::MicroserviceConfig));
}

#[tokio::test]
async fn test_public_port_on_system_host_needs_no_remote_proxy() {
    let fixture = Fixture::with_owned_system_host().await;
    let mut definition = fixture.definition("web", SYSTEM_HOST);
    definition.ports = vec![PortMappingRequest::public(1, 1, 1234)];

    let view = fixture.create(definition).await.unwrap();

    let proxies = fixture.proxies().await;
    assert_eq!(proxies.len(), 1);
    assert_eq!(proxies[0].iofog_uuid, HostId::new(SYSTEM_HOST));
    assert_eq!(
        proxies[0].config,
        format!(
            r#"{{"mappings":["amqp:{}=>http:1"],{}}}"#,
            view.microservice.uuid.as_str(),
            router_json()
        )
    );

    let public_ports = fixture.store.public_ports().await;
    assert_eq!(public_ports.len(), 1);
    assert_eq!(public_ports[0].host_id, Some(HostId::new(SYSTEM_HOST)));
    assert_eq!(public_ports[0].local_proxy_id, proxies[0].uuid);
    assert_eq!(public_ports[0].remote_proxy_id, None);
}
