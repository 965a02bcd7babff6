// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::*;
use edgefleet_core::application::MicroserviceService;
use edgefleet_core::domain::change_tracking::ChangeCategory;
use edgefleet_core::domain::fleet::{HostId, ScopeMode};
use edgefleet_core::domain::microservice::{EnvVar, MicroserviceId, VolumeMappingRequest};
use edgefleet_core::domain::port_mapping::PortMappingRequest;
use edgefleet_core::domain::repository::TransactionCoordinator;

const THIRD_EDGE_HOST: &str = "edge-3";

#[tokio::test]
async fn test_delete_with_two_routes_notifies_every_endpoint() {
    let fixture = Fixture::new().await;
    fixture.fleet.add_host(host(THIRD_EDGE_HOST, OWNER, false));

    let b = fixture
        .create(fixture.definition("b", OTHER_EDGE_HOST))
        .await
        .unwrap();
    let mut a_def = fixture.definition("a", EDGE_HOST);
    a_def.routes = vec![b.microservice.uuid.clone()];
    let a = fixture.create(a_def).await.unwrap();
    let mut c_def = fixture.definition("c", THIRD_EDGE_HOST);
    c_def.routes = vec![a.microservice.uuid.clone()];
    fixture.create(c_def).await.unwrap();
    assert_eq!(fixture.store.routes().await.len(), 2);

    let before = fixture.store.change_log().await.len();
    fixture.delete(&a.microservice.uuid).await.unwrap();

    let mut full: Vec<HostId> = fixture.store.change_log().await[before..]
        .iter()
        .filter(|(_, category)| *category == ChangeCategory::MicroserviceFull)
        .map(|(host, _)| host.clone())
        .collect();
    full.sort();
    assert_eq!(
        full,
        vec![
            HostId::new(EDGE_HOST),
            HostId::new(EDGE_HOST),
            HostId::new(OTHER_EDGE_HOST),
            HostId::new(THIRD_EDGE_HOST),
        ]
    );

    assert!(fixture.store.routes().await.is_empty());
    assert!(fixture.find(&a.microservice.uuid).await.is_none());
    assert!(fixture.find(&b.microservice.uuid).await.is_some());

    let list_events = fixture.store.change_log().await[before..]
        .iter()
        .filter(|(host, category)| {
            *category == ChangeCategory::MicroserviceList && host == &HostId::new(EDGE_HOST)
        })
        .count();
    assert_eq!(list_events, 1);
}

#[tokio::test]
async fn test_delete_cascades_owned_rows() {
    let fixture = Fixture::new().await;
    let mut definition = fixture.definition("web", EDGE_HOST);
    definition.ports = vec![
        PortMappingRequest::private(80, 8080),
        PortMappingRequest::private(443, 8443),
    ];
    definition.env = vec![EnvVar {
        key: "MODE".to_string(),
        value: "edge".to_string(),
    }];
    definition.volume_mappings = vec![VolumeMappingRequest {
        host_destination: "/var/data".to_string(),
        container_destination: "/data".to_string(),
        access_mode: Default::default(),
    }];
    let view = fixture.create(definition).await.unwrap();
    let uuid = view.microservice.uuid.clone();

    fixture.delete(&uuid).await.unwrap();

    assert!(fixture.store.microservices().await.is_empty());
    assert!(fixture.store.port_mappings().await.is_empty());
    assert!(fixture.store.volume_mappings().await.is_empty());
    assert!(fixture.store.status(&uuid).await.is_none());

    let tracking = fixture
        .store
        .change_tracking(&HostId::new(EDGE_HOST))
        .await
        .unwrap();
    assert!(tracking.is_pending(ChangeCategory::MicroserviceCommon));
    assert!(tracking.is_pending(ChangeCategory::MicroserviceList));
}

#[tokio::test]
async fn test_system_microservice_cannot_be_deleted() {
    let fixture = Fixture::new().await;
    let mut definition = fixture.definition("router", EDGE_HOST);
    definition.catalog_item_id = Some(SYSTEM_ITEM_ID);
    let view = fixture.create(definition).await.unwrap();

    let err = fixture.delete(&view.microservice.uuid).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(fixture.find(&view.microservice.uuid).await.is_some());
}

#[tokio::test]
async fn test_delete_unknown_microservice_is_not_found() {
    let fixture = Fixture::new().await;

    let err = fixture
        .delete(&MicroserviceId::new("0".repeat(32)))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_failed_delete_leaves_everything_in_place() {
    let fixture = Fixture::new().await;
    let sink = fixture
        .create(fixture.definition("sink", OTHER_EDGE_HOST))
        .await
        .unwrap();
    let mut definition = fixture.definition("web", EDGE_HOST);
    definition.ports = vec![PortMappingRequest::public(1, 1, 1234)];
    definition.routes = vec![sink.microservice.uuid.clone()];
    let view = fixture.create(definition).await.unwrap();

    // Drop the local proxy behind the controller's back
    let local_proxy = fixture.store.public_ports().await[0].local_proxy_id.clone();
    let mut tx = fixture.store.begin().await.unwrap();
    tx.microservices().delete(&local_proxy).await.unwrap();
    tx.commit().await.unwrap();

    let microservices_before = fixture.store.microservices().await.len();
    let log_before = fixture.store.change_log().await.len();

    let err = fixture.delete(&view.microservice.uuid).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(fixture.find(&view.microservice.uuid).await.is_some());
    assert_eq!(fixture.store.microservices().await.len(), microservices_before);
    assert_eq!(fixture.store.routes().await.len(), 1);
    assert_eq!(fixture.store.port_mappings().await.len(), 1);
    assert_eq!(fixture.store.public_ports().await.len(), 1);
    assert_eq!(fixture.store.change_log().await.len(), log_before);
}

#[tokio::test]
async fn test_route_create_and_delete_through_service() {
    let fixture = Fixture::new().await;
    let a = fixture.create(fixture.definition("a", EDGE_HOST)).await.unwrap();
    let b = fixture
        .create(fixture.definition("b", EDGE_HOST))
        .await
        .unwrap();
    let (a, b) = (a.microservice.uuid, b.microservice.uuid);

    let mut tx = fixture.store.begin().await.unwrap();
    let route = fixture
        .service
        .create_route(&a, &b, &fixture.user, ScopeMode::OwnerScoped, tx.as_mut())
        .await
        .unwrap();
    assert!(!route.is_network_connection);

    let duplicate = fixture
        .service
        .create_route(&a, &b, &fixture.user, ScopeMode::OwnerScoped, tx.as_mut())
        .await
        .unwrap_err();
    assert!(duplicate.is_conflict());

    fixture
        .service
        .delete_route(&a, &b, &fixture.user, ScopeMode::OwnerScoped, tx.as_mut())
        .await
        .unwrap();
    let missing = fixture
        .service
        .delete_route(&a, &b, &fixture.user, ScopeMode::OwnerScoped, tx.as_mut())
        .await
        .unwrap_err();
    assert!(missing.is_not_found());
    tx.commit().await.unwrap();

    assert!(fixture.store.routes().await.is_empty());
}
