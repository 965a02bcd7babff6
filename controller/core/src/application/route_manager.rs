// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Route Manager
//!
//! Maintains directed routes between microservices. Every change notifies
//! both endpoint hosts with a full resync, since a topology edge spanning two
//! hosts appeared or disappeared.

use tracing::{debug, info};

use crate::application::change_notifier::ChangeNotifier;
use crate::domain::change_tracking::ChangeCategory;
use crate::domain::errors::ControllerError;
use crate::domain::fleet::HostId;
use crate::domain::microservice::{Microservice, MicroserviceId};
use crate::domain::repository::UnitOfWork;
use crate::domain::route::{NewRoute, Route};

#[derive(Debug, Clone, Default)]
pub struct RouteManager {
    notifier: ChangeNotifier,
}

impl RouteManager {
    pub fn new(notifier: ChangeNotifier) -> Self {
        Self { notifier }
    }

    pub async fn create(
        &self,
        tx: &mut dyn UnitOfWork,
        source: &Microservice,
        dest: &Microservice,
    ) -> Result<Route, ControllerError> {
        if tx.routes().find(&source.uuid, &dest.uuid).await?.is_some() {
            return Err(ControllerError::Conflict(format!(
                "route {} -> {} already exists",
                source.uuid, dest.uuid
            )));
        }

        let route = tx.routes().create(NewRoute::between(source, dest)).await?;
        debug!(
            "Created route {} -> {} (network: {})",
            route.source_microservice_uuid, route.dest_microservice_uuid, route.is_network_connection
        );
        self.notify_endpoints(tx, &route).await?;
        Ok(route)
    }

    pub async fn delete(&self, tx: &mut dyn UnitOfWork, route: &Route) -> Result<(), ControllerError> {
        tx.routes().delete(route.id).await?;
        debug!(
            "Deleted route {} -> {}",
            route.source_microservice_uuid, route.dest_microservice_uuid
        );
        self.notify_endpoints(tx, route).await
    }

    /// Delete every route the microservice takes part in; returns the count
    pub async fn delete_all_for(
        &self,
        tx: &mut dyn UnitOfWork,
        uuid: &MicroserviceId,
    ) -> Result<usize, ControllerError> {
        let routes = tx.routes().list_involving(uuid).await?;
        for route in &routes {
            self.delete(tx, route).await?;
        }
        Ok(routes.len())
    }

    /// Re-point routes of a microservice that moved to another host
    ///
    /// `moved` carries the new placement. Old and new host pairs are both
    /// notified.
    pub async fn reconcile_on_move(
        &self,
        tx: &mut dyn UnitOfWork,
        moved: &Microservice,
    ) -> Result<(), ControllerError> {
        let routes = tx.routes().list_involving(&moved.uuid).await?;
        info!(
            "Reconciling {} route(s) of microservice {} onto host {}",
            routes.len(),
            moved.uuid,
            moved.iofog_uuid
        );

        for route in routes {
            self.delete(tx, &route).await?;

            let host_of = |uuid: &MicroserviceId, current: &HostId| -> HostId {
                if uuid == &moved.uuid {
                    moved.iofog_uuid.clone()
                } else {
                    current.clone()
                }
            };
            let replacement = NewRoute::from_hosts(
                route.source_microservice_uuid.clone(),
                host_of(&route.source_microservice_uuid, &route.source_iofog_uuid),
                route.dest_microservice_uuid.clone(),
                host_of(&route.dest_microservice_uuid, &route.dest_iofog_uuid),
            );
            let recreated = tx.routes().create(replacement).await?;
            self.notify_endpoints(tx, &recreated).await?;
        }
        Ok(())
    }

    async fn notify_endpoints(&self, tx: &mut dyn UnitOfWork, route: &Route) -> Result<(), ControllerError> {
        for host in route.hosts() {
            self.notifier
                .update(tx, host, ChangeCategory::MicroserviceFull)
                .await?;
        }
        Ok(())
    }
}
