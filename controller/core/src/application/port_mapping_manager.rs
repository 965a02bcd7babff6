// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Port Mapping Manager
//!
//! Creates and removes the port mappings of a microservice. Public mappings
//! are handed to the [`PublicExposureManager`] for their proxy pair.

use tracing::{debug, info};

use crate::application::change_notifier::ChangeNotifier;
use crate::application::public_exposure::PublicExposureManager;
use crate::domain::change_tracking::ChangeCategory;
use crate::domain::errors::ControllerError;
use crate::domain::fleet::{HostId, User};
use crate::domain::microservice::Microservice;
use crate::domain::port_mapping::{
    Exposure, NewPortMapping, PortMapping, PortMappingRequest, PortMappingView,
};
use crate::domain::repository::UnitOfWork;

#[derive(Clone)]
pub struct PortMappingManager {
    exposure: PublicExposureManager,
    notifier: ChangeNotifier,
}

impl PortMappingManager {
    pub fn new(exposure: PublicExposureManager, notifier: ChangeNotifier) -> Self {
        Self { exposure, notifier }
    }

    pub async fn create(
        &self,
        tx: &mut dyn UnitOfWork,
        microservice: &Microservice,
        request: &PortMappingRequest,
        user: &User,
    ) -> Result<PortMapping, ControllerError> {
        request.check()?;

        let existing = tx.port_mappings().list_for(&microservice.uuid).await?;
        if existing
            .iter()
            .any(|m| m.collides_with(request.internal, request.external))
        {
            return Err(ControllerError::Conflict(format!(
                "port mapping {}:{} collides with an existing mapping of microservice {}",
                request.internal, request.external, microservice.uuid
            )));
        }

        let mapping = tx
            .port_mappings()
            .create(NewPortMapping {
                microservice_uuid: microservice.uuid.clone(),
                port_internal: request.internal,
                port_external: request.external,
                is_public: request.is_public(),
                user_id: microservice.user_id,
            })
            .await?;
        debug!(
            "Created port mapping {}:{} for microservice {}",
            mapping.port_internal, mapping.port_external, microservice.uuid
        );

        if let Exposure::Public(exposure) = &request.exposure {
            self.exposure
                .expose(tx, microservice, &mapping, exposure, user)
                .await?;
        }

        Ok(mapping)
    }

    pub async fn delete(
        &self,
        tx: &mut dyn UnitOfWork,
        owner: &Microservice,
        mapping: &PortMapping,
    ) -> Result<(), ControllerError> {
        if mapping.is_public {
            self.exposure.withdraw(tx, mapping).await?;
            tx.port_mappings().delete(mapping.id).await?;
        } else {
            tx.port_mappings().delete(mapping.id).await?;

            let mut owner = owner.clone();
            owner.rebuild = true;
            tx.microservices().update(&owner).await?;
            self.notifier
                .update(tx, &owner.iofog_uuid, ChangeCategory::MicroserviceCommon)
                .await?;
        }
        debug!(
            "Deleted port mapping {}:{} of microservice {}",
            mapping.port_internal, mapping.port_external, owner.uuid
        );
        Ok(())
    }

    /// Delete every mapping of the microservice; returns the count
    pub async fn delete_all_for(
        &self,
        tx: &mut dyn UnitOfWork,
        owner: &Microservice,
    ) -> Result<usize, ControllerError> {
        let mappings = tx.port_mappings().list_for(&owner.uuid).await?;
        for mapping in &mappings {
            self.delete(tx, owner, mapping).await?;
        }
        Ok(mappings.len())
    }

    /// Carry public exposures along when the microservice moves host
    pub async fn relocate_public(
        &self,
        tx: &mut dyn UnitOfWork,
        moved: &Microservice,
        old_host: &HostId,
    ) -> Result<(), ControllerError> {
        let mappings = tx.port_mappings().list_for(&moved.uuid).await?;
        for mapping in mappings.iter().filter(|m| m.is_public) {
            info!(
                "Moving proxy of port {} from host {} to {}",
                mapping.port_external, old_host, moved.iofog_uuid
            );
            self.exposure.relocate(tx, mapping, &moved.iofog_uuid).await?;
        }
        Ok(())
    }

    /// Mappings of a microservice with public links resolved
    pub async fn list_views(
        &self,
        tx: &mut dyn UnitOfWork,
        microservice: &Microservice,
    ) -> Result<Vec<PortMappingView>, ControllerError> {
        let mappings = tx.port_mappings().list_for(&microservice.uuid).await?;
        let mut views = Vec::with_capacity(mappings.len());

        for mapping in &mappings {
            let mut view = PortMappingView::private(mapping);
            if mapping.is_public {
                if let Some(public_port) = tx.public_ports().find_by_port(mapping.id).await? {
                    view.public_port = Some(public_port.public_port);
                    view.protocol = Some(public_port.scheme().to_string());
                    if let Some(host_id) = &public_port.host_id {
                        let router = match tx.routers().find_for_host(host_id).await? {
                            Some(router) => Some(router),
                            None => tx.routers().find_default().await?,
                        };
                        view.public_link = router.map(|r| public_port.link(&r.host));
                    }
                }
            }
            views.push(view);
        }
        Ok(views)
    }
}
