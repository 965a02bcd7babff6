// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Microservice Service
//!
//! Entry point for microservice lifecycle operations. Each call runs inside
//! the caller's unit of work and sequences the port, exposure and route
//! managers so every cascading write lands together or not at all.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Collaborators:**
//!   - Domain: Microservice aggregate, repositories via `UnitOfWork`
//!   - External: CatalogService, FleetRegistry, FlowRegistry, InputValidator
//!
//! # Create Flow
//!
//! 1. Validate and normalize the definition, generate the uuid
//! 2. Reject a duplicate name for the user
//! 3. Resolve catalog images, flow, host and registry before any write
//! 4. Persist the microservice, then its port mappings (and proxies)
//! 5. Flag rebuild and emit `microserviceConfig`
//! 6. Persist images, volumes, env, args and routes
//! 7. Emit `microserviceList`, create the initial status
//!
//! # Errors
//!
//! Returns [`ControllerError`]; the caller rolls back on any error.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::change_notifier::ChangeNotifier;
use crate::application::port_mapping_manager::PortMappingManager;
use crate::application::public_exposure::PublicExposureManager;
use crate::application::route_manager::RouteManager;
use crate::domain::change_tracking::ChangeCategory;
use crate::domain::collaborators::{CatalogService, FleetRegistry, FlowRegistry, InputValidator};
use crate::domain::controller_config::{MicroserviceSettings, ProxySettings};
use crate::domain::errors::ControllerError;
use crate::domain::fleet::{HostFilter, ScopeMode, User};
use crate::domain::microservice::{
    Image, Microservice, MicroserviceDefinition, MicroserviceFilter, MicroserviceId,
    MicroserviceStatus, MicroserviceUpdate, MicroserviceView,
};
use crate::domain::port_mapping::{PortMappingRequest, PortMappingView};
use crate::domain::repository::UnitOfWork;
use crate::domain::route::Route;

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait MicroserviceService: Send + Sync {
    async fn create_microservice(
        &self,
        definition: MicroserviceDefinition,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<MicroserviceView, ControllerError>;

    async fn get_microservice(
        &self,
        uuid: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<MicroserviceView, ControllerError>;

    /// Never fails on an empty result
    async fn list_microservices(
        &self,
        flow_id: Option<i64>,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Vec<MicroserviceView>, ControllerError>;

    async fn update_microservice(
        &self,
        uuid: &MicroserviceId,
        update: MicroserviceUpdate,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<MicroserviceView, ControllerError>;

    /// Delete with its routes, port mappings and proxies
    async fn delete_microservice(
        &self,
        uuid: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<(), ControllerError>;

    async fn add_port_mappings(
        &self,
        uuid: &MicroserviceId,
        mappings: Vec<PortMappingRequest>,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<(), ControllerError>;

    async fn list_port_mappings(
        &self,
        uuid: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Vec<PortMappingView>, ControllerError>;

    async fn create_route(
        &self,
        source: &MicroserviceId,
        dest: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Route, ControllerError>;

    async fn delete_route(
        &self,
        source: &MicroserviceId,
        dest: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<(), ControllerError>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardMicroserviceService {
    catalog: Arc<dyn CatalogService>,
    fleet: Arc<dyn FleetRegistry>,
    flows: Arc<dyn FlowRegistry>,
    validator: Arc<dyn InputValidator>,
    ports: PortMappingManager,
    routes: RouteManager,
    notifier: ChangeNotifier,
    settings: MicroserviceSettings,
}

impl StandardMicroserviceService {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        fleet: Arc<dyn FleetRegistry>,
        flows: Arc<dyn FlowRegistry>,
        validator: Arc<dyn InputValidator>,
        settings: MicroserviceSettings,
        proxy: ProxySettings,
    ) -> Self {
        let notifier = ChangeNotifier::new();
        let routes = RouteManager::new(notifier);
        let exposure = PublicExposureManager::new(
            catalog.clone(),
            fleet.clone(),
            routes.clone(),
            notifier,
            proxy,
            settings.default_log_size_mb,
        );
        let ports = PortMappingManager::new(exposure, notifier);

        Self {
            catalog,
            fleet,
            flows,
            validator,
            ports,
            routes,
            notifier,
            settings,
        }
    }

    async fn find_scoped(
        &self,
        tx: &mut dyn UnitOfWork,
        uuid: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
    ) -> Result<Microservice, ControllerError> {
        let filter = MicroserviceFilter::by_uuid(uuid).owned_by(scope.owner(user));
        let microservice = tx
            .microservices()
            .find(&filter)
            .await?
            .ok_or_else(|| ControllerError::not_found("Microservice", uuid))?;

        // Owner-scoped callers also need to see the flow it belongs to
        if let (Some(_), Some(flow_id)) = (scope.owner(user), microservice.flow_id) {
            let flow = self.flows.find_flow(flow_id, tx).await?;
            if !flow.is_some_and(|flow| scope.permits(user, Some(flow.user_id))) {
                return Err(ControllerError::not_found("Microservice", uuid));
            }
        }
        Ok(microservice)
    }

    /// Scoped lookup that also hides system microservices
    async fn find_mutable(
        &self,
        tx: &mut dyn UnitOfWork,
        uuid: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
    ) -> Result<Microservice, ControllerError> {
        let microservice = self.find_scoped(tx, uuid, user, scope).await?;
        if let Some(catalog_item_id) = microservice.catalog_item_id {
            let item = self.catalog.find_catalog_item(catalog_item_id, tx).await?;
            if item.map(|i| i.is_system()).unwrap_or(false) {
                return Err(ControllerError::not_found("Microservice", uuid));
            }
        }
        Ok(microservice)
    }

    async fn ensure_unique_name(
        &self,
        tx: &mut dyn UnitOfWork,
        name: &str,
        user_id: i64,
        exclude: Option<&MicroserviceId>,
    ) -> Result<(), ControllerError> {
        let mut filter = MicroserviceFilter::by_name(name).owned_by(Some(user_id));
        if let Some(uuid) = exclude {
            filter = filter.excluding(uuid);
        }
        if tx.microservices().find(&filter).await?.is_some() {
            return Err(ControllerError::Conflict(format!(
                "microservice named '{}' already exists",
                name
            )));
        }
        Ok(())
    }

    async fn ensure_registry(&self, tx: &mut dyn UnitOfWork, registry_id: i64) -> Result<(), ControllerError> {
        tx.registries()
            .find(registry_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| ControllerError::not_found("Registry", registry_id))
    }

    async fn view(
        &self,
        tx: &mut dyn UnitOfWork,
        microservice: Microservice,
    ) -> Result<MicroserviceView, ControllerError> {
        let uuid = microservice.uuid.clone();
        let ports = self.ports.list_views(tx, &microservice).await?;
        let volume_mappings = tx.volume_mappings().list_for(&uuid).await?;
        let routes = tx
            .routes()
            .list_involving(&uuid)
            .await?
            .into_iter()
            .filter(|r| r.source_microservice_uuid == uuid)
            .map(|r| r.dest_microservice_uuid)
            .collect();
        let env = tx.env().list_for(&uuid).await?;
        let cmd = tx.args().list_for(&uuid).await?;
        let images = tx.images().list_for(&uuid).await?;
        let status = tx.statuses().find(&uuid).await?;

        Ok(MicroserviceView {
            microservice,
            ports,
            volume_mappings,
            routes,
            env,
            cmd,
            images,
            status,
        })
    }
}

#[async_trait]
impl MicroserviceService for StandardMicroserviceService {
    async fn create_microservice(
        &self,
        definition: MicroserviceDefinition,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<MicroserviceView, ControllerError> {
        self.validator.validate_definition(&definition)?;
        let definition = definition.normalized();
        let uuid = MicroserviceId::generate();
        info!(
            "Creating microservice '{}' ({}) on host {}",
            definition.name, uuid, definition.iofog_uuid
        );

        self.ensure_unique_name(tx, &definition.name, user.id, None).await?;

        let images: Vec<Image> = match definition.catalog_item_id {
            Some(catalog_item_id) => {
                self.catalog
                    .get_catalog_item(catalog_item_id, user, scope, tx)
                    .await?
                    .images
            }
            None => definition.images.clone(),
        };
        if images.is_empty() {
            return Err(ControllerError::Validation(
                "microservice requires a catalog item or at least one image".to_string(),
            ));
        }

        let flow = self
            .flows
            .find_flow(definition.flow_id, tx)
            .await?
            .ok_or_else(|| ControllerError::not_found("Flow", definition.flow_id))?;
        if !scope.permits(user, Some(flow.user_id)) {
            return Err(ControllerError::not_found("Flow", definition.flow_id));
        }

        let host = self
            .fleet
            .get_host(&HostFilter::ById(definition.iofog_uuid.clone()), user, scope, tx)
            .await?;

        let registry_id = definition
            .registry_id
            .unwrap_or(self.settings.default_registry_id);
        self.ensure_registry(tx, registry_id).await?;

        let log_size = definition
            .log_limit
            .map(i64::from)
            .unwrap_or(self.settings.default_log_size_mb);
        let mut microservice = Microservice::from_definition(uuid, &definition, user, log_size, registry_id);
        tx.microservices().create(&microservice).await?;
        debug!("Persisted microservice {} in flow '{}'", microservice.uuid, flow.name);

        for port in &definition.ports {
            self.ports.create(tx, &microservice, port, user).await?;
        }

        microservice.rebuild = true;
        tx.microservices().update(&microservice).await?;
        self.notifier
            .update(tx, &host.uuid, ChangeCategory::MicroserviceConfig)
            .await?;

        tx.images().replace(&microservice.uuid, &images).await?;
        tx.volume_mappings()
            .create_bulk(&microservice.uuid, &definition.volume_mappings)
            .await?;
        tx.env().replace(&microservice.uuid, &definition.env).await?;
        tx.args().replace(&microservice.uuid, &definition.cmd).await?;

        for dest_uuid in &definition.routes {
            let dest = self.find_scoped(tx, dest_uuid, user, scope).await?;
            self.routes.create(tx, &microservice, &dest).await?;
        }

        self.notifier
            .update(tx, &host.uuid, ChangeCategory::MicroserviceList)
            .await?;
        tx.statuses()
            .create(&MicroserviceStatus::initial(microservice.uuid.clone()))
            .await?;

        info!("Created microservice {}", microservice.uuid);
        self.view(tx, microservice).await
    }

    async fn get_microservice(
        &self,
        uuid: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<MicroserviceView, ControllerError> {
        let microservice = self.find_scoped(tx, uuid, user, scope).await?;
        self.view(tx, microservice).await
    }

    async fn list_microservices(
        &self,
        flow_id: Option<i64>,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Vec<MicroserviceView>, ControllerError> {
        let filter = MicroserviceFilter::default()
            .owned_by(scope.owner(user))
            .in_flow(flow_id);
        let microservices = tx.microservices().list(&filter).await?;
        debug!("Listing {} microservice(s)", microservices.len());

        let mut views = Vec::with_capacity(microservices.len());
        for microservice in microservices {
            views.push(self.view(tx, microservice).await?);
        }
        Ok(views)
    }

    async fn update_microservice(
        &self,
        uuid: &MicroserviceId,
        update: MicroserviceUpdate,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<MicroserviceView, ControllerError> {
        self.validator.validate_update(&update)?;
        info!("Updating microservice {}", uuid);

        let mut microservice = self.find_mutable(tx, uuid, user, scope).await?;

        if let Some(name) = &update.name {
            self.ensure_unique_name(tx, name, microservice.user_id, Some(uuid))
                .await?;
        }
        if let Some(registry_id) = update.registry_id {
            self.ensure_registry(tx, registry_id).await?;
        }

        let mut images = update.images.clone();
        if let Some(catalog_item_id) = update.catalog_item_id {
            let item = self
                .catalog
                .get_catalog_item(catalog_item_id, user, scope, tx)
                .await?;
            if images.is_none() && Some(catalog_item_id) != microservice.catalog_item_id {
                images = Some(item.images);
            }
        }
        if let Some(images) = &images {
            if images.is_empty() {
                return Err(ControllerError::Validation(
                    "image list cannot be empty".to_string(),
                ));
            }
        }

        let old_host = microservice.iofog_uuid.clone();
        let new_host = match &update.iofog_uuid {
            Some(host_id) if host_id != &old_host => {
                let host = self
                    .fleet
                    .get_host(&HostFilter::ById(host_id.clone()), user, scope, tx)
                    .await?;
                Some(host.uuid)
            }
            _ => None,
        };

        microservice.apply_update(&update, self.settings.default_log_size_mb);
        if images.is_some() {
            microservice.rebuild = true;
        }
        if let Some(host) = &new_host {
            microservice.iofog_uuid = host.clone();
            microservice.rebuild = true;
        }
        tx.microservices().update(&microservice).await?;

        if let Some(images) = &images {
            tx.images().replace(uuid, images).await?;
        }
        if let Some(volumes) = &update.volume_mappings {
            tx.volume_mappings().delete_for(uuid).await?;
            tx.volume_mappings().create_bulk(uuid, volumes).await?;
        }
        if let Some(env) = &update.env {
            tx.env().replace(uuid, env).await?;
        }
        if let Some(cmd) = &update.cmd {
            tx.args().replace(uuid, cmd).await?;
        }

        self.notifier
            .update(tx, &microservice.iofog_uuid, ChangeCategory::MicroserviceConfig)
            .await?;

        if new_host.is_some() {
            info!(
                "Moving microservice {} from host {} to {}",
                uuid, old_host, microservice.iofog_uuid
            );
            self.routes.reconcile_on_move(tx, &microservice).await?;
            self.ports.relocate_public(tx, &microservice, &old_host).await?;
            self.notifier
                .update(tx, &old_host, ChangeCategory::MicroserviceList)
                .await?;
            self.notifier
                .update(tx, &microservice.iofog_uuid, ChangeCategory::MicroserviceList)
                .await?;
        }

        self.view(tx, microservice).await
    }

    async fn delete_microservice(
        &self,
        uuid: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<(), ControllerError> {
        let microservice = self.find_mutable(tx, uuid, user, scope).await?;
        info!("Deleting microservice {} on host {}", uuid, microservice.iofog_uuid);

        let routes = self.routes.delete_all_for(tx, uuid).await?;
        let mappings = self.ports.delete_all_for(tx, &microservice).await?;

        tx.microservices().delete(uuid).await?;
        self.notifier
            .update(tx, &microservice.iofog_uuid, ChangeCategory::MicroserviceList)
            .await?;

        info!(
            "Deleted microservice {} ({} route(s), {} port mapping(s))",
            uuid, routes, mappings
        );
        Ok(())
    }

    async fn add_port_mappings(
        &self,
        uuid: &MicroserviceId,
        mappings: Vec<PortMappingRequest>,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<(), ControllerError> {
        self.validator.validate_port_mappings(&mappings)?;
        let mut microservice = self.find_scoped(tx, uuid, user, scope).await?;
        info!("Adding {} port mapping(s) to microservice {}", mappings.len(), uuid);

        for mapping in &mappings {
            self.ports.create(tx, &microservice, mapping, user).await?;
        }

        microservice.rebuild = true;
        tx.microservices().update(&microservice).await?;
        self.notifier
            .update(tx, &microservice.iofog_uuid, ChangeCategory::MicroserviceConfig)
            .await?;
        Ok(())
    }

    async fn list_port_mappings(
        &self,
        uuid: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Vec<PortMappingView>, ControllerError> {
        let microservice = self.find_scoped(tx, uuid, user, scope).await?;
        self.ports.list_views(tx, &microservice).await
    }

    async fn create_route(
        &self,
        source: &MicroserviceId,
        dest: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Route, ControllerError> {
        let source = self.find_scoped(tx, source, user, scope).await?;
        let dest = self.find_scoped(tx, dest, user, scope).await?;
        info!("Creating route {} -> {}", source.uuid, dest.uuid);
        self.routes.create(tx, &source, &dest).await
    }

    async fn delete_route(
        &self,
        source: &MicroserviceId,
        dest: &MicroserviceId,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<(), ControllerError> {
        let source = self.find_scoped(tx, source, user, scope).await?;
        let dest = self.find_scoped(tx, dest, user, scope).await?;
        let route = tx
            .routes()
            .find(&source.uuid, &dest.uuid)
            .await?
            .ok_or_else(|| {
                ControllerError::NotFound(format!("route {} -> {} not found", source.uuid, dest.uuid))
            })?;
        info!("Deleting route {} -> {}", source.uuid, dest.uuid);
        self.routes.delete(tx, &route).await
    }
}
