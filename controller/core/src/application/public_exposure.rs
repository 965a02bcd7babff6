// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Public Exposure Manager
//!
//! Makes an internal port reachable from outside its host by tunnelling it
//! through the message router.
//!
//! # Flow
//!
//! 1. Resolve the proxy catalog item, used by every proxy microservice
//! 2. Resolve the remote host: the requested host, else the system host
//! 3. Resolve a router: target host, then remote host, then the default router
//! 4. Create the local proxy on the microservice's host (`amqp:<uuid>=>http:<external>`)
//! 5. With a remote host other than the microservice's own, create the remote
//!    proxy there (`http:<public>=>amqp:<uuid>`)
//! 6. Persist the PublicPort row linking the mapping to both proxies

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::change_notifier::ChangeNotifier;
use crate::application::route_manager::RouteManager;
use crate::domain::change_tracking::ChangeCategory;
use crate::domain::collaborators::{CatalogService, FleetRegistry};
use crate::domain::controller_config::ProxySettings;
use crate::domain::errors::ControllerError;
use crate::domain::fleet::{CatalogItem, Host, HostFilter, HostId, Router, User};
use crate::domain::microservice::{Microservice, MicroserviceFilter, MicroserviceId, MicroserviceStatus};
use crate::domain::port_mapping::{NewPublicPort, PortMapping, PublicExposure, PublicPort};
use crate::domain::proxy::{NetworkRouter, ProxyConfig, TunnelEndpoint, TunnelMapping};
use crate::domain::repository::UnitOfWork;

#[derive(Clone)]
pub struct PublicExposureManager {
    catalog: Arc<dyn CatalogService>,
    fleet: Arc<dyn FleetRegistry>,
    routes: RouteManager,
    notifier: ChangeNotifier,
    settings: ProxySettings,
    log_size_mb: i64,
}

impl PublicExposureManager {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        fleet: Arc<dyn FleetRegistry>,
        routes: RouteManager,
        notifier: ChangeNotifier,
        settings: ProxySettings,
        log_size_mb: i64,
    ) -> Self {
        Self {
            catalog,
            fleet,
            routes,
            notifier,
            settings,
            log_size_mb,
        }
    }

    /// Build the proxy pair for a freshly created public mapping
    pub async fn expose(
        &self,
        tx: &mut dyn UnitOfWork,
        microservice: &Microservice,
        mapping: &PortMapping,
        exposure: &PublicExposure,
        user: &User,
    ) -> Result<PublicPort, ControllerError> {
        info!(
            "Exposing port {} of microservice {} as public port {}",
            mapping.port_external, microservice.uuid, exposure.public_port
        );

        let proxy_item = self.catalog.get_proxy_catalog_item(tx).await?;
        let remote_host = self.resolve_remote_host(tx, exposure).await?;
        let remote_host_id = remote_host.as_ref().map(|h| h.uuid.clone());

        if let Some(host_id) = &remote_host_id {
            if tx
                .public_ports()
                .find_published(Some(host_id), exposure.public_port)
                .await?
                .is_some()
            {
                return Err(ControllerError::Conflict(format!(
                    "public port {} already published on host {}",
                    exposure.public_port, host_id
                )));
            }
        }

        let router = self
            .resolve_router(tx, &microservice.iofog_uuid, remote_host_id.as_ref())
            .await?;
        let network_router = NetworkRouter::from(&router);
        let queue = microservice.uuid.as_str();

        let local_config = ProxyConfig::new(
            TunnelMapping::egress(queue, TunnelEndpoint::port(mapping.port_external, exposure.is_tcp)),
            network_router.clone(),
        );
        let local_proxy = self
            .create_proxy(tx, &microservice.iofog_uuid, &local_config, &proxy_item, user)
            .await?;

        let remote_proxy = match &remote_host_id {
            Some(host_id) if *host_id == microservice.iofog_uuid => {
                debug!(
                    "Microservice {} already runs on remote host {}; no remote proxy",
                    microservice.uuid, host_id
                );
                None
            }
            Some(host_id) => {
                let remote_config = ProxyConfig::new(
                    TunnelMapping::ingress(
                        TunnelEndpoint::port(exposure.public_port, exposure.is_tcp),
                        queue,
                    ),
                    network_router,
                );
                Some(
                    self.create_proxy(tx, host_id, &remote_config, &proxy_item, user)
                        .await?,
                )
            }
            None => {
                debug!("No remote host; microservice {} is exposed local-only", microservice.uuid);
                None
            }
        };

        let public_port = tx
            .public_ports()
            .create(NewPublicPort {
                port_id: mapping.id,
                host_id: remote_host_id,
                local_proxy_id: local_proxy.uuid,
                remote_proxy_id: remote_proxy.map(|p| p.uuid),
                public_port: exposure.public_port,
                queue_name: queue.to_string(),
                is_tcp: exposure.is_tcp,
            })
            .await?;

        Ok(public_port)
    }

    /// Tear down the proxies of a public mapping and its PublicPort row
    pub async fn withdraw(&self, tx: &mut dyn UnitOfWork, mapping: &PortMapping) -> Result<(), ControllerError> {
        let Some(public_port) = tx.public_ports().find_by_port(mapping.id).await? else {
            warn!(
                "Public port mapping {} of microservice {} has no public port record",
                mapping.id, mapping.microservice_uuid
            );
            return Ok(());
        };

        self.remove_proxy(tx, &public_port.local_proxy_id).await?;
        if let Some(remote_proxy_id) = &public_port.remote_proxy_id {
            self.remove_proxy(tx, remote_proxy_id).await?;
        }

        tx.public_ports().delete(public_port.id).await?;
        info!(
            "Withdrew public port {} of microservice {}",
            public_port.public_port, mapping.microservice_uuid
        );
        Ok(())
    }

    /// Move the local proxy of a public mapping along with its microservice
    pub async fn relocate(
        &self,
        tx: &mut dyn UnitOfWork,
        mapping: &PortMapping,
        new_host: &HostId,
    ) -> Result<(), ControllerError> {
        let Some(public_port) = tx.public_ports().find_by_port(mapping.id).await? else {
            warn!(
                "Public port mapping {} of microservice {} has no public port record",
                mapping.id, mapping.microservice_uuid
            );
            return Ok(());
        };

        let router = self
            .resolve_router(tx, new_host, public_port.host_id.as_ref())
            .await?;
        let network_router = NetworkRouter::from(&router);

        let mut local_proxy = self.load_proxy(tx, &public_port.local_proxy_id).await?;
        let old_host = local_proxy.iofog_uuid.clone();
        let mut config = ProxyConfig::parse(&local_proxy.config)?;
        config.network_router = network_router.clone();
        local_proxy.config = config.to_json()?;
        local_proxy.iofog_uuid = new_host.clone();
        local_proxy.rebuild = true;
        tx.microservices().update(&local_proxy).await?;

        self.notifier
            .update(tx, &old_host, ChangeCategory::MicroserviceList)
            .await?;
        self.notifier
            .update(tx, new_host, ChangeCategory::MicroserviceList)
            .await?;

        match (&public_port.remote_proxy_id, &public_port.host_id) {
            (Some(remote_proxy_id), Some(remote_host)) if remote_host == new_host => {
                tx.public_ports().set_remote_proxy(public_port.id, None).await?;
                self.remove_proxy(tx, remote_proxy_id).await?;
                debug!(
                    "Dropped remote proxy {}: microservice {} moved onto {}",
                    remote_proxy_id, mapping.microservice_uuid, remote_host
                );
            }
            (Some(remote_proxy_id), _) => {
                let mut remote_proxy = self.load_proxy(tx, remote_proxy_id).await?;
                let mut config = ProxyConfig::parse(&remote_proxy.config)?;
                if config.network_router != network_router {
                    config.network_router = network_router;
                    remote_proxy.config = config.to_json()?;
                    remote_proxy.rebuild = true;
                    tx.microservices().update(&remote_proxy).await?;
                    self.notifier
                        .update(tx, &remote_proxy.iofog_uuid, ChangeCategory::MicroserviceConfig)
                        .await?;
                }
            }
            (None, Some(remote_host)) if remote_host != new_host => {
                let proxy_item = self.catalog.get_proxy_catalog_item(tx).await?;
                let remote_config = ProxyConfig::new(
                    TunnelMapping::ingress(
                        TunnelEndpoint::port(public_port.public_port, public_port.is_tcp),
                        &public_port.queue_name,
                    ),
                    network_router,
                );
                let owner = User::new(local_proxy.user_id);
                let remote_proxy = self
                    .create_proxy(tx, remote_host, &remote_config, &proxy_item, &owner)
                    .await?;
                tx.public_ports()
                    .set_remote_proxy(public_port.id, Some(&remote_proxy.uuid))
                    .await?;
                debug!(
                    "Created remote proxy {}: microservice {} moved off {}",
                    remote_proxy.uuid, mapping.microservice_uuid, remote_host
                );
            }
            (None, _) => {}
        }

        debug!(
            "Relocated proxy {} from {} to {}",
            local_proxy.uuid, old_host, new_host
        );
        Ok(())
    }

    async fn resolve_remote_host(
        &self,
        tx: &mut dyn UnitOfWork,
        exposure: &PublicExposure,
    ) -> Result<Option<Host>, ControllerError> {
        match &exposure.host_preference {
            Some(host_id) => {
                let filter = HostFilter::ById(host_id.clone());
                let host = self
                    .fleet
                    .find_host(&filter, tx)
                    .await?
                    .ok_or_else(|| ControllerError::not_found("Host", &filter))?;
                Ok(Some(host))
            }
            None => self.fleet.find_host(&HostFilter::System, tx).await,
        }
    }

    async fn resolve_router(
        &self,
        tx: &mut dyn UnitOfWork,
        target_host: &HostId,
        remote_host: Option<&HostId>,
    ) -> Result<Router, ControllerError> {
        if let Some(router) = tx.routers().find_for_host(target_host).await? {
            return Ok(router);
        }
        if let Some(remote) = remote_host {
            if let Some(router) = tx.routers().find_for_host(remote).await? {
                return Ok(router);
            }
        }
        tx.routers()
            .find_default()
            .await?
            .ok_or_else(|| ControllerError::not_found("Router for host", target_host))
    }

    async fn create_proxy(
        &self,
        tx: &mut dyn UnitOfWork,
        host: &HostId,
        config: &ProxyConfig,
        proxy_item: &CatalogItem,
        user: &User,
    ) -> Result<Microservice, ControllerError> {
        let now = chrono::Utc::now();
        let proxy = Microservice {
            uuid: MicroserviceId::generate(),
            name: self.settings.name.clone(),
            config: config.to_json()?,
            catalog_item_id: Some(proxy_item.id),
            flow_id: None,
            iofog_uuid: host.clone(),
            user_id: user.id,
            root_host_access: self.settings.root_host_access,
            log_size: self.log_size_mb,
            registry_id: proxy_item.registry_id.unwrap_or(self.settings.registry_id),
            delete: false,
            rebuild: false,
            created_at: now,
            updated_at: now,
        };

        tx.microservices().create(&proxy).await?;
        tx.images().replace(&proxy.uuid, &proxy_item.images).await?;
        tx.statuses()
            .create(&MicroserviceStatus::initial(proxy.uuid.clone()))
            .await?;
        self.notifier
            .update(tx, host, ChangeCategory::MicroserviceList)
            .await?;

        debug!("Created proxy microservice {} on host {}", proxy.uuid, host);
        Ok(proxy)
    }

    async fn load_proxy(
        &self,
        tx: &mut dyn UnitOfWork,
        uuid: &MicroserviceId,
    ) -> Result<Microservice, ControllerError> {
        tx.microservices()
            .find(&MicroserviceFilter::by_uuid(uuid))
            .await?
            .ok_or_else(|| ControllerError::not_found("Proxy microservice", uuid))
    }

    async fn remove_proxy(&self, tx: &mut dyn UnitOfWork, uuid: &MicroserviceId) -> Result<(), ControllerError> {
        let proxy = self.load_proxy(tx, uuid).await?;
        self.routes.delete_all_for(tx, &proxy.uuid).await?;
        tx.microservices().delete(&proxy.uuid).await?;
        self.notifier
            .update(tx, &proxy.iofog_uuid, ChangeCategory::MicroserviceConfig)
            .await?;
        debug!("Deleted proxy microservice {} on host {}", proxy.uuid, proxy.iofog_uuid);
        Ok(())
    }
}
