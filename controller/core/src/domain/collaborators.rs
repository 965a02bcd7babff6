// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! External collaborator contracts
//!
//! Catalog, fleet and flow lookups are owned by other services. They receive
//! the caller's unit of work so reads observe the same transaction as the
//! writes that follow them.

use async_trait::async_trait;

use crate::domain::errors::ControllerError;
use crate::domain::fleet::{CatalogItem, Flow, Host, HostFilter, ScopeMode, User};
use crate::domain::microservice::{MicroserviceDefinition, MicroserviceUpdate};
use crate::domain::port_mapping::PortMappingRequest;
use crate::domain::repository::UnitOfWork;

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Catalog item visible to the caller; `NotFound` otherwise
    async fn get_catalog_item(
        &self,
        id: i64,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<CatalogItem, ControllerError>;

    /// The item every proxy microservice references
    async fn get_proxy_catalog_item(&self, tx: &mut dyn UnitOfWork) -> Result<CatalogItem, ControllerError>;

    /// Unscoped lookup used to guard system microservices
    async fn find_catalog_item(
        &self,
        id: i64,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Option<CatalogItem>, ControllerError>;
}

#[async_trait]
pub trait FleetRegistry: Send + Sync {
    /// Host matching the filter under the caller's scope; `NotFound` otherwise
    async fn get_host(
        &self,
        filter: &HostFilter,
        user: &User,
        scope: ScopeMode,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Host, ControllerError>;

    async fn find_host(
        &self,
        filter: &HostFilter,
        tx: &mut dyn UnitOfWork,
    ) -> Result<Option<Host>, ControllerError>;
}

#[async_trait]
pub trait FlowRegistry: Send + Sync {
    async fn find_flow(&self, id: i64, tx: &mut dyn UnitOfWork) -> Result<Option<Flow>, ControllerError>;
}

/// Payload schema checks, run before any lookup or write
pub trait InputValidator: Send + Sync {
    fn validate_definition(&self, definition: &MicroserviceDefinition) -> Result<(), ControllerError>;

    fn validate_update(&self, update: &MicroserviceUpdate) -> Result<(), ControllerError>;

    fn validate_port_mappings(&self, mappings: &[PortMappingRequest]) -> Result<(), ControllerError>;
}
