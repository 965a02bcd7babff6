// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for every entity the controller writes, plus the
//! unit of work that scopes them to one transaction.
//!
//! | Trait | Entity | Implementations |
//! |-------|--------|----------------|
//! | `MicroserviceRepository` | `Microservice` | `InMemoryUnitOfWork`, `PostgresUnitOfWork` |
//! | `PortMappingRepository` | `PortMapping` | `InMemoryUnitOfWork`, `PostgresUnitOfWork` |
//! | `PublicPortRepository` | `PublicPort` | `InMemoryUnitOfWork`, `PostgresUnitOfWork` |
//! | `RouteRepository` | `Route` | `InMemoryUnitOfWork`, `PostgresUnitOfWork` |
//! | `ChangeTrackingRepository` | `ChangeTracking` | `InMemoryUnitOfWork`, `PostgresUnitOfWork` |
//!
//! ## Transactions
//!
//! Orchestration never opens or commits a transaction. The caller acquires a
//! [`UnitOfWork`] from a [`TransactionCoordinator`], threads `&mut dyn UnitOfWork`
//! through every call, and commits on success. A unit of work dropped without
//! commit discards all of its writes.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::change_tracking::{ChangeCategory, ChangeTracking};
use crate::domain::fleet::{HostId, Registry, Router};
use crate::domain::microservice::{
    EnvVar, Image, Microservice, MicroserviceFilter, MicroserviceId, MicroserviceStatus,
    VolumeMapping, VolumeMappingRequest,
};
use crate::domain::port_mapping::{
    NewPortMapping, NewPublicPort, PortMapping, PortMappingId, PublicPort, PublicPortId,
};
use crate::domain::route::{NewRoute, Route, RouteId};

/// Storage backend selected at startup
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait MicroserviceRepository: Send {
    /// Insert a new row; `Conflict` when the uuid is taken
    async fn create(&mut self, microservice: &Microservice) -> Result<(), RepositoryError>;

    async fn find(&mut self, filter: &MicroserviceFilter) -> Result<Option<Microservice>, RepositoryError>;

    async fn list(&mut self, filter: &MicroserviceFilter) -> Result<Vec<Microservice>, RepositoryError>;

    /// Overwrite an existing row; `NotFound` when absent
    async fn update(&mut self, microservice: &Microservice) -> Result<(), RepositoryError>;

    /// Remove the row together with its env, args, images, volumes and status
    async fn delete(&mut self, uuid: &MicroserviceId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PortMappingRepository: Send {
    /// `Conflict` when either port is already mapped for the microservice
    async fn create(&mut self, mapping: NewPortMapping) -> Result<PortMapping, RepositoryError>;

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<PortMapping>, RepositoryError>;

    async fn delete(&mut self, id: PortMappingId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PublicPortRepository: Send {
    /// `Conflict` when the public port is already published on the same host
    async fn create(&mut self, port: NewPublicPort) -> Result<PublicPort, RepositoryError>;

    async fn find_by_port(&mut self, port_id: PortMappingId) -> Result<Option<PublicPort>, RepositoryError>;

    async fn find_published(
        &mut self,
        host_id: Option<&HostId>,
        public_port: u16,
    ) -> Result<Option<PublicPort>, RepositoryError>;

    /// Attach or drop the remote side of a tunnel
    async fn set_remote_proxy(
        &mut self,
        id: PublicPortId,
        remote_proxy_id: Option<&MicroserviceId>,
    ) -> Result<(), RepositoryError>;

    async fn delete(&mut self, id: PublicPortId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait VolumeMappingRepository: Send {
    async fn create_bulk(
        &mut self,
        uuid: &MicroserviceId,
        volumes: &[VolumeMappingRequest],
    ) -> Result<Vec<VolumeMapping>, RepositoryError>;

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<VolumeMapping>, RepositoryError>;

    async fn delete_for(&mut self, uuid: &MicroserviceId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RouteRepository: Send {
    /// `Conflict` when the (source, dest) pair already exists
    async fn create(&mut self, route: NewRoute) -> Result<Route, RepositoryError>;

    async fn find(
        &mut self,
        source: &MicroserviceId,
        dest: &MicroserviceId,
    ) -> Result<Option<Route>, RepositoryError>;

    /// Routes where the microservice is source or destination
    async fn list_involving(&mut self, uuid: &MicroserviceId) -> Result<Vec<Route>, RepositoryError>;

    async fn delete(&mut self, id: RouteId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MicroserviceStatusRepository: Send {
    async fn create(&mut self, status: &MicroserviceStatus) -> Result<(), RepositoryError>;

    async fn find(&mut self, uuid: &MicroserviceId) -> Result<Option<MicroserviceStatus>, RepositoryError>;
}

#[async_trait]
pub trait EnvRepository: Send {
    async fn replace(&mut self, uuid: &MicroserviceId, env: &[EnvVar]) -> Result<(), RepositoryError>;

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<EnvVar>, RepositoryError>;
}

#[async_trait]
pub trait ArgRepository: Send {
    async fn replace(&mut self, uuid: &MicroserviceId, args: &[String]) -> Result<(), RepositoryError>;

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<String>, RepositoryError>;
}

#[async_trait]
pub trait ImageRepository: Send {
    async fn replace(&mut self, uuid: &MicroserviceId, images: &[Image]) -> Result<(), RepositoryError>;

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<Image>, RepositoryError>;
}

#[async_trait]
pub trait RegistryRepository: Send {
    async fn find(&mut self, id: i64) -> Result<Option<Registry>, RepositoryError>;
}

#[async_trait]
pub trait RouterRepository: Send {
    /// Router bound to the given host
    async fn find_for_host(&mut self, host: &HostId) -> Result<Option<Router>, RepositoryError>;

    async fn find_default(&mut self) -> Result<Option<Router>, RepositoryError>;
}

#[async_trait]
pub trait ChangeTrackingRepository: Send {
    /// Idempotently flag a category as pending for a host
    async fn mark(&mut self, host: &HostId, category: ChangeCategory) -> Result<(), RepositoryError>;

    async fn find(&mut self, host: &HostId) -> Result<Option<ChangeTracking>, RepositoryError>;
}

/// One transaction's view of every repository
#[async_trait]
pub trait UnitOfWork: Send {
    fn microservices(&mut self) -> &mut dyn MicroserviceRepository;
    fn port_mappings(&mut self) -> &mut dyn PortMappingRepository;
    fn public_ports(&mut self) -> &mut dyn PublicPortRepository;
    fn volume_mappings(&mut self) -> &mut dyn VolumeMappingRepository;
    fn routes(&mut self) -> &mut dyn RouteRepository;
    fn statuses(&mut self) -> &mut dyn MicroserviceStatusRepository;
    fn env(&mut self) -> &mut dyn EnvRepository;
    fn args(&mut self) -> &mut dyn ArgRepository;
    fn images(&mut self) -> &mut dyn ImageRepository;
    fn registries(&mut self) -> &mut dyn RegistryRepository;
    fn routers(&mut self) -> &mut dyn RouterRepository;
    fn change_tracking(&mut self) -> &mut dyn ChangeTrackingRepository;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Hands out units of work
#[async_trait]
pub trait TransactionCoordinator: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
