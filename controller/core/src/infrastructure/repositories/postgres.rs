// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Store
//!
//! Production `TransactionCoordinator` backed by PostgreSQL via `sqlx`. Each
//! unit of work owns one `sqlx::Transaction`; dropping it without commit rolls
//! back every statement issued through it.
//!
//! Schema: `migrations/0001_microservices.sql`. Unique constraints there back
//! the `Conflict` errors (SQLSTATE 23505).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::domain::change_tracking::{ChangeCategory, ChangeTracking};
use crate::domain::fleet::{HostId, Registry, Router};
use crate::domain::microservice::{
    AccessMode, EnvVar, Image, Microservice, MicroserviceFilter, MicroserviceId,
    MicroserviceState, MicroserviceStatus, VolumeMapping, VolumeMappingRequest,
};
use crate::domain::port_mapping::{
    NewPortMapping, NewPublicPort, PortMapping, PortMappingId, PublicPort, PublicPortId,
};
use crate::domain::repository::{
    ArgRepository, ChangeTrackingRepository, EnvRepository, ImageRepository,
    MicroserviceRepository, MicroserviceStatusRepository, PortMappingRepository,
    PublicPortRepository, RegistryRepository, RepositoryError, RouteRepository,
    RouterRepository, TransactionCoordinator, UnitOfWork, VolumeMappingRepository,
};
use crate::domain::route::{NewRoute, Route, RouteId};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionCoordinator for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn port(value: i32) -> Result<u16, RepositoryError> {
    u16::try_from(value).map_err(|_| RepositoryError::Serialization(format!("port out of range: {}", value)))
}

const MICROSERVICE_COLUMNS: &str = "uuid, name, config, catalog_item_id, flow_id, iofog_uuid, user_id, \
     root_host_access, log_size, registry_id, is_deleted, rebuild, created_at, updated_at";

const MICROSERVICE_FILTER: &str = "($1::text IS NULL OR uuid = $1) \
     AND ($2::text IS NULL OR uuid <> $2) \
     AND ($3::text IS NULL OR name = $3) \
     AND ($4::bigint IS NULL OR user_id = $4) \
     AND ($5::bigint IS NULL OR flow_id = $5) \
     AND ($6::text IS NULL OR iofog_uuid = $6) \
     AND ($7 OR is_deleted = FALSE)";

fn parse_microservice_row(row: &PgRow) -> Result<Microservice, RepositoryError> {
    Ok(Microservice {
        uuid: MicroserviceId(row.try_get("uuid")?),
        name: row.try_get("name")?,
        config: row.try_get("config")?,
        catalog_item_id: row.try_get("catalog_item_id")?,
        flow_id: row.try_get("flow_id")?,
        iofog_uuid: HostId(row.try_get("iofog_uuid")?),
        user_id: row.try_get("user_id")?,
        root_host_access: row.try_get("root_host_access")?,
        log_size: row.try_get("log_size")?,
        registry_id: row.try_get("registry_id")?,
        delete: row.try_get("is_deleted")?,
        rebuild: row.try_get("rebuild")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn parse_port_mapping_row(row: &PgRow) -> Result<PortMapping, RepositoryError> {
    Ok(PortMapping {
        id: PortMappingId(row.try_get("id")?),
        microservice_uuid: MicroserviceId(row.try_get("microservice_uuid")?),
        port_internal: port(row.try_get("port_internal")?)?,
        port_external: port(row.try_get("port_external")?)?,
        is_public: row.try_get("is_public")?,
        user_id: row.try_get("user_id")?,
    })
}

fn parse_public_port_row(row: &PgRow) -> Result<PublicPort, RepositoryError> {
    Ok(PublicPort {
        id: PublicPortId(row.try_get("id")?),
        port_id: PortMappingId(row.try_get("port_id")?),
        host_id: row.try_get::<Option<String>, _>("host_id")?.map(HostId),
        local_proxy_id: MicroserviceId(row.try_get("local_proxy_id")?),
        remote_proxy_id: row
            .try_get::<Option<String>, _>("remote_proxy_id")?
            .map(MicroserviceId),
        public_port: port(row.try_get("public_port")?)?,
        queue_name: row.try_get("queue_name")?,
        is_tcp: row.try_get("is_tcp")?,
    })
}

fn parse_route_row(row: &PgRow) -> Result<Route, RepositoryError> {
    Ok(Route {
        id: RouteId(row.try_get("id")?),
        source_microservice_uuid: MicroserviceId(row.try_get("source_microservice_uuid")?),
        dest_microservice_uuid: MicroserviceId(row.try_get("dest_microservice_uuid")?),
        source_iofog_uuid: HostId(row.try_get("source_iofog_uuid")?),
        dest_iofog_uuid: HostId(row.try_get("dest_iofog_uuid")?),
        is_network_connection: row.try_get("is_network_connection")?,
    })
}

fn parse_router_row(row: &PgRow) -> Result<Router, RepositoryError> {
    Ok(Router {
        id: row.try_get("id")?,
        host: row.try_get("host")?,
        messaging_port: port(row.try_get("messaging_port")?)?,
        iofog_uuid: row.try_get::<Option<String>, _>("iofog_uuid")?.map(HostId),
        is_default: row.try_get("is_default")?,
    })
}

fn parse_volume_row(row: &PgRow) -> Result<VolumeMapping, RepositoryError> {
    let access_mode: String = row.try_get("access_mode")?;
    Ok(VolumeMapping {
        id: row.try_get("id")?,
        microservice_uuid: MicroserviceId(row.try_get("microservice_uuid")?),
        host_destination: row.try_get("host_destination")?,
        container_destination: row.try_get("container_destination")?,
        access_mode: AccessMode::parse(&access_mode)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
    })
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    fn microservices(&mut self) -> &mut dyn MicroserviceRepository {
        self
    }
    fn port_mappings(&mut self) -> &mut dyn PortMappingRepository {
        self
    }
    fn public_ports(&mut self) -> &mut dyn PublicPortRepository {
        self
    }
    fn volume_mappings(&mut self) -> &mut dyn VolumeMappingRepository {
        self
    }
    fn routes(&mut self) -> &mut dyn RouteRepository {
        self
    }
    fn statuses(&mut self) -> &mut dyn MicroserviceStatusRepository {
        self
    }
    fn env(&mut self) -> &mut dyn EnvRepository {
        self
    }
    fn args(&mut self) -> &mut dyn ArgRepository {
        self
    }
    fn images(&mut self) -> &mut dyn ImageRepository {
        self
    }
    fn registries(&mut self) -> &mut dyn RegistryRepository {
        self
    }
    fn routers(&mut self) -> &mut dyn RouterRepository {
        self
    }
    fn change_tracking(&mut self) -> &mut dyn ChangeTrackingRepository {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl MicroserviceRepository for PostgresUnitOfWork {
    async fn create(&mut self, microservice: &Microservice) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO microservices (
                uuid, name, config, catalog_item_id, flow_id, iofog_uuid, user_id,
                root_host_access, log_size, registry_id, is_deleted, rebuild,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(microservice.uuid.as_str())
        .bind(&microservice.name)
        .bind(&microservice.config)
        .bind(microservice.catalog_item_id)
        .bind(microservice.flow_id)
        .bind(microservice.iofog_uuid.as_str())
        .bind(microservice.user_id)
        .bind(microservice.root_host_access)
        .bind(microservice.log_size)
        .bind(microservice.registry_id)
        .bind(microservice.delete)
        .bind(microservice.rebuild)
        .bind(microservice.created_at)
        .bind(microservice.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find(&mut self, filter: &MicroserviceFilter) -> Result<Option<Microservice>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM microservices WHERE {} ORDER BY created_at LIMIT 1",
            MICROSERVICE_COLUMNS, MICROSERVICE_FILTER
        );
        let row = bind_filter(sqlx::query(&sql), filter)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_microservice_row).transpose()
    }

    async fn list(&mut self, filter: &MicroserviceFilter) -> Result<Vec<Microservice>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM microservices WHERE {} ORDER BY created_at",
            MICROSERVICE_COLUMNS, MICROSERVICE_FILTER
        );
        let rows = bind_filter(sqlx::query(&sql), filter)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(parse_microservice_row).collect()
    }

    async fn update(&mut self, microservice: &Microservice) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE microservices SET
                name = $2, config = $3, catalog_item_id = $4, flow_id = $5,
                iofog_uuid = $6, root_host_access = $7, log_size = $8,
                registry_id = $9, is_deleted = $10, rebuild = $11, updated_at = $12
            WHERE uuid = $1
            "#,
        )
        .bind(microservice.uuid.as_str())
        .bind(&microservice.name)
        .bind(&microservice.config)
        .bind(microservice.catalog_item_id)
        .bind(microservice.flow_id)
        .bind(microservice.iofog_uuid.as_str())
        .bind(microservice.root_host_access)
        .bind(microservice.log_size)
        .bind(microservice.registry_id)
        .bind(microservice.delete)
        .bind(microservice.rebuild)
        .bind(microservice.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("microservice {}", microservice.uuid)));
        }
        Ok(())
    }

    async fn delete(&mut self, uuid: &MicroserviceId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM microservices WHERE uuid = $1")
            .bind(uuid.as_str())
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("microservice {}", uuid)));
        }
        Ok(())
    }
}

fn bind_filter<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    filter: &'q MicroserviceFilter,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(filter.uuid.as_ref().map(|u| u.as_str()))
        .bind(filter.exclude_uuid.as_ref().map(|u| u.as_str()))
        .bind(filter.name.as_deref())
        .bind(filter.user_id)
        .bind(filter.flow_id)
        .bind(filter.iofog_uuid.as_ref().map(|h| h.as_str()))
        .bind(filter.include_deleted)
}

#[async_trait]
impl PortMappingRepository for PostgresUnitOfWork {
    async fn create(&mut self, mapping: NewPortMapping) -> Result<PortMapping, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO microservice_port_mappings (
                microservice_uuid, port_internal, port_external, is_public, user_id
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, microservice_uuid, port_internal, port_external, is_public, user_id
            "#,
        )
        .bind(mapping.microservice_uuid.as_str())
        .bind(i32::from(mapping.port_internal))
        .bind(i32::from(mapping.port_external))
        .bind(mapping.is_public)
        .bind(mapping.user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        parse_port_mapping_row(&row)
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<PortMapping>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, microservice_uuid, port_internal, port_external, is_public, user_id
            FROM microservice_port_mappings
            WHERE microservice_uuid = $1
            ORDER BY id
            "#,
        )
        .bind(uuid.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(parse_port_mapping_row).collect()
    }

    async fn delete(&mut self, id: PortMappingId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM microservice_port_mappings WHERE id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

const PUBLIC_PORT_COLUMNS: &str =
    "id, port_id, host_id, local_proxy_id, remote_proxy_id, public_port, queue_name, is_tcp";

#[async_trait]
impl PublicPortRepository for PostgresUnitOfWork {
    async fn create(&mut self, port: NewPublicPort) -> Result<PublicPort, RepositoryError> {
        let sql = format!(
            "INSERT INTO microservice_public_ports \
             (port_id, host_id, local_proxy_id, remote_proxy_id, public_port, queue_name, is_tcp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            PUBLIC_PORT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(port.port_id.0)
            .bind(port.host_id.as_ref().map(|h| h.as_str()))
            .bind(port.local_proxy_id.as_str())
            .bind(port.remote_proxy_id.as_ref().map(|p| p.as_str()))
            .bind(i32::from(port.public_port))
            .bind(&port.queue_name)
            .bind(port.is_tcp)
            .fetch_one(&mut *self.tx)
            .await?;
        parse_public_port_row(&row)
    }

    async fn find_by_port(&mut self, port_id: PortMappingId) -> Result<Option<PublicPort>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM microservice_public_ports WHERE port_id = $1",
            PUBLIC_PORT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(port_id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_public_port_row).transpose()
    }

    async fn find_published(
        &mut self,
        host_id: Option<&HostId>,
        public_port: u16,
    ) -> Result<Option<PublicPort>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM microservice_public_ports \
             WHERE host_id IS NOT DISTINCT FROM $1 AND public_port = $2",
            PUBLIC_PORT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(host_id.map(|h| h.as_str()))
            .bind(i32::from(public_port))
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_public_port_row).transpose()
    }

    async fn set_remote_proxy(
        &mut self,
        id: PublicPortId,
        remote_proxy_id: Option<&MicroserviceId>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE microservice_public_ports SET remote_proxy_id = $2 WHERE id = $1")
            .bind(id.0)
            .bind(remote_proxy_id.map(|p| p.as_str()))
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("public port {}", id.0)));
        }
        Ok(())
    }

    async fn delete(&mut self, id: PublicPortId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM microservice_public_ports WHERE id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VolumeMappingRepository for PostgresUnitOfWork {
    async fn create_bulk(
        &mut self,
        uuid: &MicroserviceId,
        volumes: &[VolumeMappingRequest],
    ) -> Result<Vec<VolumeMapping>, RepositoryError> {
        let mut created = Vec::with_capacity(volumes.len());
        for volume in volumes {
            let row = sqlx::query(
                r#"
                INSERT INTO volume_mappings (
                    microservice_uuid, host_destination, container_destination, access_mode
                )
                VALUES ($1, $2, $3, $4)
                RETURNING id, microservice_uuid, host_destination, container_destination, access_mode
                "#,
            )
            .bind(uuid.as_str())
            .bind(&volume.host_destination)
            .bind(&volume.container_destination)
            .bind(volume.access_mode.as_str())
            .fetch_one(&mut *self.tx)
            .await?;
            created.push(parse_volume_row(&row)?);
        }
        Ok(created)
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<VolumeMapping>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, microservice_uuid, host_destination, container_destination, access_mode
            FROM volume_mappings
            WHERE microservice_uuid = $1
            ORDER BY id
            "#,
        )
        .bind(uuid.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(parse_volume_row).collect()
    }

    async fn delete_for(&mut self, uuid: &MicroserviceId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM volume_mappings WHERE microservice_uuid = $1")
            .bind(uuid.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

const ROUTE_COLUMNS: &str = "id, source_microservice_uuid, dest_microservice_uuid, \
     source_iofog_uuid, dest_iofog_uuid, is_network_connection";

#[async_trait]
impl RouteRepository for PostgresUnitOfWork {
    async fn create(&mut self, route: NewRoute) -> Result<Route, RepositoryError> {
        let sql = format!(
            "INSERT INTO routings \
             (source_microservice_uuid, dest_microservice_uuid, source_iofog_uuid, dest_iofog_uuid, is_network_connection) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            ROUTE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(route.source_microservice_uuid.as_str())
            .bind(route.dest_microservice_uuid.as_str())
            .bind(route.source_iofog_uuid.as_str())
            .bind(route.dest_iofog_uuid.as_str())
            .bind(route.is_network_connection)
            .fetch_one(&mut *self.tx)
            .await?;
        parse_route_row(&row)
    }

    async fn find(
        &mut self,
        source: &MicroserviceId,
        dest: &MicroserviceId,
    ) -> Result<Option<Route>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM routings WHERE source_microservice_uuid = $1 AND dest_microservice_uuid = $2",
            ROUTE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(source.as_str())
            .bind(dest.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_route_row).transpose()
    }

    async fn list_involving(&mut self, uuid: &MicroserviceId) -> Result<Vec<Route>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM routings \
             WHERE source_microservice_uuid = $1 OR dest_microservice_uuid = $1 ORDER BY id",
            ROUTE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(uuid.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(parse_route_row).collect()
    }

    async fn delete(&mut self, id: RouteId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM routings WHERE id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MicroserviceStatusRepository for PostgresUnitOfWork {
    async fn create(&mut self, status: &MicroserviceStatus) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO microservice_statuses (
                microservice_uuid, status, container_id, error_message, updated_at
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(status.microservice_uuid.as_str())
        .bind(status.status.as_str())
        .bind(&status.container_id)
        .bind(&status.error_message)
        .bind(status.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find(&mut self, uuid: &MicroserviceId) -> Result<Option<MicroserviceStatus>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT microservice_uuid, status, container_id, error_message, updated_at
            FROM microservice_statuses
            WHERE microservice_uuid = $1
            "#,
        )
        .bind(uuid.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                let status: String = row.try_get("status")?;
                Ok(Some(MicroserviceStatus {
                    microservice_uuid: MicroserviceId(row.try_get("microservice_uuid")?),
                    status: MicroserviceState::parse(&status),
                    container_id: row.try_get("container_id")?,
                    error_message: row.try_get("error_message")?,
                    updated_at: row.try_get("updated_at")?,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl EnvRepository for PostgresUnitOfWork {
    async fn replace(&mut self, uuid: &MicroserviceId, env: &[EnvVar]) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM microservice_env WHERE microservice_uuid = $1")
            .bind(uuid.as_str())
            .execute(&mut *self.tx)
            .await?;
        for var in env {
            sqlx::query("INSERT INTO microservice_env (microservice_uuid, key, value) VALUES ($1, $2, $3)")
                .bind(uuid.as_str())
                .bind(&var.key)
                .bind(&var.value)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<EnvVar>, RepositoryError> {
        let rows = sqlx::query("SELECT key, value FROM microservice_env WHERE microservice_uuid = $1 ORDER BY id")
            .bind(uuid.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter()
            .map(|row| -> Result<EnvVar, RepositoryError> {
                Ok(EnvVar {
                    key: row.try_get("key")?,
                    value: row.try_get("value")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ArgRepository for PostgresUnitOfWork {
    async fn replace(&mut self, uuid: &MicroserviceId, args: &[String]) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM microservice_args WHERE microservice_uuid = $1")
            .bind(uuid.as_str())
            .execute(&mut *self.tx)
            .await?;
        for (position, arg) in args.iter().enumerate() {
            sqlx::query("INSERT INTO microservice_args (microservice_uuid, position, cmd) VALUES ($1, $2, $3)")
                .bind(uuid.as_str())
                .bind(position as i32)
                .bind(arg)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT cmd FROM microservice_args WHERE microservice_uuid = $1 ORDER BY position")
            .bind(uuid.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("cmd").map_err(RepositoryError::from))
            .collect()
    }
}

#[async_trait]
impl ImageRepository for PostgresUnitOfWork {
    async fn replace(&mut self, uuid: &MicroserviceId, images: &[Image]) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM microservice_images WHERE microservice_uuid = $1")
            .bind(uuid.as_str())
            .execute(&mut *self.tx)
            .await?;
        for image in images {
            sqlx::query(
                "INSERT INTO microservice_images (microservice_uuid, container_image, fog_type_id) VALUES ($1, $2, $3)",
            )
            .bind(uuid.as_str())
            .bind(&image.container_image)
            .bind(image.fog_type_id)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn list_for(&mut self, uuid: &MicroserviceId) -> Result<Vec<Image>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT container_image, fog_type_id FROM microservice_images WHERE microservice_uuid = $1 ORDER BY id",
        )
        .bind(uuid.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| -> Result<Image, RepositoryError> {
                Ok(Image {
                    container_image: row.try_get("container_image")?,
                    fog_type_id: row.try_get("fog_type_id")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RegistryRepository for PostgresUnitOfWork {
    async fn find(&mut self, id: i64) -> Result<Option<Registry>, RepositoryError> {
        let row = sqlx::query("SELECT id, url, is_public FROM registries WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        match row {
            Some(row) => Ok(Some(Registry {
                id: row.try_get("id")?,
                url: row.try_get("url")?,
                is_public: row.try_get("is_public")?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RouterRepository for PostgresUnitOfWork {
    async fn find_for_host(&mut self, host: &HostId) -> Result<Option<Router>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, host, messaging_port, iofog_uuid, is_default FROM routers WHERE iofog_uuid = $1 LIMIT 1",
        )
        .bind(host.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(parse_router_row).transpose()
    }

    async fn find_default(&mut self) -> Result<Option<Router>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, host, messaging_port, iofog_uuid, is_default FROM routers WHERE is_default = TRUE LIMIT 1",
        )
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(parse_router_row).transpose()
    }
}

fn change_column(category: ChangeCategory) -> &'static str {
    match category {
        ChangeCategory::MicroserviceConfig => "microservice_config",
        ChangeCategory::MicroserviceCommon => "microservice_common",
        ChangeCategory::MicroserviceList => "microservice_list",
        ChangeCategory::MicroserviceFull => "microservice_full",
    }
}

#[async_trait]
impl ChangeTrackingRepository for PostgresUnitOfWork {
    async fn mark(&mut self, host: &HostId, category: ChangeCategory) -> Result<(), RepositoryError> {
        let column = change_column(category);
        let sql = format!(
            "INSERT INTO change_trackings (iofog_uuid, {column}) VALUES ($1, TRUE) \
             ON CONFLICT (iofog_uuid) DO UPDATE SET {column} = TRUE"
        );
        sqlx::query(&sql)
            .bind(host.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn find(&mut self, host: &HostId) -> Result<Option<ChangeTracking>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT iofog_uuid, microservice_config, microservice_common, microservice_list, microservice_full
            FROM change_trackings
            WHERE iofog_uuid = $1
            "#,
        )
        .bind(host.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        match row {
            Some(row) => Ok(Some(ChangeTracking {
                iofog_uuid: HostId(row.try_get("iofog_uuid")?),
                microservice_config: row.try_get("microservice_config")?,
                microservice_common: row.try_get("microservice_common")?,
                microservice_list: row.try_get("microservice_list")?,
                microservice_full: row.try_get("microservice_full")?,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_columns_match_schema() {
        let schema = include_str!("../../../migrations/0001_microservices.sql");
        for category in ChangeCategory::ALL {
            assert!(schema.contains(change_column(category)));
        }
    }

    #[test]
    fn test_port_range_checked() {
        assert_eq!(port(5672).unwrap(), 5672);
        assert!(port(-1).is_err());
        assert!(port(70000).is_err());
    }
}
