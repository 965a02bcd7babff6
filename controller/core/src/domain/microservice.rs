// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::fleet::{HostId, User};
use crate::domain::port_mapping::{PortMappingRequest, PortMappingView};

// ============================================================================
// Value Objects
// ============================================================================

/// Length of generated microservice identifiers
pub const MICROSERVICE_UUID_LENGTH: usize = 32;

/// Globally unique microservice identifier (32 random alphanumerics)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MicroserviceId(pub String);

impl MicroserviceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MicroserviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container image for one agent architecture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub container_image: String,
    pub fog_type_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// Volume access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AccessMode {
    #[serde(rename = "ro")]
    ReadOnly,
    #[default]
    #[serde(rename = "rw")]
    ReadWrite,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
        }
    }

    pub fn parse(value: &str) -> Result<Self, MicroserviceError> {
        match value {
            "ro" => Ok(Self::ReadOnly),
            "rw" => Ok(Self::ReadWrite),
            other => Err(MicroserviceError::InvalidVolume(format!(
                "unknown access mode '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMappingRequest {
    pub host_destination: String,
    pub container_destination: String,
    #[serde(default)]
    pub access_mode: AccessMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMapping {
    pub id: i64,
    pub microservice_uuid: MicroserviceId,
    pub host_destination: String,
    pub container_destination: String,
    pub access_mode: AccessMode,
}

/// Container state reported back by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MicroserviceState {
    #[default]
    NotRunning,
    Pulling,
    Starting,
    Running,
    Stopping,
    Deleting,
    Failed,
}

impl MicroserviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRunning => "NOT_RUNNING",
            Self::Pulling => "PULLING",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Deleting => "DELETING",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "PULLING" => Self::Pulling,
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "DELETING" => Self::Deleting,
            "FAILED" => Self::Failed,
            _ => Self::NotRunning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroserviceStatus {
    pub microservice_uuid: MicroserviceId,
    pub status: MicroserviceState,
    pub container_id: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl MicroserviceStatus {
    pub fn initial(microservice_uuid: MicroserviceId) -> Self {
        Self {
            microservice_uuid,
            status: MicroserviceState::NotRunning,
            container_id: None,
            error_message: None,
            updated_at: Utc::now(),
        }
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Deployable workload placed on exactly one host
///
/// Proxy microservices share this shape; they are told apart only by name and
/// by their reference to the proxy catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Microservice {
    pub uuid: MicroserviceId,
    pub name: String,
    /// Opaque to the controller except for proxies
    pub config: String,
    pub catalog_item_id: Option<i64>,
    pub flow_id: Option<i64>,
    pub iofog_uuid: HostId,
    pub user_id: i64,
    pub root_host_access: bool,
    pub log_size: i64,
    pub registry_id: i64,
    /// Soft-delete marker
    pub delete: bool,
    /// Host must recreate the container
    pub rebuild: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Microservice {
    pub fn from_definition(
        uuid: MicroserviceId,
        definition: &MicroserviceDefinition,
        user: &User,
        log_size: i64,
        registry_id: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            uuid,
            name: definition.name.clone(),
            config: definition.config.clone().unwrap_or_default(),
            catalog_item_id: definition.catalog_item_id,
            flow_id: Some(definition.flow_id),
            iofog_uuid: definition.iofog_uuid.clone(),
            user_id: user.id,
            root_host_access: definition.root_host_access,
            log_size,
            registry_id,
            delete: false,
            rebuild: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an update; returns whether the running container is affected
    pub fn apply_update(&mut self, update: &MicroserviceUpdate, default_log_size: i64) -> bool {
        let mut container_changed = false;

        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(config) = &update.config {
            container_changed |= *config != self.config;
            self.config = config.clone();
        }
        if let Some(catalog_item_id) = update.catalog_item_id {
            container_changed |= Some(catalog_item_id) != self.catalog_item_id;
            self.catalog_item_id = Some(catalog_item_id);
        }
        if let Some(root_host_access) = update.root_host_access {
            container_changed |= root_host_access != self.root_host_access;
            self.root_host_access = root_host_access;
        }
        if let Some(registry_id) = update.registry_id {
            container_changed |= registry_id != self.registry_id;
            self.registry_id = registry_id;
        }
        self.log_size = update.log_limit.map(i64::from).unwrap_or(default_log_size);

        container_changed |= update.images.is_some()
            || update.volume_mappings.is_some()
            || update.env.is_some()
            || update.cmd.is_some();

        if update.rebuild.unwrap_or(false) || container_changed {
            self.rebuild = true;
        }
        self.updated_at = Utc::now();
        container_changed
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Desired state submitted on create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroserviceDefinition {
    pub name: String,
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub catalog_item_id: Option<i64>,
    /// Required when no catalog item is referenced
    #[serde(default)]
    pub images: Vec<Image>,
    pub flow_id: i64,
    pub iofog_uuid: HostId,
    #[serde(default)]
    pub root_host_access: bool,
    #[serde(default)]
    pub log_limit: Option<u32>,
    #[serde(default)]
    pub registry_id: Option<i64>,
    #[serde(default)]
    pub volume_mappings: Vec<VolumeMappingRequest>,
    #[serde(default)]
    pub ports: Vec<PortMappingRequest>,
    /// Destination microservices this one routes to
    #[serde(default)]
    pub routes: Vec<MicroserviceId>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub cmd: Vec<String>,
}

impl MicroserviceDefinition {
    /// Trim free-text fields and drop empty optional values
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        if self.config.as_deref().map(str::is_empty).unwrap_or(false) {
            self.config = None;
        }
        self.env.retain(|e| !e.key.trim().is_empty());
        self
    }
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MicroserviceUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub catalog_item_id: Option<i64>,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
    #[serde(default)]
    pub iofog_uuid: Option<HostId>,
    #[serde(default)]
    pub root_host_access: Option<bool>,
    #[serde(default)]
    pub log_limit: Option<u32>,
    #[serde(default)]
    pub registry_id: Option<i64>,
    #[serde(default)]
    pub volume_mappings: Option<Vec<VolumeMappingRequest>>,
    #[serde(default)]
    pub env: Option<Vec<EnvVar>>,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    #[serde(default)]
    pub rebuild: Option<bool>,
}

/// Natural-key filter over microservice rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MicroserviceFilter {
    pub uuid: Option<MicroserviceId>,
    pub exclude_uuid: Option<MicroserviceId>,
    pub name: Option<String>,
    pub user_id: Option<i64>,
    pub flow_id: Option<i64>,
    pub iofog_uuid: Option<HostId>,
    pub include_deleted: bool,
}

impl MicroserviceFilter {
    pub fn by_uuid(uuid: &MicroserviceId) -> Self {
        Self {
            uuid: Some(uuid.clone()),
            ..Default::default()
        }
    }

    pub fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn owned_by(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn in_flow(mut self, flow_id: Option<i64>) -> Self {
        self.flow_id = flow_id;
        self
    }

    pub fn excluding(mut self, uuid: &MicroserviceId) -> Self {
        self.exclude_uuid = Some(uuid.clone());
        self
    }

    pub fn matches(&self, ms: &Microservice) -> bool {
        if !self.include_deleted && ms.delete {
            return false;
        }
        if let Some(uuid) = &self.uuid {
            if &ms.uuid != uuid {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude_uuid {
            if &ms.uuid == exclude {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &ms.name != name {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if ms.user_id != user_id {
                return false;
            }
        }
        if let Some(flow_id) = self.flow_id {
            if ms.flow_id != Some(flow_id) {
                return false;
            }
        }
        if let Some(host) = &self.iofog_uuid {
            if &ms.iofog_uuid != host {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Read Model
// ============================================================================

/// Microservice enriched with everything an operator sees
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroserviceView {
    #[serde(flatten)]
    pub microservice: Microservice,
    pub ports: Vec<PortMappingView>,
    pub volume_mappings: Vec<VolumeMapping>,
    pub routes: Vec<MicroserviceId>,
    pub env: Vec<EnvVar>,
    pub cmd: Vec<String>,
    pub images: Vec<Image>,
    pub status: Option<MicroserviceStatus>,
}

impl MicroserviceView {
    pub fn uuid(&self) -> &MicroserviceId {
        &self.microservice.uuid
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MicroserviceError {
    #[error("Invalid microservice name: {0}")]
    InvalidName(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid volume mapping: {0}")]
    InvalidVolume(String),

    #[error("Invalid proxy config: {0}")]
    InvalidProxyConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> MicroserviceDefinition {
        MicroserviceDefinition {
            name: "  sensor  ".to_string(),
            config: Some(String::new()),
            catalog_item_id: Some(15),
            images: vec![],
            flow_id: 16,
            iofog_uuid: HostId::new("testIofogUuid"),
            root_host_access: true,
            log_limit: Some(50),
            registry_id: None,
            volume_mappings: vec![],
            ports: vec![],
            routes: vec![],
            env: vec![EnvVar { key: " ".to_string(), value: "x".to_string() }],
            cmd: vec![],
        }
    }

    #[test]
    fn test_generated_ids_are_unique_and_sized() {
        let a = MicroserviceId::generate();
        let b = MicroserviceId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), MICROSERVICE_UUID_LENGTH);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_definition_normalization() {
        let def = definition().normalized();
        assert_eq!(def.name, "sensor");
        assert_eq!(def.config, None);
        assert!(def.env.is_empty());
    }

    #[test]
    fn test_from_definition() {
        let def = definition().normalized();
        let ms = Microservice::from_definition(MicroserviceId::generate(), &def, &User::new(15), 50, 1);
        assert_eq!(ms.user_id, 15);
        assert_eq!(ms.flow_id, Some(16));
        assert_eq!(ms.config, "");
        assert!(!ms.rebuild);
        assert!(!ms.delete);
    }

    #[test]
    fn test_apply_update_flags_rebuild_on_container_change() {
        let def = definition().normalized();
        let mut ms = Microservice::from_definition(MicroserviceId::generate(), &def, &User::new(1), 50, 1);

        let rename_only = MicroserviceUpdate {
            name: Some("renamed".to_string()),
            log_limit: Some(10),
            ..Default::default()
        };
        assert!(!ms.apply_update(&rename_only, 50));
        assert!(!ms.rebuild);
        assert_eq!(ms.log_size, 10);

        let new_env = MicroserviceUpdate {
            env: Some(vec![]),
            ..Default::default()
        };
        assert!(ms.apply_update(&new_env, 50));
        assert!(ms.rebuild);
        assert_eq!(ms.log_size, 50);
    }

    #[test]
    fn test_filter_matching() {
        let def = definition().normalized();
        let mut ms = Microservice::from_definition(MicroserviceId::new("a"), &def, &User::new(1), 50, 1);

        assert!(MicroserviceFilter::by_uuid(&ms.uuid).matches(&ms));
        assert!(!MicroserviceFilter::by_uuid(&ms.uuid).owned_by(Some(2)).matches(&ms));
        assert!(!MicroserviceFilter::by_name("sensor").excluding(&ms.uuid).matches(&ms));

        ms.delete = true;
        assert!(!MicroserviceFilter::by_uuid(&ms.uuid).matches(&ms));
    }

    #[test]
    fn test_access_mode_parse() {
        assert_eq!(AccessMode::parse("ro").unwrap(), AccessMode::ReadOnly);
        assert!(AccessMode::parse("wx").is_err());
    }
}
