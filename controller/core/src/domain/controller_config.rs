// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Controller Configuration Types
//
// Defines the configuration schema for the edgefleet controller:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Microservice defaults (log size, registry)
// - Proxy microservice naming and tunnel schemes
// - Database and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "edgefleet.io/v1";
pub const KIND: &str = "ControllerConfig";

/// Top-level Kubernetes-style controller configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfigManifest {
    /// API version (must be "edgefleet.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ControllerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ControllerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfigSpec {
    #[serde(default)]
    pub microservices: MicroserviceSettings,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSettings>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilitySettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroserviceSettings {
    /// Log size applied when a definition carries no limit
    #[serde(default = "default_log_size_mb")]
    pub default_log_size_mb: i64,

    /// Registry used when a definition names none
    #[serde(default = "default_registry_id")]
    pub default_registry_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Name given to synthesized proxy microservices
    #[serde(default = "default_proxy_name")]
    pub name: String,

    #[serde(default = "default_true")]
    pub root_host_access: bool,

    /// Registry proxies are pulled from
    #[serde(default = "default_registry_id")]
    pub registry_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection string
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}

fn default_log_size_mb() -> i64 {
    50
}

fn default_registry_id() -> i64 {
    1
}

fn default_proxy_name() -> String {
    "Proxy".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MicroserviceSettings {
    fn default() -> Self {
        Self {
            default_log_size_mb: default_log_size_mb(),
            default_registry_id: default_registry_id(),
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            name: default_proxy_name(),
            root_host_access: default_true(),
            registry_id: default_registry_id(),
        }
    }
}

impl Default for ControllerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "edgefleet-controller".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ControllerConfigSpec::default(),
        }
    }
}

impl ControllerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. EDGEFLEET_CONFIG_PATH environment variable
    /// 2. ./edgefleet-config.yaml (working directory)
    /// 3. ~/.edgefleet/config.yaml (user home)
    /// 4. /etc/edgefleet/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("EDGEFLEET_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./edgefleet-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".edgefleet").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/edgefleet/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must load
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("EDGEFLEET_DATABASE_URL") {
            tracing::info!("Environment override: EDGEFLEET_DATABASE_URL");
            match self.spec.database.as_mut() {
                Some(database) => database.url = url,
                None => {
                    self.spec.database = Some(DatabaseSettings {
                        url,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }

        if let Ok(level) = std::env::var("EDGEFLEET_LOG_LEVEL") {
            tracing::info!("Environment override: EDGEFLEET_LOG_LEVEL={}", level);
            self.spec.observability = Some(ObservabilitySettings { log_level: level });
        }
    }

    pub fn log_level(&self) -> &str {
        self.spec
            .observability
            .as_ref()
            .map(|o| o.log_level.as_str())
            .unwrap_or("info")
    }

    /// PostgreSQL when a database is configured, in-memory otherwise
    pub fn storage_backend(&self) -> crate::domain::repository::StorageBackend {
        use crate::domain::repository::{PostgresConfig, StorageBackend};

        match &self.spec.database {
            Some(database) => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: database.url.clone(),
                max_connections: database.max_connections,
            }),
            None => StorageBackend::InMemory,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let microservices = &self.spec.microservices;
        if microservices.default_log_size_mb <= 0 {
            anyhow::bail!(
                "spec.microservices.default_log_size_mb must be positive, got {}",
                microservices.default_log_size_mb
            );
        }

        let proxy = &self.spec.proxy;
        if proxy.name.trim().is_empty() {
            anyhow::bail!("spec.proxy.name cannot be empty");
        }

        if let Some(database) = &self.spec.database {
            if database.url.is_empty() {
                anyhow::bail!("spec.database.url cannot be empty");
            }
            if database.max_connections == 0 {
                anyhow::bail!("spec.database.max_connections must be at least 1");
            }
        }

        Ok(())
    }
}
