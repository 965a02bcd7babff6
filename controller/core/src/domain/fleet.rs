// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fleet, catalog and ownership types
//!
//! Records owned by external collaborators (hosts, flows, catalog items) and
//! the infrastructure rows the core only reads (routers, registries).

use serde::{Deserialize, Serialize};

use crate::domain::microservice::Image;

// ============================================================================
// Hosts
// ============================================================================

/// Identifier of an edge host ("fog")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Managed edge-compute node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub uuid: HostId,
    pub name: String,
    /// Anchors default infrastructure (routers, remote proxies)
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_default: bool,
    pub user_id: i64,
}

/// Lookup criteria understood by the fleet registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostFilter {
    ById(HostId),
    System,
    Default,
}

impl HostFilter {
    pub fn matches(&self, host: &Host) -> bool {
        match self {
            Self::ById(id) => &host.uuid == id,
            Self::System => host.is_system,
            Self::Default => host.is_default,
        }
    }
}

impl std::fmt::Display for HostFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ById(id) => write!(f, "uuid={}", id),
            Self::System => write!(f, "isSystem=true"),
            Self::Default => write!(f, "isDefault=true"),
        }
    }
}

/// Message router an agent connects its proxies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Router {
    pub id: i64,
    pub host: String,
    pub messaging_port: u16,
    /// Host the router runs on; `None` for a detached (cluster) router
    #[serde(default)]
    pub iofog_uuid: Option<HostId>,
    #[serde(default)]
    pub is_default: bool,
}

/// Image registry a microservice pulls from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub id: i64,
    pub url: String,
    #[serde(default)]
    pub is_public: bool,
}

// ============================================================================
// Flows and catalog
// ============================================================================

/// Logical application group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    #[serde(default)]
    pub is_activated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CatalogCategory {
    /// Controller-owned infrastructure; never deletable by users
    System,
    Utilities,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
    pub category: CatalogCategory,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub registry_id: Option<i64>,
    /// `None` for items visible to every user
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl CatalogItem {
    pub fn is_system(&self) -> bool {
        self.category == CatalogCategory::System
    }
}

// ============================================================================
// Ownership
// ============================================================================

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
}

impl User {
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

/// Whether an operation enforces per-user ownership filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeMode {
    /// Operator access: ownership is ignored
    Unscoped,
    /// API access: records are restricted to the caller
    #[default]
    OwnerScoped,
}

impl ScopeMode {
    /// Owner to filter on, if this scope filters at all
    pub fn owner(self, user: &User) -> Option<i64> {
        match self {
            Self::Unscoped => None,
            Self::OwnerScoped => Some(user.id),
        }
    }

    pub fn permits(self, user: &User, owner: Option<i64>) -> bool {
        match (self.owner(user), owner) {
            (None, _) | (_, None) => true,
            (Some(caller), Some(owner)) => caller == owner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(uuid: &str, is_system: bool) -> Host {
        Host {
            uuid: HostId::new(uuid),
            name: uuid.to_string(),
            is_system,
            is_default: false,
            user_id: 1,
        }
    }

    #[test]
    fn test_host_filter_matches() {
        let system = host("sys", true);
        let edge = host("edge", false);

        assert!(HostFilter::System.matches(&system));
        assert!(!HostFilter::System.matches(&edge));
        assert!(HostFilter::ById(HostId::new("edge")).matches(&edge));
        assert!(!HostFilter::Default.matches(&edge));
    }

    #[test]
    fn test_scope_mode_permits() {
        let user = User::new(15);
        assert!(ScopeMode::Unscoped.permits(&user, Some(99)));
        assert!(ScopeMode::OwnerScoped.permits(&user, Some(15)));
        assert!(!ScopeMode::OwnerScoped.permits(&user, Some(99)));
        assert!(ScopeMode::OwnerScoped.permits(&user, None));
    }

    #[test]
    fn test_catalog_category_serialization() {
        let json = serde_json::to_string(&CatalogCategory::System).unwrap();
        assert_eq!(json, "\"SYSTEM\"");
    }
}
