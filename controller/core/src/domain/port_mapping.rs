// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Port mappings and public ports
//!
//! A port mapping publishes a container port on its host. A *public* mapping is
//! additionally reachable from outside the host through a pair of proxy
//! microservices; the [`PublicPort`] row links the mapping to those proxies.

use serde::{Deserialize, Serialize};

use crate::domain::fleet::HostId;
use crate::domain::microservice::{MicroserviceError, MicroserviceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortMappingId(pub i64);

impl std::fmt::Display for PortMappingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicPortId(pub i64);

// ============================================================================
// Requests
// ============================================================================

/// How a requested mapping is exposed, decided once when the request is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exposure {
    Private,
    Public(PublicExposure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicExposure {
    pub public_port: u16,
    /// Host to publish on instead of the system host
    pub host_preference: Option<HostId>,
    pub is_tcp: bool,
}

impl PublicExposure {
    pub fn scheme(&self) -> &'static str {
        if self.is_tcp {
            "tcp"
        } else {
            "http"
        }
    }
}

/// Requested port mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PortMappingInput", into = "PortMappingInput")]
pub struct PortMappingRequest {
    pub internal: u16,
    pub external: u16,
    pub exposure: Exposure,
}

impl PortMappingRequest {
    pub fn private(internal: u16, external: u16) -> Self {
        Self {
            internal,
            external,
            exposure: Exposure::Private,
        }
    }

    pub fn public(internal: u16, external: u16, public_port: u16) -> Self {
        Self {
            internal,
            external,
            exposure: Exposure::Public(PublicExposure {
                public_port,
                host_preference: None,
                is_tcp: false,
            }),
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self.exposure, Exposure::Public(_))
    }

    pub fn check(&self) -> Result<(), MicroserviceError> {
        if self.internal == 0 || self.external == 0 {
            return Err(MicroserviceError::InvalidPort(format!(
                "ports must be in 1..=65535 (internal {}, external {})",
                self.internal, self.external
            )));
        }
        if let Exposure::Public(public) = &self.exposure {
            if public.public_port == 0 {
                return Err(MicroserviceError::InvalidPort(
                    "public port must be in 1..=65535".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Wire form of a port mapping; `publicPort` presence selects the variant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMappingInput {
    internal: u16,
    external: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host: Option<HostId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protocol: Option<String>,
}

impl From<PortMappingInput> for PortMappingRequest {
    fn from(input: PortMappingInput) -> Self {
        let exposure = match input.public_port {
            Some(public_port) => Exposure::Public(PublicExposure {
                public_port,
                host_preference: input.host,
                is_tcp: input.protocol.as_deref() == Some("tcp"),
            }),
            None => Exposure::Private,
        };
        Self {
            internal: input.internal,
            external: input.external,
            exposure,
        }
    }
}

impl From<PortMappingRequest> for PortMappingInput {
    fn from(request: PortMappingRequest) -> Self {
        match request.exposure {
            Exposure::Private => Self {
                internal: request.internal,
                external: request.external,
                public_port: None,
                host: None,
                protocol: None,
            },
            Exposure::Public(public) => Self {
                internal: request.internal,
                external: request.external,
                public_port: Some(public.public_port),
                protocol: Some(public.scheme().to_string()),
                host: public.host_preference,
            },
        }
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub id: PortMappingId,
    pub microservice_uuid: MicroserviceId,
    pub port_internal: u16,
    pub port_external: u16,
    pub is_public: bool,
    pub user_id: i64,
}

impl PortMapping {
    pub fn collides_with(&self, internal: u16, external: u16) -> bool {
        self.port_internal == internal || self.port_external == external
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPortMapping {
    pub microservice_uuid: MicroserviceId,
    pub port_internal: u16,
    pub port_external: u16,
    pub is_public: bool,
    pub user_id: i64,
}

/// Public exposure of one port mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPort {
    pub id: PublicPortId,
    pub port_id: PortMappingId,
    /// Remote host the port is published on; `None` without a system host
    pub host_id: Option<HostId>,
    pub local_proxy_id: MicroserviceId,
    pub remote_proxy_id: Option<MicroserviceId>,
    pub public_port: u16,
    pub queue_name: String,
    pub is_tcp: bool,
}

impl PublicPort {
    pub fn scheme(&self) -> &'static str {
        if self.is_tcp {
            "tcp"
        } else {
            "http"
        }
    }

    pub fn link(&self, router_host: &str) -> String {
        format!("{}://{}:{}", self.scheme(), router_host, self.public_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPublicPort {
    pub port_id: PortMappingId,
    pub host_id: Option<HostId>,
    pub local_proxy_id: MicroserviceId,
    pub remote_proxy_id: Option<MicroserviceId>,
    pub public_port: u16,
    pub queue_name: String,
    pub is_tcp: bool,
}

/// Port mapping as shown to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMappingView {
    pub internal: u16,
    pub external: u16,
    pub public_port: Option<u16>,
    pub protocol: Option<String>,
    pub public_link: Option<String>,
}

impl PortMappingView {
    pub fn private(mapping: &PortMapping) -> Self {
        Self {
            internal: mapping.port_internal,
            external: mapping.port_external,
            public_port: None,
            protocol: None,
            public_link: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_variant_selected_by_public_port() {
        let private: PortMappingRequest =
            serde_json::from_str(r#"{"internal": 1, "external": 1}"#).unwrap();
        assert_eq!(private.exposure, Exposure::Private);

        let public: PortMappingRequest = serde_json::from_str(
            r#"{"internal": 80, "external": 8080, "publicPort": 1234, "protocol": "tcp", "host": "edge-2"}"#,
        )
        .unwrap();
        assert_eq!(
            public.exposure,
            Exposure::Public(PublicExposure {
                public_port: 1234,
                host_preference: Some(HostId::new("edge-2")),
                is_tcp: true,
            })
        );
    }

    #[test]
    fn test_port_check_rejects_zero() {
        assert!(PortMappingRequest::private(0, 80).check().is_err());
        assert!(PortMappingRequest::public(80, 80, 0).check().is_err());
        assert!(PortMappingRequest::public(80, 80, 1234).check().is_ok());
    }

    #[test]
    fn test_collision_on_either_port() {
        let mapping = PortMapping {
            id: PortMappingId(1),
            microservice_uuid: MicroserviceId::new("ms"),
            port_internal: 80,
            port_external: 8080,
            is_public: false,
            user_id: 1,
        };
        assert!(mapping.collides_with(80, 9000));
        assert!(mapping.collides_with(81, 8080));
        assert!(!mapping.collides_with(81, 8081));
    }

    #[test]
    fn test_public_link() {
        let port = PublicPort {
            id: PublicPortId(1),
            port_id: PortMappingId(1),
            host_id: Some(HostId::new("fakeAgentUuid")),
            local_proxy_id: MicroserviceId::new("local"),
            remote_proxy_id: None,
            public_port: 1234,
            queue_name: "q".to_string(),
            is_tcp: false,
        };
        assert_eq!(port.link("1.2.3.4"), "http://1.2.3.4:1234");
    }
}
