// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Proxy microservice configuration
//!
//! The only microservice config the controller writes or reads. A proxy
//! forwards traffic between a host-local port and a message-bus queue:
//!
//! ```text
//! local proxy:   amqp:<queue>=>http:<external port>
//! remote proxy:  http:<public port>=>amqp:<queue>
//! ```
//!
//! Serialized as `{"mappings":[...],"networkRouter":{"host":..,"port":..}}`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::domain::fleet::Router;
use crate::domain::microservice::MicroserviceError;

/// Connection info of the message router a proxy attaches to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRouter {
    pub host: String,
    pub port: u16,
}

impl From<&Router> for NetworkRouter {
    fn from(router: &Router) -> Self {
        Self {
            host: router.host.clone(),
            port: router.messaging_port,
        }
    }
}

/// One side of a tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEndpoint {
    Amqp(String),
    Http(u16),
    Tcp(u16),
}

impl TunnelEndpoint {
    /// Host-side endpoint for a port, `tcp` or `http`
    pub fn port(port: u16, is_tcp: bool) -> Self {
        if is_tcp {
            Self::Tcp(port)
        } else {
            Self::Http(port)
        }
    }
}

impl fmt::Display for TunnelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amqp(queue) => write!(f, "amqp:{}", queue),
            Self::Http(port) => write!(f, "http:{}", port),
            Self::Tcp(port) => write!(f, "tcp:{}", port),
        }
    }
}

impl FromStr for TunnelEndpoint {
    type Err = MicroserviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, target) = s
            .split_once(':')
            .ok_or_else(|| MicroserviceError::InvalidProxyConfig(format!("missing scheme in '{}'", s)))?;
        let port = || {
            target
                .parse::<u16>()
                .map_err(|_| MicroserviceError::InvalidProxyConfig(format!("invalid port in '{}'", s)))
        };
        match scheme {
            "amqp" if !target.is_empty() => Ok(Self::Amqp(target.to_string())),
            "http" => Ok(Self::Http(port()?)),
            "tcp" => Ok(Self::Tcp(port()?)),
            _ => Err(MicroserviceError::InvalidProxyConfig(format!(
                "unsupported endpoint '{}'",
                s
            ))),
        }
    }
}

/// Directed `from=>to` forwarding rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelMapping {
    pub from: TunnelEndpoint,
    pub to: TunnelEndpoint,
}

impl TunnelMapping {
    /// Queue traffic delivered to a port on the local host
    pub fn egress(queue: &str, to: TunnelEndpoint) -> Self {
        Self {
            from: TunnelEndpoint::Amqp(queue.to_string()),
            to,
        }
    }

    /// Traffic accepted on a public port and pushed onto a queue
    pub fn ingress(from: TunnelEndpoint, queue: &str) -> Self {
        Self {
            from,
            to: TunnelEndpoint::Amqp(queue.to_string()),
        }
    }
}

impl fmt::Display for TunnelMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=>{}", self.from, self.to)
    }
}

impl FromStr for TunnelMapping {
    type Err = MicroserviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once("=>")
            .ok_or_else(|| MicroserviceError::InvalidProxyConfig(format!("missing '=>' in '{}'", s)))?;
        Ok(Self {
            from: from.parse()?,
            to: to.parse()?,
        })
    }
}

impl Serialize for TunnelMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TunnelMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub mappings: Vec<TunnelMapping>,
    pub network_router: NetworkRouter,
}

impl ProxyConfig {
    pub fn new(mapping: TunnelMapping, network_router: NetworkRouter) -> Self {
        Self {
            mappings: vec![mapping],
            network_router,
        }
    }

    pub fn parse(config: &str) -> Result<Self, MicroserviceError> {
        serde_json::from_str(config).map_err(|e| MicroserviceError::InvalidProxyConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, MicroserviceError> {
        serde_json::to_string(self).map_err(|e| MicroserviceError::InvalidProxyConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> NetworkRouter {
        NetworkRouter {
            host: "1.2.3.4".to_string(),
            port: 5672,
        }
    }

    #[test]
    fn test_local_proxy_config_json() {
        let config = ProxyConfig::new(
            TunnelMapping::egress("abc", TunnelEndpoint::Http(1)),
            router(),
        );
        assert_eq!(
            config.to_json().unwrap(),
            r#"{"mappings":["amqp:abc=>http:1"],"networkRouter":{"host":"1.2.3.4","port":5672}}"#
        );
    }

    #[test]
    fn test_remote_proxy_mapping_text() {
        let mapping = TunnelMapping::ingress(TunnelEndpoint::Http(1234), "abc");
        assert_eq!(mapping.to_string(), "http:1234=>amqp:abc");
    }

    #[test]
    fn test_parse_existing_config() {
        let config = ProxyConfig::parse(
            r#"{"mappings": ["amqp:queuename=>tcp:2"], "networkRouter": {"host": "r", "port": 1}}"#,
        )
        .unwrap();
        assert_eq!(
            config.mappings[0],
            TunnelMapping::egress("queuename", TunnelEndpoint::Tcp(2))
        );
    }

    #[test]
    fn test_reject_malformed_mapping() {
        assert!("amqp:q->http:1".parse::<TunnelMapping>().is_err());
        assert!("http:notaport=>amqp:q".parse::<TunnelMapping>().is_err());
        assert!("ftp:21=>amqp:q".parse::<TunnelMapping>().is_err());
    }
}
