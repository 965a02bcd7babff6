// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

use crate::domain::fleet::HostId;
use crate::domain::microservice::{Microservice, MicroserviceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub i64);

/// Directed connection between two microservices
///
/// Hosts are denormalized onto the row so both ends can be notified without
/// loading the microservices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: RouteId,
    pub source_microservice_uuid: MicroserviceId,
    pub dest_microservice_uuid: MicroserviceId,
    pub source_iofog_uuid: HostId,
    pub dest_iofog_uuid: HostId,
    /// Endpoints live on different hosts
    pub is_network_connection: bool,
}

impl Route {
    pub fn involves(&self, uuid: &MicroserviceId) -> bool {
        &self.source_microservice_uuid == uuid || &self.dest_microservice_uuid == uuid
    }

    pub fn hosts(&self) -> [&HostId; 2] {
        [&self.source_iofog_uuid, &self.dest_iofog_uuid]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoute {
    pub source_microservice_uuid: MicroserviceId,
    pub dest_microservice_uuid: MicroserviceId,
    pub source_iofog_uuid: HostId,
    pub dest_iofog_uuid: HostId,
    pub is_network_connection: bool,
}

impl NewRoute {
    pub fn between(source: &Microservice, dest: &Microservice) -> Self {
        Self::from_hosts(
            source.uuid.clone(),
            source.iofog_uuid.clone(),
            dest.uuid.clone(),
            dest.iofog_uuid.clone(),
        )
    }

    pub fn from_hosts(
        source: MicroserviceId,
        source_host: HostId,
        dest: MicroserviceId,
        dest_host: HostId,
    ) -> Self {
        let is_network_connection = source_host != dest_host;
        Self {
            source_microservice_uuid: source,
            dest_microservice_uuid: dest,
            source_iofog_uuid: source_host,
            dest_iofog_uuid: dest_host,
            is_network_connection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_connection_flag() {
        let same = NewRoute::from_hosts(
            MicroserviceId::new("a"),
            HostId::new("h1"),
            MicroserviceId::new("b"),
            HostId::new("h1"),
        );
        assert!(!same.is_network_connection);

        let cross = NewRoute::from_hosts(
            MicroserviceId::new("a"),
            HostId::new("h1"),
            MicroserviceId::new("b"),
            HostId::new("h2"),
        );
        assert!(cross.is_network_connection);
    }
}
