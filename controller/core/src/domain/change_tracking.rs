// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Change tracking
//!
//! Per-host "dirty" flags agents poll to learn what to re-fetch. Marking is
//! idempotent: repeated marks of the same category collapse into one pending
//! flag and carry no ordering or count.

use serde::{Deserialize, Serialize};

use crate::domain::fleet::HostId;

/// Category of state a host must re-synchronize, narrowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeCategory {
    /// One microservice's config changed
    MicroserviceConfig,
    /// One microservice's ports changed
    MicroserviceCommon,
    /// The host's microservice set changed
    MicroserviceList,
    /// Full resync, for topology changes spanning hosts
    MicroserviceFull,
}

impl ChangeCategory {
    pub const ALL: [ChangeCategory; 4] = [
        Self::MicroserviceConfig,
        Self::MicroserviceCommon,
        Self::MicroserviceList,
        Self::MicroserviceFull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MicroserviceConfig => "microserviceConfig",
            Self::MicroserviceCommon => "microserviceCommon",
            Self::MicroserviceList => "microserviceList",
            Self::MicroserviceFull => "microserviceFull",
        }
    }
}

impl std::fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending flags for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTracking {
    pub iofog_uuid: HostId,
    pub microservice_config: bool,
    pub microservice_common: bool,
    pub microservice_list: bool,
    pub microservice_full: bool,
}

impl ChangeTracking {
    pub fn new(iofog_uuid: HostId) -> Self {
        Self {
            iofog_uuid,
            microservice_config: false,
            microservice_common: false,
            microservice_list: false,
            microservice_full: false,
        }
    }

    pub fn mark(&mut self, category: ChangeCategory) {
        *self.flag_mut(category) = true;
    }

    pub fn is_pending(&self, category: ChangeCategory) -> bool {
        match category {
            ChangeCategory::MicroserviceConfig => self.microservice_config,
            ChangeCategory::MicroserviceCommon => self.microservice_common,
            ChangeCategory::MicroserviceList => self.microservice_list,
            ChangeCategory::MicroserviceFull => self.microservice_full,
        }
    }

    pub fn pending(&self) -> Vec<ChangeCategory> {
        ChangeCategory::ALL
            .into_iter()
            .filter(|c| self.is_pending(*c))
            .collect()
    }

    /// Widest pending category, which subsumes the narrower ones
    pub fn broadest(&self) -> Option<ChangeCategory> {
        self.pending().into_iter().max()
    }

    fn flag_mut(&mut self, category: ChangeCategory) -> &mut bool {
        match category {
            ChangeCategory::MicroserviceConfig => &mut self.microservice_config,
            ChangeCategory::MicroserviceCommon => &mut self.microservice_common,
            ChangeCategory::MicroserviceList => &mut self.microservice_list,
            ChangeCategory::MicroserviceFull => &mut self.microservice_full,
        }
    }
}
