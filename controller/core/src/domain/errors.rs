// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error taxonomy returned by every controller operation
//!
//! The first failing step aborts the operation; callers roll the unit of work
//! back and surface the error unchanged.

use thiserror::Error;

use crate::domain::microservice::MicroserviceError;
use crate::domain::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Malformed or missing input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced flow, host, microservice or registry is absent, or the
    /// target is a protected system microservice
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate name, port pair, route or public port
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A collaborator call failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

impl ControllerError {
    pub fn not_found(entity: &str, key: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} not found: {}", entity, key))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<RepositoryError> for ControllerError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => ControllerError::Conflict(msg),
            RepositoryError::NotFound(msg) => ControllerError::NotFound(msg),
            other => ControllerError::Repository(other),
        }
    }
}

impl From<MicroserviceError> for ControllerError {
    fn from(err: MicroserviceError) -> Self {
        ControllerError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_conflict_surfaces_as_conflict() {
        let err: ControllerError = RepositoryError::Conflict("port 80".to_string()).into();
        assert!(err.is_conflict());

        let err: ControllerError = RepositoryError::Database("down".to_string()).into();
        assert!(matches!(err, ControllerError::Repository(RepositoryError::Database(_))));
    }

    #[test]
    fn test_value_errors_are_validation() {
        let err: ControllerError = MicroserviceError::InvalidPort("0".to_string()).into();
        assert!(matches!(err, ControllerError::Validation(_)));
    }
}
