// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Payload schema checks for microservice definitions, updates and port lists

use std::collections::HashSet;

use crate::domain::collaborators::InputValidator;
use crate::domain::errors::ControllerError;
use crate::domain::microservice::{
    EnvVar, Image, MicroserviceDefinition, MicroserviceError, MicroserviceUpdate, VolumeMappingRequest,
};
use crate::domain::port_mapping::PortMappingRequest;

const MAX_NAME_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardInputValidator;

impl StandardInputValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_name(name: &str) -> Result<(), MicroserviceError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(MicroserviceError::InvalidName("name must not be empty".to_string()));
        }
        if trimmed.chars().count() > MAX_NAME_LENGTH {
            return Err(MicroserviceError::InvalidName(format!(
                "name exceeds {} characters",
                MAX_NAME_LENGTH
            )));
        }
        Ok(())
    }

    fn check_volumes(volumes: &[VolumeMappingRequest]) -> Result<(), MicroserviceError> {
        for volume in volumes {
            if volume.host_destination.trim().is_empty() || volume.container_destination.trim().is_empty() {
                return Err(MicroserviceError::InvalidVolume(
                    "host and container destinations are required".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn check_env(env: &[EnvVar]) -> Result<(), ControllerError> {
        if env.iter().any(|var| var.key.trim().is_empty()) {
            return Err(ControllerError::Validation(
                "environment variable keys must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn check_images(images: &[Image]) -> Result<(), ControllerError> {
        if images.iter().any(|image| image.container_image.trim().is_empty()) {
            return Err(ControllerError::Validation("container image must not be empty".to_string()));
        }
        Ok(())
    }
}

impl InputValidator for StandardInputValidator {
    fn validate_definition(&self, definition: &MicroserviceDefinition) -> Result<(), ControllerError> {
        Self::check_name(&definition.name)?;
        if definition.iofog_uuid.as_str().trim().is_empty() {
            return Err(ControllerError::Validation("iofogUuid is required".to_string()));
        }
        Self::check_images(&definition.images)?;
        Self::check_volumes(&definition.volume_mappings)?;
        Self::check_env(&definition.env)?;
        self.validate_port_mappings(&definition.ports)
    }

    fn validate_update(&self, update: &MicroserviceUpdate) -> Result<(), ControllerError> {
        if let Some(name) = &update.name {
            Self::check_name(name)?;
        }
        if let Some(host) = &update.iofog_uuid {
            if host.as_str().trim().is_empty() {
                return Err(ControllerError::Validation("iofogUuid must not be empty".to_string()));
            }
        }
        if let Some(images) = &update.images {
            Self::check_images(images)?;
        }
        if let Some(volumes) = &update.volume_mappings {
            Self::check_volumes(volumes)?;
        }
        if let Some(env) = &update.env {
            Self::check_env(env)?;
        }
        Ok(())
    }

    fn validate_port_mappings(&self, mappings: &[PortMappingRequest]) -> Result<(), ControllerError> {
        let mut internal = HashSet::new();
        let mut external = HashSet::new();
        for mapping in mappings {
            mapping.check()?;
            if !internal.insert(mapping.internal) || !external.insert(mapping.external) {
                return Err(ControllerError::Validation(format!(
                    "duplicate port mapping {}:{}",
                    mapping.internal, mapping.external
                )));
            }
        }
        Ok(())
    }
}
