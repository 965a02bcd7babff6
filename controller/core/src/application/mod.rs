// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod change_notifier;
pub mod route_manager;
pub mod public_exposure;
pub mod port_mapping_manager;
pub mod microservice_service;
pub mod repository_factory;

// Re-export services for convenience
pub use change_notifier::ChangeNotifier;
pub use route_manager::RouteManager;
pub use public_exposure::PublicExposureManager;
pub use port_mapping_manager::PortMappingManager;
pub use microservice_service::{MicroserviceService, StandardMicroserviceService};
