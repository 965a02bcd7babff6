// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Entities, value objects and the contracts the application layer depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Microservice, port, route and change-tracking model

pub mod microservice;
pub mod port_mapping;
pub mod proxy;
pub mod route;
pub mod fleet;
pub mod change_tracking;
pub mod errors;
pub mod repository;
pub mod collaborators;
pub mod controller_config;
