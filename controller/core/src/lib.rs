// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! EdgeFleet controller core
//!
//! Reconciles desired microservice definitions into persisted records and
//! per-host change-tracking signals.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Microservice lifecycle orchestration for edge hosts

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
