// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod db;
pub mod registries;
pub mod validator;

pub use registries::{InMemoryCatalog, InMemoryFleet, InMemoryFlows};
pub use repositories::{InMemoryStore, PostgresStore};
pub use validator::StandardInputValidator;
