// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates the transaction coordinator for the configured storage backend.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Selects the concrete unit-of-work implementation

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::domain::repository::{StorageBackend, TransactionCoordinator};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::InMemoryStore;

/// Connects to the backend and, for PostgreSQL, applies pending migrations
pub async fn create_transaction_coordinator(backend: &StorageBackend) -> Result<Arc<dyn TransactionCoordinator>> {
    match backend {
        StorageBackend::InMemory => {
            info!("Using in-memory storage backend");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StorageBackend::PostgreSQL(config) => {
            info!("Using PostgreSQL storage backend (max {} connections)", config.max_connections);
            let database = Database::new(config).await?;
            database.migrate().await?;
            Ok(Arc::new(database.store()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_backend_begins_transactions() {
        let coordinator = create_transaction_coordinator(&StorageBackend::InMemory).await.unwrap();
        let tx = coordinator.begin().await.unwrap();
        tx.rollback().await.unwrap();
    }
}
