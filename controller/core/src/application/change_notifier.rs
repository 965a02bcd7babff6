// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Change Notifier
//!
//! Records that a host must re-synchronize a category of state. Agents poll
//! the flags out of band; nothing is pushed from here.

use tracing::debug;

use crate::domain::change_tracking::ChangeCategory;
use crate::domain::errors::ControllerError;
use crate::domain::fleet::HostId;
use crate::domain::repository::UnitOfWork;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeNotifier;

impl ChangeNotifier {
    pub fn new() -> Self {
        Self
    }

    pub async fn update(
        &self,
        tx: &mut dyn UnitOfWork,
        host: &HostId,
        category: ChangeCategory,
    ) -> Result<(), ControllerError> {
        debug!("Marking {} pending for host {}", category, host);
        tx.change_tracking().mark(host, category).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::TransactionCoordinator;
    use crate::infrastructure::repositories::InMemoryStore;

    #[tokio::test]
    async fn test_update_collapses_repeated_marks() {
        let store = InMemoryStore::new();
        let host = HostId::new("h1");
        let notifier = ChangeNotifier::new();

        let mut tx = store.begin().await.unwrap();
        notifier.update(tx.as_mut(), &host, ChangeCategory::MicroserviceList).await.unwrap();
        notifier.update(tx.as_mut(), &host, ChangeCategory::MicroserviceList).await.unwrap();
        notifier.update(tx.as_mut(), &host, ChangeCategory::MicroserviceConfig).await.unwrap();
        tx.commit().await.unwrap();

        let tracking = store.change_tracking(&host).await.unwrap();
        assert_eq!(
            tracking.pending(),
            vec![ChangeCategory::MicroserviceConfig, ChangeCategory::MicroserviceList]
        );
    }

    #[tokio::test]
    async fn test_update_discarded_on_rollback() {
        let store = InMemoryStore::new();
        let host = HostId::new("h1");

        let mut tx = store.begin().await.unwrap();
        ChangeNotifier::new()
            .update(tx.as_mut(), &host, ChangeCategory::MicroserviceFull)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(store.change_tracking(&host).await.is_none());
    }
}
