//! Per-container advisory locks.
//!
//! Two moves into the same container must not compute their slot from the same sibling
//! snapshot. Every ordering operation takes the lock of each container it reads
//! positions from before opening its write transaction; moves in disjoint containers
//! never wait on each other here.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ordering::Container;

#[derive(Clone, Default)]
pub struct ContainerLocks {
    inner: Arc<DashMap<Container, Arc<Mutex<()>>>>,
}

/// Guards held for the duration of one ordering operation.
pub struct ContainerGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ContainerLocks {
    fn mutex_for(&self, container: Container) -> Arc<Mutex<()>> {
        self.inner.entry(container).or_default().clone()
    }

    pub async fn lock(&self, container: Container) -> ContainerGuard {
        self.lock_all(&[container]).await
    }

    /// Lock several containers. Locks are taken in a fixed global order (and duplicates
    /// collapsed) so two operations over the same pair can never deadlock.
    pub async fn lock_all(&self, containers: &[Container]) -> ContainerGuard {
        let mut ordered = containers.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for container in ordered {
            guards.push(self.mutex_for(container).lock_owned().await);
        }
        ContainerGuard { _guards: guards }
    }

    /// Drop the lock entry of a container that no longer exists.
    pub fn forget(&self, container: Container) {
        self.inner
            .remove_if(&container, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_same_container_is_serialized() {
        let locks = ContainerLocks::default();
        let column = Container::Column(Uuid::new_v4());

        let guard = locks.lock(column).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(column)).await;
        assert!(second.is_err(), "second lock should wait while first is held");

        drop(guard);
        let second = tokio::time::timeout(Duration::from_millis(500), locks.lock(column)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_disjoint_containers_do_not_block() {
        let locks = ContainerLocks::default();
        let _a = locks.lock(Container::Column(Uuid::new_v4())).await;
        let b = tokio::time::timeout(
            Duration::from_millis(500),
            locks.lock(Container::Column(Uuid::new_v4())),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_lock_all_collapses_duplicates() {
        let locks = ContainerLocks::default();
        let column = Container::Column(Uuid::new_v4());
        let guard = tokio::time::timeout(
            Duration::from_millis(500),
            locks.lock_all(&[column, column]),
        )
        .await;
        assert!(guard.is_ok(), "locking the same container twice must not self-deadlock");
    }

    #[tokio::test]
    async fn test_forget_keeps_held_locks() {
        let locks = ContainerLocks::default();
        let column = Container::Column(Uuid::new_v4());
        let guard = locks.lock(column).await;
        locks.forget(column);
        assert_eq!(locks.len(), 1);
        drop(guard);
        locks.forget(column);
        assert!(locks.is_empty());
    }
}
