use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-record operation locks.
///
/// Start, stop, delete and status refresh on the same container record run
/// one at a time; operations on different records never contend.
#[derive(Default)]
pub struct ContainerLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ContainerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `record_id`.
    pub async fn acquire(&self, record_id: i64) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard guard is released before awaiting.
        let lock = self
            .locks
            .entry(record_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drops the lock entry of a deleted record.
    pub fn forget(&self, record_id: i64) {
        self.locks.remove(&record_id);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_record_is_serialized() {
        let locks = Arc::new(ContainerLocks::new());
        let guard = locks.acquire(1).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_records_do_not_contend() {
        let locks = ContainerLocks::new();
        let _first = locks.acquire(1).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2)).await;
        assert!(second.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn forget_drops_the_entry() {
        let locks = ContainerLocks::new();
        drop(locks.acquire(7).await);
        locks.forget(7);
        assert!(locks.is_empty());
    }
}
