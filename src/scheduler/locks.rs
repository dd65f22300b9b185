//! Locks per reminder

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::reminders::ReminderId;

/// A lock for every reminder, different reminders never wait on each other
#[derive(Clone, Debug, Default)]
pub struct KeyedLocks {
    /// Lock per reminder, created on first use
    locks: Arc<DashMap<ReminderId, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    /// Create an empty set of locks
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock of a reminder
    pub async fn lock(&self, reminder_id: ReminderId) -> OwnedMutexGuard<()> {
        // the map guard must be gone before awaiting
        let lock = Arc::clone(self.locks.entry(reminder_id).or_default().value());

        lock.lock_owned().await
    }

    /// Drop the lock of a reminder that no longer exists, unless someone holds it
    pub fn forget(&self, reminder_id: ReminderId) {
        self.locks
            .remove_if(&reminder_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of known locks
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_same_reminder_waits() {
        let locks = KeyedLocks::new();

        let guard = locks.lock(1).await;
        assert!(
            timeout(Duration::from_millis(50), locks.lock(1))
                .await
                .is_err()
        );

        drop(guard);
        assert!(
            timeout(Duration::from_millis(50), locks.lock(1))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_other_reminder_does_not_wait() {
        let locks = KeyedLocks::new();

        let _guard = locks.lock(1).await;
        assert!(
            timeout(Duration::from_millis(50), locks.lock(2))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_forget() {
        let locks = KeyedLocks::new();

        let guard = locks.lock(1).await;
        locks.forget(1);
        assert_eq!(1, locks.len());

        drop(guard);
        locks.forget(1);
        assert_eq!(0, locks.len());
    }
}
