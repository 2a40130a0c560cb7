//! Per-learner mutual exclusion for read-compute-write of an envelope.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::store::UserId;

use super::errors::{EnrolmentError, EnrolmentResult};

/// One advisory lock per learner
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `learner`; callers lock it for the critical section
    pub fn lock_for(&self, learner: UserId) -> EnrolmentResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| EnrolmentError::poisoned())?;
        // Drop locks nobody holds so the map tracks active learners only
        if locks.len() > 1024 {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Ok(Arc::clone(locks.entry(learner).or_default()))
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_learner_same_lock() {
        let locks = KeyedLocks::new();
        let a = locks.lock_for(1).unwrap();
        let b = locks.lock_for(1).unwrap();
        let c = locks.lock_for(2).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_serialises_same_learner() {
        let locks = Arc::new(KeyedLocks::new());
        let counter = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    let lock = locks.lock_for(7).unwrap();
                    let _guard = lock.lock().unwrap();
                    let mut seen = counter.lock().unwrap();
                    seen.push(i);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.lock().unwrap().len(), 4);
    }
}
