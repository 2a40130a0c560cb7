//! Identity cache of per-course evaluators.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::store::EntityId;

use super::errors::{EnrolmentError, EnrolmentResult};

/// `course_id -> instance`; repeated lookups return the same `Arc`
#[derive(Debug)]
pub struct InstanceCache<T> {
    instances: RwLock<HashMap<EntityId, Arc<T>>>,
}

impl<T> Default for InstanceCache<T> {
    fn default() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> InstanceCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance for `course`, built with `create` on first request
    pub fn get_or_insert_with<F>(&self, course: EntityId, create: F) -> EnrolmentResult<Arc<T>>
    where
        F: FnOnce() -> T,
    {
        if let Some(instance) = self
            .instances
            .read()
            .map_err(|_| EnrolmentError::poisoned())?
            .get(&course)
        {
            return Ok(Arc::clone(instance));
        }

        let mut instances = self
            .instances
            .write()
            .map_err(|_| EnrolmentError::poisoned())?;
        Ok(Arc::clone(
            instances.entry(course).or_insert_with(|| Arc::new(create())),
        ))
    }

    pub fn len(&self) -> usize {
        self.instances.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every instance
    pub fn reset(&self) -> EnrolmentResult<()> {
        self.instances
            .write()
            .map_err(|_| EnrolmentError::poisoned())?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_instance_per_course() {
        let cache: InstanceCache<String> = InstanceCache::new();
        let a = cache.get_or_insert_with(1, || "one".to_string()).unwrap();
        let b = cache.get_or_insert_with(1, || "other".to_string()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b, "one");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reset_builds_fresh_instances() {
        let cache: InstanceCache<String> = InstanceCache::new();
        let a = cache.get_or_insert_with(1, || "one".to_string()).unwrap();
        cache.reset().unwrap();
        assert!(cache.is_empty());

        let b = cache.get_or_insert_with(1, || "one".to_string()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
