//! # In-Memory Store
//!
//! Backend for tests and embedding. Content, learner data and options sit
//! behind separate locks so a content rollback never discards enrolment
//! writes made in the meantime.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use serde_json::Value;

use super::entity::{Entity, EntityId, EntityKind, NewEntity, OrderKey, UserId};
use super::errors::{StoreError, StoreResult};
use super::{Checkpoint, ContentStore, LearnerStore, OptionStore};

#[derive(Debug, Clone, Default)]
struct ContentState {
    next_id: EntityId,
    entities: BTreeMap<EntityId, Entity>,
    parents: HashMap<EntityId, EntityId>,
    orders: BTreeMap<OrderKey, Vec<EntityId>>,
    meta: HashMap<(EntityId, String), Value>,
}

#[derive(Debug, Default)]
struct LearnerState {
    meta: HashMap<(UserId, EntityId, String), Value>,
    progress: HashSet<(UserId, EntityId)>,
}

/// In-memory implementation of every storage trait
#[derive(Debug, Default)]
pub struct InMemoryStore {
    content: RwLock<ContentState>,
    checkpoints: RwLock<(u64, HashMap<u64, ContentState>)>,
    learners: RwLock<LearnerState>,
    options: RwLock<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities
    pub fn entity_count(&self) -> usize {
        self.content.read().map(|c| c.entities.len()).unwrap_or(0)
    }
}

impl ContentStore for InMemoryStore {
    fn create_entity(&self, entity: NewEntity) -> StoreResult<EntityId> {
        let mut content = self.content.write().map_err(|_| StoreError::poisoned())?;
        content.next_id += 1;
        let id = content.next_id;
        content.entities.insert(id, entity.into_entity(id));
        Ok(id)
    }

    fn get_entity(&self, id: EntityId) -> StoreResult<Option<Entity>> {
        let content = self.content.read().map_err(|_| StoreError::poisoned())?;
        Ok(content.entities.get(&id).cloned())
    }

    fn update_entity(&self, entity: &Entity) -> StoreResult<()> {
        let mut content = self.content.write().map_err(|_| StoreError::poisoned())?;
        match content.entities.get_mut(&entity.id) {
            Some(stored) => {
                *stored = entity.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(entity.id)),
        }
    }

    fn entities_of_kind(&self, kind: EntityKind) -> StoreResult<Vec<Entity>> {
        let content = self.content.read().map_err(|_| StoreError::poisoned())?;
        Ok(content
            .entities
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect())
    }

    fn find_by_slug(&self, kind: EntityKind, slug: &str) -> StoreResult<Option<Entity>> {
        let content = self.content.read().map_err(|_| StoreError::poisoned())?;
        Ok(content
            .entities
            .values()
            .find(|e| e.kind == kind && e.slug == slug)
            .cloned())
    }

    fn link_child_to_parent(&self, child: EntityId, parent: EntityId) -> StoreResult<()> {
        let mut content = self.content.write().map_err(|_| StoreError::poisoned())?;
        for id in [child, parent] {
            if !content.entities.contains_key(&id) {
                return Err(StoreError::NotFound(id));
            }
        }
        content.parents.insert(child, parent);
        Ok(())
    }

    fn unlink(&self, child: EntityId) -> StoreResult<()> {
        let mut content = self.content.write().map_err(|_| StoreError::poisoned())?;
        content.parents.remove(&child);
        Ok(())
    }

    fn parent_of(&self, child: EntityId) -> StoreResult<Option<EntityId>> {
        let content = self.content.read().map_err(|_| StoreError::poisoned())?;
        Ok(content.parents.get(&child).copied())
    }

    fn children_of(&self, parent: EntityId, kind: EntityKind) -> StoreResult<Vec<EntityId>> {
        let content = self.content.read().map_err(|_| StoreError::poisoned())?;
        let mut children: Vec<EntityId> = content
            .parents
            .iter()
            .filter(|(child, p)| {
                **p == parent
                    && content
                        .entities
                        .get(child)
                        .map(|e| e.kind == kind)
                        .unwrap_or(false)
            })
            .map(|(child, _)| *child)
            .collect();
        children.sort_unstable();
        Ok(children)
    }

    fn set_entity_order(&self, key: OrderKey, ids: &[EntityId]) -> StoreResult<()> {
        let mut content = self.content.write().map_err(|_| StoreError::poisoned())?;
        content.orders.insert(key, ids.to_vec());
        Ok(())
    }

    fn get_entity_order(&self, key: OrderKey) -> StoreResult<Vec<EntityId>> {
        let content = self.content.read().map_err(|_| StoreError::poisoned())?;
        Ok(content.orders.get(&key).cloned().unwrap_or_default())
    }

    fn clear_entity_order(&self, key: OrderKey) -> StoreResult<()> {
        let mut content = self.content.write().map_err(|_| StoreError::poisoned())?;
        content.orders.remove(&key);
        Ok(())
    }

    fn orders_containing(&self, id: EntityId) -> StoreResult<Vec<OrderKey>> {
        let content = self.content.read().map_err(|_| StoreError::poisoned())?;
        Ok(content
            .orders
            .iter()
            .filter(|(_, ids)| ids.contains(&id))
            .map(|(key, _)| *key)
            .collect())
    }

    fn get_meta(&self, id: EntityId, key: &str) -> StoreResult<Option<Value>> {
        let content = self.content.read().map_err(|_| StoreError::poisoned())?;
        Ok(content.meta.get(&(id, key.to_string())).cloned())
    }

    fn set_meta(&self, id: EntityId, key: &str, value: Value) -> StoreResult<()> {
        let mut content = self.content.write().map_err(|_| StoreError::poisoned())?;
        if !content.entities.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        content.meta.insert((id, key.to_string()), value);
        Ok(())
    }

    fn delete_meta(&self, id: EntityId, key: &str) -> StoreResult<()> {
        let mut content = self.content.write().map_err(|_| StoreError::poisoned())?;
        content.meta.remove(&(id, key.to_string()));
        Ok(())
    }

    fn checkpoint(&self) -> StoreResult<Checkpoint> {
        let snapshot = self
            .content
            .read()
            .map_err(|_| StoreError::poisoned())?
            .clone();
        let mut checkpoints = self.checkpoints.write().map_err(|_| StoreError::poisoned())?;
        checkpoints.0 += 1;
        let id = checkpoints.0;
        checkpoints.1.insert(id, snapshot);
        Ok(Checkpoint(id))
    }

    fn rollback(&self, checkpoint: Checkpoint) -> StoreResult<()> {
        let snapshot = self
            .checkpoints
            .write()
            .map_err(|_| StoreError::poisoned())?
            .1
            .remove(&checkpoint.0)
            .ok_or(StoreError::InvalidCheckpoint(checkpoint.0))?;
        let mut content = self.content.write().map_err(|_| StoreError::poisoned())?;
        // Ids handed out after the checkpoint are never reused
        let next_id = content.next_id;
        *content = snapshot;
        content.next_id = next_id;
        Ok(())
    }

    fn release(&self, checkpoint: Checkpoint) -> StoreResult<()> {
        self.checkpoints
            .write()
            .map_err(|_| StoreError::poisoned())?
            .1
            .remove(&checkpoint.0)
            .map(|_| ())
            .ok_or(StoreError::InvalidCheckpoint(checkpoint.0))
    }
}

impl LearnerStore for InMemoryStore {
    fn get_learner_meta(
        &self,
        learner: UserId,
        course: EntityId,
        key: &str,
    ) -> StoreResult<Option<Value>> {
        let learners = self.learners.read().map_err(|_| StoreError::poisoned())?;
        Ok(learners.meta.get(&(learner, course, key.to_string())).cloned())
    }

    fn set_learner_meta(
        &self,
        learner: UserId,
        course: EntityId,
        key: &str,
        value: Value,
    ) -> StoreResult<()> {
        let mut learners = self.learners.write().map_err(|_| StoreError::poisoned())?;
        learners.meta.insert((learner, course, key.to_string()), value);
        Ok(())
    }

    fn delete_learner_meta(
        &self,
        learner: UserId,
        course: EntityId,
        key: &str,
    ) -> StoreResult<bool> {
        let mut learners = self.learners.write().map_err(|_| StoreError::poisoned())?;
        Ok(learners
            .meta
            .remove(&(learner, course, key.to_string()))
            .is_some())
    }

    fn has_course_progress(&self, learner: UserId, course: EntityId) -> StoreResult<bool> {
        let learners = self.learners.read().map_err(|_| StoreError::poisoned())?;
        Ok(learners.progress.contains(&(learner, course)))
    }

    fn record_course_progress(&self, learner: UserId, course: EntityId) -> StoreResult<()> {
        let mut learners = self.learners.write().map_err(|_| StoreError::poisoned())?;
        learners.progress.insert((learner, course));
        Ok(())
    }
}

impl OptionStore for InMemoryStore {
    fn get_option(&self, name: &str) -> StoreResult<Option<Value>> {
        let options = self.options.read().map_err(|_| StoreError::poisoned())?;
        Ok(options.get(name).cloned())
    }

    fn set_option(&self, name: &str, value: Value) -> StoreResult<()> {
        let mut options = self.options.write().map_err(|_| StoreError::poisoned())?;
        options.insert(name.to_string(), value);
        Ok(())
    }

    fn add_option(&self, name: &str, value: Value) -> StoreResult<bool> {
        let mut options = self.options.write().map_err(|_| StoreError::poisoned())?;
        if options.contains_key(name) {
            return Ok(false);
        }
        options.insert(name.to_string(), value);
        Ok(true)
    }

    fn delete_option(&self, name: &str) -> StoreResult<()> {
        let mut options = self.options.write().map_err(|_| StoreError::poisoned())?;
        options.remove(name);
        Ok(())
    }
}
