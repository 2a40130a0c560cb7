//! # Storage Seam
//!
//! Traits the engine persists through, plus an in-memory backend.
//!
//! - `ContentStore`: courses, lessons, quizzes, modules, their parent links,
//!   explicit orderings and per-entity metadata.
//! - `LearnerStore`: metadata scoped to a (learner, course) pair and legacy
//!   course-progress records.
//! - `OptionStore`: site-wide options (site salt, migration flags).
//!
//! ## Invariants
//! - Writes are visible to the next read on any handle (no eventual consistency)
//! - `rollback` restores content state exactly as it was at `checkpoint`

mod entity;
mod errors;
mod memory;

pub use entity::{Entity, EntityId, EntityKind, EntityStatus, NewEntity, OrderKey, UserId};
pub use errors::{StoreError, StoreResult};
pub use memory::InMemoryStore;

use serde_json::Value;

/// Opaque handle to a content-state checkpoint
#[derive(Debug, PartialEq, Eq)]
pub struct Checkpoint(pub(crate) u64);

/// Content storage
pub trait ContentStore: Send + Sync {
    /// Create an entity and return its id
    fn create_entity(&self, entity: NewEntity) -> StoreResult<EntityId>;

    /// Fetch an entity by id
    fn get_entity(&self, id: EntityId) -> StoreResult<Option<Entity>>;

    /// Overwrite an existing entity
    fn update_entity(&self, entity: &Entity) -> StoreResult<()>;

    /// All entities of a kind, ordered by id
    fn entities_of_kind(&self, kind: EntityKind) -> StoreResult<Vec<Entity>>;

    /// Find an entity of a kind by exact slug
    fn find_by_slug(&self, kind: EntityKind, slug: &str) -> StoreResult<Option<Entity>>;

    /// Link a child to a parent, replacing any previous parent
    fn link_child_to_parent(&self, child: EntityId, parent: EntityId) -> StoreResult<()>;

    /// Remove the parent link of a child
    fn unlink(&self, child: EntityId) -> StoreResult<()>;

    fn parent_of(&self, child: EntityId) -> StoreResult<Option<EntityId>>;

    /// Children of a parent filtered by kind, ordered by id
    fn children_of(&self, parent: EntityId, kind: EntityKind) -> StoreResult<Vec<EntityId>>;

    fn set_entity_order(&self, key: OrderKey, ids: &[EntityId]) -> StoreResult<()>;

    /// Stored order, empty when none was recorded
    fn get_entity_order(&self, key: OrderKey) -> StoreResult<Vec<EntityId>>;

    fn clear_entity_order(&self, key: OrderKey) -> StoreResult<()>;

    /// Every order list that currently contains `id`
    fn orders_containing(&self, id: EntityId) -> StoreResult<Vec<OrderKey>>;

    fn get_meta(&self, id: EntityId, key: &str) -> StoreResult<Option<Value>>;

    fn set_meta(&self, id: EntityId, key: &str, value: Value) -> StoreResult<()>;

    fn delete_meta(&self, id: EntityId, key: &str) -> StoreResult<()>;

    /// Capture the current content state
    fn checkpoint(&self) -> StoreResult<Checkpoint>;

    /// Restore the content state captured by `checkpoint`
    fn rollback(&self, checkpoint: Checkpoint) -> StoreResult<()>;

    /// Discard a checkpoint, keeping all writes made since
    fn release(&self, checkpoint: Checkpoint) -> StoreResult<()>;
}

/// Learner-scoped storage
pub trait LearnerStore: Send + Sync {
    fn get_learner_meta(&self, learner: UserId, course: EntityId, key: &str)
        -> StoreResult<Option<Value>>;

    fn set_learner_meta(
        &self,
        learner: UserId,
        course: EntityId,
        key: &str,
        value: Value,
    ) -> StoreResult<()>;

    /// Delete a learner meta value; returns whether one existed
    fn delete_learner_meta(&self, learner: UserId, course: EntityId, key: &str)
        -> StoreResult<bool>;

    /// Whether the learner has progress records for the course
    fn has_course_progress(&self, learner: UserId, course: EntityId) -> StoreResult<bool>;

    fn record_course_progress(&self, learner: UserId, course: EntityId) -> StoreResult<()>;
}

/// Site-wide options
pub trait OptionStore: Send + Sync {
    fn get_option(&self, name: &str) -> StoreResult<Option<Value>>;

    fn set_option(&self, name: &str, value: Value) -> StoreResult<()>;

    /// Set an option only if absent; returns whether it was written
    fn add_option(&self, name: &str, value: Value) -> StoreResult<bool>;

    fn delete_option(&self, name: &str) -> StoreResult<()>;
}

/// Fetch an entity and check its kind
pub fn require_entity<S: ContentStore + ?Sized>(
    store: &S,
    id: EntityId,
    kind: EntityKind,
) -> StoreResult<Entity> {
    let entity = store.get_entity(id)?.ok_or(StoreError::NotFound(id))?;
    if entity.kind != kind {
        return Err(StoreError::WrongKind { id, expected: kind });
    }
    Ok(entity)
}
