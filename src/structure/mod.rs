//! # Course Structure
//!
//! Ordered tree of lessons and modules per course, with a validating,
//! all-or-nothing save.
//!
//! ## Invariants
//! - A lesson belongs to at most one course and at most one module in it
//! - A module's lesson list is kept per course, so a shared module can
//!   hold different lessons in different courses
//! - A failed save leaves the stored structure unchanged
//! - Teachers never take over another teacher's module slug; admins may

mod errors;
mod node;
mod reconciler;
mod slug;

pub use errors::{StructureError, StructureResult};
pub use node::{LessonNode, ModuleNode, StructureContext, StructureNode};
pub use reconciler::{CourseStructure, LESSON_MODULE_META, LESSON_PREVIEW_META, LESSON_QUIZ_META};
pub use slug::{module_slug, normalize_title, slugify};

use crate::store::{Entity, UserId};

/// User performing a structure save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Actor {
    pub fn teacher(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// Owner recorded on modules this actor creates; admins create
    /// site-wide modules
    pub fn module_owner(&self) -> Option<UserId> {
        if self.is_admin {
            None
        } else {
            Some(self.user_id)
        }
    }

    /// Whether a module may be attached to the actor's course
    pub fn may_use_module(&self, module: &Entity) -> bool {
        self.is_admin || module.author.is_none() || module.author == Some(self.user_id)
    }

    /// Whether the actor may rename or describe a module
    pub fn can_edit_module(&self, module: &Entity) -> bool {
        self.is_admin || module.author == Some(self.user_id)
    }
}
