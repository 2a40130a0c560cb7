//! # Content Entities
//!
//! Courses, lessons, quizzes and modules share one id space. Modules carry a
//! slug and an optional owner; a module without an owner is site-wide.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of any stored entity
pub type EntityId = u64;

/// Identifier of a site user (learner, teacher or admin)
pub type UserId = u64;

/// Entity type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Course,
    Lesson,
    Quiz,
    Module,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Course => "course",
            EntityKind::Lesson => "lesson",
            EntityKind::Quiz => "quiz",
            EntityKind::Module => "module",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Published,
    Draft,
}

/// A stored entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub title: String,
    pub status: EntityStatus,

    /// Course/lesson author, or module owner (`None` for site-wide modules)
    pub author: Option<UserId>,

    /// Module slug; empty for other kinds
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,

    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn is_published(&self) -> bool {
        self.status == EntityStatus::Published
    }
}

/// Fields for a new entity; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub kind: EntityKind,
    pub title: String,
    pub status: EntityStatus,
    pub author: Option<UserId>,
    pub slug: String,
    pub description: String,
    pub content: String,
}

impl NewEntity {
    pub fn new(kind: EntityKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            status: EntityStatus::Published,
            author: None,
            slug: String::new(),
            description: String::new(),
            content: String::new(),
        }
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_author(mut self, author: Option<UserId>) -> Self {
        self.author = author;
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub(crate) fn into_entity(self, id: EntityId) -> Entity {
        Entity {
            id,
            kind: self.kind,
            title: self.title,
            status: self.status,
            author: self.author,
            slug: self.slug,
            description: self.description,
            content: self.content,
            created_at: Utc::now(),
        }
    }
}

/// Key of an explicitly ordered child list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderKey {
    /// Top-level items of a course (lessons and modules mixed)
    Course(EntityId),

    /// Lessons of a module within one course
    ModuleLessons { course: EntityId, module: EntityId },
}

impl OrderKey {
    pub fn course(&self) -> EntityId {
        match self {
            OrderKey::Course(course) => *course,
            OrderKey::ModuleLessons { course, .. } => *course,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_builder() {
        let entity = NewEntity::new(EntityKind::Module, "Intro")
            .with_author(Some(4))
            .with_slug("4-intro")
            .into_entity(12);

        assert_eq!(entity.id, 12);
        assert_eq!(entity.kind, EntityKind::Module);
        assert_eq!(entity.slug, "4-intro");
        assert_eq!(entity.author, Some(4));
        assert!(entity.is_published());
    }

    #[test]
    fn test_order_key_course() {
        assert_eq!(OrderKey::Course(3).course(), 3);
        assert_eq!(OrderKey::ModuleLessons { course: 5, module: 9 }.course(), 5);
    }
}
