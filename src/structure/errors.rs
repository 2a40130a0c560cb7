//! # Course Structure Errors
//!
//! Validation failures carry a stable machine-readable code for the REST
//! layer alongside the human-readable message.

use thiserror::Error;

use crate::store::{EntityId, EntityKind, StoreError};

/// Result type for course structure operations
pub type StructureResult<T> = Result<T, StructureError>;

/// Course structure errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    // ==================
    // Validation
    // ==================
    /// Item is not a lesson or module, or a module holds a non-lesson
    #[error("Invalid item type: {0}")]
    InvalidItemType(String),

    /// New lesson with an empty title
    #[error("Some lessons are missing titles.")]
    LessonsMissingTitle,

    /// New module with an empty title
    #[error("Some modules are missing titles.")]
    ModulesMissingTitle,

    /// The same lesson or module id appears more than once
    #[error("The {kind} with id {id} appears more than once.")]
    DuplicateItems { kind: EntityKind, id: EntityId },

    /// Two modules in one submission resolve to the same module
    #[error("The module \"{0}\" appears more than once.")]
    DuplicateModuleTitle(String),

    /// Slug belongs to another teacher's module used in another course
    #[error("The module slug \"{slug}\" is already used by the course \"{course_title}\" of another teacher.")]
    SlugOwnedByAnotherCourse { slug: String, course_title: String },

    /// Slug belongs to another teacher's module
    #[error("The module slug \"{slug}\" belongs to another teacher.")]
    SlugOwnedByAnotherTeacher { slug: String },

    // ==================
    // Lookup
    // ==================
    /// Referenced course, lesson or module does not exist
    #[error("The {kind} with id {id} was not found.")]
    NotFound { kind: EntityKind, id: EntityId },

    // ==================
    // Internal
    // ==================
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StructureError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            StructureError::InvalidItemType(_) => "sensei_course_structure_invalid_item_type",
            StructureError::LessonsMissingTitle => "sensei_course_structure_lessons_missing_title",
            StructureError::ModulesMissingTitle => "sensei_course_structure_modules_missing_title",
            StructureError::DuplicateItems { .. } => "sensei_course_structure_duplicate_items",
            StructureError::DuplicateModuleTitle(_) => {
                "sensei_course_structure_duplicate_module_title"
            }
            StructureError::SlugOwnedByAnotherCourse { .. } => {
                "sensei_course_structure_slug_owned_by_another_course"
            }
            StructureError::SlugOwnedByAnotherTeacher { .. } => {
                "sensei_course_structure_slug_owned_by_another_teacher"
            }
            StructureError::NotFound { .. } => "sensei_course_structure_not_found",
            StructureError::Store(_) | StructureError::Internal(_) => {
                "sensei_course_structure_internal_error"
            }
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            StructureError::InvalidItemType(_)
            | StructureError::LessonsMissingTitle
            | StructureError::ModulesMissingTitle
            | StructureError::DuplicateItems { .. }
            | StructureError::DuplicateModuleTitle(_)
            | StructureError::SlugOwnedByAnotherCourse { .. }
            | StructureError::SlugOwnedByAnotherTeacher { .. } => 400,
            StructureError::NotFound { .. } => 404,
            StructureError::Store(err) => err.status_code(),
            StructureError::Internal(_) => 500,
        }
    }

    /// Whether the submission itself was rejected
    pub fn is_validation_error(&self) -> bool {
        self.status_code() == 400
    }

    pub(crate) fn lookup(err: StoreError, kind: EntityKind, id: EntityId) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::WrongKind { .. } => {
                StructureError::NotFound { kind, id }
            }
            other => StructureError::Store(other),
        }
    }
}
