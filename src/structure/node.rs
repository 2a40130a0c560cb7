//! # Structure Nodes
//!
//! Wire shape of a course structure: an ordered list mixing lessons and
//! modules, where a module holds lessons only.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::store::EntityId;

use super::errors::{StructureError, StructureResult};

/// Which lessons a read includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureContext {
    /// Published lessons only; modules without any are hidden
    View,
    /// Drafts included
    Edit,
}

impl StructureContext {
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "view" => Some(StructureContext::View),
            "edit" => Some(StructureContext::Edit),
            _ => None,
        }
    }
}

/// One item of a course structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StructureNode {
    Lesson(LessonNode),
    Module(ModuleNode),
}

impl StructureNode {
    /// Lesson node with a title only
    pub fn lesson(title: impl Into<String>) -> Self {
        StructureNode::Lesson(LessonNode::new(title))
    }

    /// Module node with a title and lessons
    pub fn module(title: impl Into<String>, lessons: Vec<LessonNode>) -> Self {
        StructureNode::Module(ModuleNode::new(title, lessons))
    }

    pub fn id(&self) -> Option<EntityId> {
        match self {
            StructureNode::Lesson(lesson) => lesson.id,
            StructureNode::Module(module) => module.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            StructureNode::Lesson(lesson) => &lesson.title,
            StructureNode::Module(module) => &module.title,
        }
    }

    /// Validate the shape of raw input and decode it.
    ///
    /// Every item must be an object typed `lesson` or `module`; a module
    /// must carry a `lessons` array made of lessons only.
    pub fn parse_items(input: &Value) -> StructureResult<Vec<StructureNode>> {
        let items = input
            .as_array()
            .ok_or_else(|| StructureError::InvalidItemType("structure must be a list".to_string()))?;

        for item in items {
            match item_type(item)? {
                "lesson" => {}
                "module" => {
                    let lessons = item
                        .get("lessons")
                        .and_then(Value::as_array)
                        .ok_or_else(|| {
                            StructureError::InvalidItemType(
                                "module is missing its lessons".to_string(),
                            )
                        })?;
                    for lesson in lessons {
                        let kind = item_type(lesson)?;
                        if kind != "lesson" {
                            return Err(StructureError::InvalidItemType(format!(
                                "module can only contain lessons, found {}",
                                kind
                            )));
                        }
                    }
                }
                other => return Err(StructureError::InvalidItemType(other.to_string())),
            }
        }

        serde_json::from_value(input.clone())
            .map_err(|err| StructureError::InvalidItemType(err.to_string()))
    }
}

fn item_type(item: &Value) -> StructureResult<&str> {
    item.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| StructureError::InvalidItemType("item has no type".to_string()))
}

/// Lesson item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<bool>,

    /// Status of a new lesson; read-only for existing ones
    #[serde(default)]
    pub draft: bool,

    /// Content copied into a new lesson only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_content: Option<String>,
}

impl LessonNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn existing(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.initial_content = Some(content.into());
        self
    }

    pub fn as_draft(mut self) -> Self {
        self.draft = true;
        self
    }
}

/// Module item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Custom slug; derived from the title when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(default, serialize_with = "serialize_lessons")]
    pub lessons: Vec<LessonNode>,
}

/// Module lessons carry their `type` tag like top-level items
fn serialize_lessons<S: Serializer>(lessons: &[LessonNode], serializer: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    #[serde(tag = "type", rename_all = "lowercase")]
    enum Tagged<'a> {
        Lesson(&'a LessonNode),
    }
    serializer.collect_seq(lessons.iter().map(Tagged::Lesson))
}

impl ModuleNode {
    pub fn new(title: impl Into<String>, lessons: Vec<LessonNode>) -> Self {
        Self {
            title: title.into(),
            lessons,
            ..Default::default()
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }
}
