//! # Course Structure Reconciler
//!
//! Reads a course's ordered tree of lessons and modules, and reconciles a
//! submitted tree against storage.
//!
//! A save runs in two phases. Planning validates the submission and
//! resolves every id and module slug without writing anything. Applying
//! runs inside a store checkpoint: on any failure the checkpoint is rolled
//! back, so a rejected save leaves the stored structure untouched.
//!
//! ## Storage layout
//! - lesson -> course and quiz -> lesson through parent links
//! - lesson module through `_lesson_module` meta
//! - top-level order under `OrderKey::Course`
//! - per-course module lesson order under `OrderKey::ModuleLessons`

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::events::{CourseEvent, EventRecord, EventSink};
use crate::store::{
    require_entity, ContentStore, Entity, EntityId, EntityKind, EntityStatus, NewEntity, OrderKey,
    UserId,
};

use super::errors::{StructureError, StructureResult};
use super::node::{LessonNode, ModuleNode, StructureContext, StructureNode};
use super::slug::{module_slug, normalize_title, slugify};
use super::Actor;

/// Lesson meta holding the id of its module
pub const LESSON_MODULE_META: &str = "_lesson_module";

/// Lesson meta holding the preview flag
pub const LESSON_PREVIEW_META: &str = "_lesson_preview";

/// Lesson meta holding the id of its quiz
pub const LESSON_QUIZ_META: &str = "_lesson_quiz";

enum SlugPlan {
    Custom(String),
    Auto(String),
}

enum ModulePlan {
    Existing(Entity),
    Create {
        title: String,
        slug: SlugPlan,
        description: String,
        owner: Option<UserId>,
    },
}

struct LessonPlan<'a> {
    node: &'a LessonNode,
    existing: Option<Entity>,
}

enum ItemPlan<'a> {
    Lesson(LessonPlan<'a>),
    Module {
        node: &'a ModuleNode,
        module: ModulePlan,
        lessons: Vec<LessonPlan<'a>>,
    },
}

#[derive(Default)]
struct Applied {
    top_order: Vec<EntityId>,
    lessons: HashSet<EntityId>,
    modules: HashSet<EntityId>,
    events: Vec<CourseEvent>,
}

/// Structure of one course
pub struct CourseStructure {
    course_id: EntityId,
    store: Arc<dyn ContentStore>,
    events: Arc<dyn EventSink>,
    save_lock: Arc<Mutex<()>>,
}

impl CourseStructure {
    /// `save_lock` must be shared by every structure writing to `store`,
    /// since a rollback restores the whole content state.
    pub fn new(
        course_id: EntityId,
        store: Arc<dyn ContentStore>,
        events: Arc<dyn EventSink>,
        save_lock: Arc<Mutex<()>>,
    ) -> StructureResult<Self> {
        require_entity(store.as_ref(), course_id, EntityKind::Course)
            .map_err(|err| StructureError::lookup(err, EntityKind::Course, course_id))?;
        Ok(Self {
            course_id,
            store,
            events,
            save_lock,
        })
    }

    pub fn course_id(&self) -> EntityId {
        self.course_id
    }

    // ==================
    // Read
    // ==================

    /// Current structure of the course.
    ///
    /// Lessons linked to the course but missing from any order are appended
    /// to their module, or at the end when they have none.
    pub fn get(&self, context: StructureContext) -> StructureResult<Vec<StructureNode>> {
        let course = self.course_id;
        let linked = self.store.children_of(course, EntityKind::Lesson)?;
        let linked_set: HashSet<EntityId> = linked.iter().copied().collect();
        let mut placed = HashSet::new();
        let mut structure = Vec::new();

        for id in self.store.get_entity_order(OrderKey::Course(course))? {
            let Some(entity) = self.store.get_entity(id)? else {
                continue;
            };
            match entity.kind {
                EntityKind::Lesson => {
                    if !linked_set.contains(&id)
                        || self.lesson_module(id)?.is_some()
                        || !placed.insert(id)
                    {
                        continue;
                    }
                    if let Some(node) = self.lesson_node(&entity, context)? {
                        structure.push(StructureNode::Lesson(node));
                    }
                }
                EntityKind::Module => {
                    let key = OrderKey::ModuleLessons { course, module: id };
                    let mut lessons = Vec::new();
                    for lesson_id in self.store.get_entity_order(key)? {
                        if !linked_set.contains(&lesson_id)
                            || self.lesson_module(lesson_id)? != Some(id)
                            || !placed.insert(lesson_id)
                        {
                            continue;
                        }
                        let Some(lesson) = self.store.get_entity(lesson_id)? else {
                            continue;
                        };
                        if let Some(node) = self.lesson_node(&lesson, context)? {
                            lessons.push(node);
                        }
                    }
                    structure.push(StructureNode::Module(module_node(&entity, lessons)));
                }
                _ => {}
            }
        }

        for id in linked {
            if placed.contains(&id) {
                continue;
            }
            let Some(lesson) = self.store.get_entity(id)? else {
                continue;
            };
            let Some(node) = self.lesson_node(&lesson, context)? else {
                continue;
            };
            let module = self.lesson_module(id)?;
            let target = structure.iter_mut().find_map(|item| match item {
                StructureNode::Module(m) if m.id.is_some() && m.id == module => Some(m),
                _ => None,
            });
            match target {
                Some(module) => module.lessons.push(node),
                None => structure.push(StructureNode::Lesson(node)),
            }
        }

        if context == StructureContext::View {
            structure.retain(|item| match item {
                StructureNode::Module(module) => !module.lessons.is_empty(),
                StructureNode::Lesson(_) => true,
            });
        }
        Ok(structure)
    }

    fn lesson_node(
        &self,
        lesson: &Entity,
        context: StructureContext,
    ) -> StructureResult<Option<LessonNode>> {
        if context == StructureContext::View && !lesson.is_published() {
            return Ok(None);
        }
        let preview = self
            .store
            .get_meta(lesson.id, LESSON_PREVIEW_META)?
            .and_then(|v| v.as_bool());
        Ok(Some(LessonNode {
            id: Some(lesson.id),
            title: lesson.title.clone(),
            preview,
            draft: !lesson.is_published(),
            initial_content: None,
        }))
    }

    fn lesson_module(&self, lesson: EntityId) -> StructureResult<Option<EntityId>> {
        Ok(self
            .store
            .get_meta(lesson, LESSON_MODULE_META)?
            .and_then(|v| v.as_u64()))
    }

    // ==================
    // Save
    // ==================

    /// Validate raw input, then save it
    pub fn save_json(&self, actor: &Actor, input: &Value) -> StructureResult<Vec<StructureNode>> {
        let items = StructureNode::parse_items(input)?;
        self.save(actor, &items)
    }

    /// Replace the course structure with `items`.
    ///
    /// Returns the stored structure as read back in edit context. Lesson
    /// and quiz creation events are emitted only once the save committed.
    pub fn save(&self, actor: &Actor, items: &[StructureNode]) -> StructureResult<Vec<StructureNode>> {
        let _guard = self
            .save_lock
            .lock()
            .map_err(|_| StructureError::Internal("structure save lock poisoned".to_string()))?;

        validate_titles(items)?;
        validate_duplicates(items)?;
        let plan = self.plan(actor, items)?;
        let reserved = reserved_slugs(&plan);

        let checkpoint = self.store.checkpoint()?;
        let applied = match self.apply(actor, plan, &reserved) {
            Ok(applied) => {
                self.store.release(checkpoint)?;
                applied
            }
            Err(err) => {
                warn!(course = self.course_id, error = %err, "course structure save failed, rolling back");
                if let Err(rollback_err) = self.store.rollback(checkpoint) {
                    error!(course = self.course_id, error = %rollback_err, "course structure rollback failed");
                }
                return Err(err);
            }
        };

        for event in &applied.events {
            self.events.emit(&EventRecord::new(event.clone()));
        }
        info!(
            course = self.course_id,
            actor = actor.user_id,
            items = applied.top_order.len(),
            lessons = applied.lessons.len(),
            "course structure saved"
        );

        self.get(StructureContext::Edit)
    }

    fn plan<'a>(&self, actor: &Actor, items: &'a [StructureNode]) -> StructureResult<Vec<ItemPlan<'a>>> {
        let mut modules: HashSet<EntityId> = items
            .iter()
            .filter_map(|item| match item {
                StructureNode::Module(module) => module.id,
                StructureNode::Lesson(_) => None,
            })
            .collect();
        let in_course: HashSet<EntityId> = self
            .store
            .get_entity_order(OrderKey::Course(self.course_id))?
            .into_iter()
            .collect();

        let mut plans = Vec::with_capacity(items.len());
        for item in items {
            match item {
                StructureNode::Lesson(node) => plans.push(ItemPlan::Lesson(self.plan_lesson(node)?)),
                StructureNode::Module(node) => {
                    let module = match node.id {
                        Some(id) => {
                            let existing = self.require(id, EntityKind::Module)?;
                            // Modules already in this course stay, whoever owns them
                            if !actor.may_use_module(&existing) && !in_course.contains(&id) {
                                return Err(self.slug_conflict(&existing.slug, &existing)?);
                            }
                            ModulePlan::Existing(existing)
                        }
                        None => {
                            let plan = self.resolve_new_module(actor, node)?;
                            if let ModulePlan::Existing(existing) = &plan {
                                if !modules.insert(existing.id) {
                                    return Err(StructureError::DuplicateModuleTitle(
                                        node.title.trim().to_string(),
                                    ));
                                }
                            }
                            plan
                        }
                    };
                    let lessons = node
                        .lessons
                        .iter()
                        .map(|lesson| self.plan_lesson(lesson))
                        .collect::<StructureResult<Vec<_>>>()?;
                    plans.push(ItemPlan::Module {
                        node,
                        module,
                        lessons,
                    });
                }
            }
        }
        Ok(plans)
    }

    fn plan_lesson<'a>(&self, node: &'a LessonNode) -> StructureResult<LessonPlan<'a>> {
        let existing = match node.id {
            Some(id) => Some(self.require(id, EntityKind::Lesson)?),
            None => None,
        };
        Ok(LessonPlan { node, existing })
    }

    /// Resolve a module submitted without an id.
    ///
    /// A custom slug is canonicalized, then reuses the module holding it
    /// when the actor may use it; otherwise the actor's own module with the
    /// same title is reused.
    fn resolve_new_module(&self, actor: &Actor, node: &ModuleNode) -> StructureResult<ModulePlan> {
        let title = node.title.trim().to_string();
        let description = node.description.clone().unwrap_or_default();
        let owner = actor.module_owner();

        if let Some(slug) = custom_slug(node) {
            return match self.store.find_by_slug(EntityKind::Module, &slug)? {
                None => Ok(ModulePlan::Create {
                    title,
                    slug: SlugPlan::Custom(slug),
                    description,
                    owner,
                }),
                Some(existing) if actor.may_use_module(&existing) => {
                    debug!(module = existing.id, slug = %slug, "reusing module by slug");
                    Ok(ModulePlan::Existing(existing))
                }
                Some(existing) => Err(self.slug_conflict(&slug, &existing)?),
            };
        }

        let wanted = normalize_title(&title);
        let reusable = self
            .store
            .entities_of_kind(EntityKind::Module)?
            .into_iter()
            .find(|module| module.author == owner && normalize_title(&module.title) == wanted);
        match reusable {
            Some(existing) => {
                debug!(module = existing.id, "reusing module by title");
                Ok(ModulePlan::Existing(existing))
            }
            None => Ok(ModulePlan::Create {
                slug: SlugPlan::Auto(module_slug(&title, owner)),
                title,
                description,
                owner,
            }),
        }
    }

    fn slug_conflict(&self, slug: &str, module: &Entity) -> StructureResult<StructureError> {
        let other_course = self
            .store
            .orders_containing(module.id)?
            .into_iter()
            .find_map(|key| match key {
                OrderKey::Course(course) if course != self.course_id => Some(course),
                _ => None,
            });

        match other_course {
            Some(course) => {
                let course_title = self
                    .store
                    .get_entity(course)?
                    .map(|course| course.title)
                    .unwrap_or_default();
                Ok(StructureError::SlugOwnedByAnotherCourse {
                    slug: slug.to_string(),
                    course_title,
                })
            }
            None => Ok(StructureError::SlugOwnedByAnotherTeacher {
                slug: slug.to_string(),
            }),
        }
    }

    fn apply(
        &self,
        actor: &Actor,
        plan: Vec<ItemPlan<'_>>,
        reserved: &HashSet<String>,
    ) -> StructureResult<Applied> {
        let course = self.course_id;
        let previous = self.store.get_entity_order(OrderKey::Course(course))?;
        let mut applied = Applied::default();

        for item in plan {
            match item {
                ItemPlan::Lesson(lesson) => {
                    let id = self.apply_lesson(actor, lesson, None, &mut applied)?;
                    applied.top_order.push(id);
                }
                ItemPlan::Module {
                    node,
                    module,
                    lessons,
                } => {
                    let module_id = self.apply_module(actor, node, module, reserved)?;
                    let mut lesson_ids = Vec::with_capacity(lessons.len());
                    for lesson in lessons {
                        lesson_ids.push(self.apply_lesson(actor, lesson, Some(module_id), &mut applied)?);
                    }
                    self.store.set_entity_order(
                        OrderKey::ModuleLessons {
                            course,
                            module: module_id,
                        },
                        &lesson_ids,
                    )?;
                    applied.modules.insert(module_id);
                    applied.top_order.push(module_id);
                }
            }
        }

        for id in previous {
            if applied.modules.contains(&id) || applied.lessons.contains(&id) {
                continue;
            }
            let kind = self.store.get_entity(id)?.map(|entity| entity.kind);
            if kind == Some(EntityKind::Module) {
                self.store
                    .clear_entity_order(OrderKey::ModuleLessons { course, module: id })?;
                debug!(course, module = id, "module removed from course");
            }
        }

        for lesson in self.store.children_of(course, EntityKind::Lesson)? {
            if applied.lessons.contains(&lesson) {
                continue;
            }
            self.store.unlink(lesson)?;
            self.store.delete_meta(lesson, LESSON_MODULE_META)?;
            debug!(course, lesson, "lesson removed from course");
        }

        self.store
            .set_entity_order(OrderKey::Course(course), &applied.top_order)?;
        Ok(applied)
    }

    fn apply_module(
        &self,
        actor: &Actor,
        node: &ModuleNode,
        module: ModulePlan,
        reserved: &HashSet<String>,
    ) -> StructureResult<EntityId> {
        match module {
            ModulePlan::Existing(mut existing) => {
                if node.id.is_some() && actor.can_edit_module(&existing) {
                    let mut changed = false;
                    let title = node.title.trim();
                    if !title.is_empty() && title != existing.title {
                        existing.title = title.to_string();
                        changed = true;
                    }
                    if let Some(description) = &node.description {
                        if *description != existing.description {
                            existing.description = description.clone();
                            changed = true;
                        }
                    }
                    if changed {
                        self.store.update_entity(&existing)?;
                    }
                }
                Ok(existing.id)
            }
            ModulePlan::Create {
                title,
                slug,
                description,
                owner,
            } => {
                let slug = match slug {
                    SlugPlan::Custom(slug) => slug,
                    SlugPlan::Auto(base) => self.unique_slug(&base, reserved)?,
                };
                let id = self.store.create_entity(
                    NewEntity::new(EntityKind::Module, title)
                        .with_slug(slug.as_str())
                        .with_author(owner)
                        .with_description(description),
                )?;
                debug!(module = id, slug = %slug, "module created");
                Ok(id)
            }
        }
    }

    fn unique_slug(&self, base: &str, reserved: &HashSet<String>) -> StructureResult<String> {
        let mut candidate = base.to_string();
        let mut suffix = 2;
        while reserved.contains(&candidate)
            || self
                .store
                .find_by_slug(EntityKind::Module, &candidate)?
                .is_some()
        {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        Ok(candidate)
    }

    fn apply_lesson(
        &self,
        actor: &Actor,
        plan: LessonPlan<'_>,
        module: Option<EntityId>,
        applied: &mut Applied,
    ) -> StructureResult<EntityId> {
        let course = self.course_id;
        let node = plan.node;

        let id = match plan.existing {
            Some(mut lesson) => {
                let title = node.title.trim();
                if !title.is_empty() && title != lesson.title {
                    lesson.title = title.to_string();
                    self.store.update_entity(&lesson)?;
                }
                let prior = self.store.parent_of(lesson.id)?;
                if prior != Some(course) {
                    if let Some(prior) = prior {
                        self.detach_from_course(lesson.id, prior)?;
                    }
                    self.store.link_child_to_parent(lesson.id, course)?;
                    debug!(course, lesson = lesson.id, "lesson moved into course");
                }
                lesson.id
            }
            None => {
                let title = node.title.trim();
                let status = if node.draft {
                    EntityStatus::Draft
                } else {
                    EntityStatus::Published
                };
                let lesson = self.store.create_entity(
                    NewEntity::new(EntityKind::Lesson, title)
                        .with_status(status)
                        .with_author(Some(actor.user_id))
                        .with_content(node.initial_content.clone().unwrap_or_default()),
                )?;
                self.store.link_child_to_parent(lesson, course)?;

                let quiz = self.store.create_entity(
                    NewEntity::new(EntityKind::Quiz, title)
                        .with_status(status)
                        .with_author(Some(actor.user_id)),
                )?;
                self.store.link_child_to_parent(quiz, lesson)?;
                self.store.set_meta(lesson, LESSON_QUIZ_META, json!(quiz))?;

                applied.events.push(CourseEvent::LessonCreated { lesson, course });
                applied.events.push(CourseEvent::QuizCreated { quiz, lesson });
                lesson
            }
        };

        match module {
            Some(module) => self.store.set_meta(id, LESSON_MODULE_META, json!(module))?,
            None => self.store.delete_meta(id, LESSON_MODULE_META)?,
        }
        if let Some(preview) = node.preview {
            self.store.set_meta(id, LESSON_PREVIEW_META, json!(preview))?;
        }
        applied.lessons.insert(id);
        Ok(id)
    }

    /// Drop a lesson from every order of its previous course
    fn detach_from_course(&self, lesson: EntityId, prior: EntityId) -> StructureResult<()> {
        for key in self.store.orders_containing(lesson)? {
            if key.course() != prior {
                continue;
            }
            let remaining: Vec<EntityId> = self
                .store
                .get_entity_order(key)?
                .into_iter()
                .filter(|id| *id != lesson)
                .collect();
            self.store.set_entity_order(key, &remaining)?;
        }
        Ok(())
    }

    fn require(&self, id: EntityId, kind: EntityKind) -> StructureResult<Entity> {
        require_entity(self.store.as_ref(), id, kind)
            .map_err(|err| StructureError::lookup(err, kind, id))
    }
}

fn module_node(module: &Entity, lessons: Vec<LessonNode>) -> ModuleNode {
    ModuleNode {
        id: Some(module.id),
        title: module.title.clone(),
        description: Some(module.description.clone()).filter(|d| !d.is_empty()),
        slug: Some(module.slug.clone()).filter(|s| !s.is_empty()),
        lessons,
    }
}

/// Canonical form of a module's custom slug; `None` when nothing usable remains
fn custom_slug(module: &ModuleNode) -> Option<String> {
    module
        .slug
        .as_deref()
        .map(slugify)
        .filter(|slug| !slug.is_empty())
}

fn validate_lesson_title(lesson: &LessonNode) -> StructureResult<()> {
    if lesson.id.is_none() && lesson.title.trim().is_empty() {
        return Err(StructureError::LessonsMissingTitle);
    }
    Ok(())
}

fn validate_titles(items: &[StructureNode]) -> StructureResult<()> {
    for item in items {
        match item {
            StructureNode::Lesson(lesson) => validate_lesson_title(lesson)?,
            StructureNode::Module(module) => {
                if module.id.is_none() && module.title.trim().is_empty() {
                    return Err(StructureError::ModulesMissingTitle);
                }
                for lesson in &module.lessons {
                    validate_lesson_title(lesson)?;
                }
            }
        }
    }
    Ok(())
}

fn validate_duplicates(items: &[StructureNode]) -> StructureResult<()> {
    let mut lessons = HashSet::new();
    let mut modules = HashSet::new();
    let mut new_modules = HashSet::new();

    let mut check_lesson = |lesson: &LessonNode| match lesson.id {
        Some(id) if !lessons.insert(id) => Err(StructureError::DuplicateItems {
            kind: EntityKind::Lesson,
            id,
        }),
        _ => Ok(()),
    };

    for item in items {
        match item {
            StructureNode::Lesson(lesson) => check_lesson(lesson)?,
            StructureNode::Module(module) => {
                match module.id {
                    Some(id) => {
                        if !modules.insert(id) {
                            return Err(StructureError::DuplicateItems {
                                kind: EntityKind::Module,
                                id,
                            });
                        }
                    }
                    None => {
                        let identity = match custom_slug(module) {
                            Some(slug) => format!("slug:{}", slug),
                            None => format!("title:{}", normalize_title(&module.title)),
                        };
                        if !new_modules.insert(identity) {
                            return Err(StructureError::DuplicateModuleTitle(
                                module.title.trim().to_string(),
                            ));
                        }
                    }
                }
                for lesson in &module.lessons {
                    check_lesson(lesson)?;
                }
            }
        }
    }
    Ok(())
}

fn reserved_slugs(plan: &[ItemPlan<'_>]) -> HashSet<String> {
    plan.iter()
        .filter_map(|item| match item {
            ItemPlan::Module {
                module:
                    ModulePlan::Create {
                        slug: SlugPlan::Custom(slug),
                        ..
                    },
                ..
            } => Some(slug.clone()),
            _ => None,
        })
        .collect()
}
