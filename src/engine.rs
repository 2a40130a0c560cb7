//! # Engine Context
//!
//! Explicit owner of the stores, event sink, configuration and enrolment
//! manager. Hand one engine to every caller instead of reaching for
//! process-wide state.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::EngineConfig;
use crate::enrolment::{EnrolmentManager, EnrolmentResult};
use crate::events::{EventSink, TracingEventSink};
use crate::store::{ContentStore, EntityId, InMemoryStore, LearnerStore, OptionStore};
use crate::structure::{CourseStructure, StructureResult};

/// Wired course engine
pub struct CourseEngine {
    content: Arc<dyn ContentStore>,
    learners: Arc<dyn LearnerStore>,
    options: Arc<dyn OptionStore>,
    events: Arc<dyn EventSink>,
    enrolment: EnrolmentManager,
    structure_lock: Arc<Mutex<()>>,
    config: EngineConfig,
}

impl CourseEngine {
    pub fn new(
        content: Arc<dyn ContentStore>,
        learners: Arc<dyn LearnerStore>,
        options: Arc<dyn OptionStore>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> EnrolmentResult<Self> {
        let enrolment = EnrolmentManager::new(
            content.clone(),
            learners.clone(),
            options.clone(),
            events.clone(),
            config.clone(),
        )?;
        info!(
            results_ttl_secs = ?config.results_ttl_secs,
            legacy_migration = config.legacy_enrolment_migration,
            "course engine initialized"
        );
        Ok(Self {
            content,
            learners,
            options,
            events,
            enrolment,
            structure_lock: Arc::new(Mutex::new(())),
            config,
        })
    }

    /// Engine over one in-memory store, logging events through tracing
    pub fn in_memory(config: EngineConfig) -> EnrolmentResult<Self> {
        let store = Arc::new(InMemoryStore::new());
        Self::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(TracingEventSink),
            config,
        )
    }

    pub fn enrolment(&self) -> &EnrolmentManager {
        &self.enrolment
    }

    /// Structure reconciler of a course; saves through any of them are
    /// serialized
    pub fn course_structure(&self, course: EntityId) -> StructureResult<CourseStructure> {
        CourseStructure::new(
            course,
            self.content.clone(),
            self.events.clone(),
            self.structure_lock.clone(),
        )
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn learners(&self) -> &Arc<dyn LearnerStore> {
        &self.learners
    }

    pub fn options(&self) -> &Arc<dyn OptionStore> {
        &self.options
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityKind, NewEntity};
    use crate::structure::{Actor, StructureContext, StructureNode};

    #[test]
    fn test_in_memory_engine_is_wired() {
        let engine = CourseEngine::in_memory(EngineConfig::default()).unwrap();
        let course = engine
            .content()
            .create_entity(NewEntity::new(EntityKind::Course, "Course"))
            .unwrap();

        assert!(!engine.enrolment().is_enrolled(1, course).unwrap());
        assert!(engine.enrolment().enrol_student(1, course).unwrap());

        let structure = engine.course_structure(course).unwrap();
        structure
            .save(&Actor::teacher(2), &[StructureNode::lesson("Welcome")])
            .unwrap();
        assert_eq!(structure.get(StructureContext::View).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_course_structure() {
        let engine = CourseEngine::in_memory(EngineConfig::default()).unwrap();
        assert!(engine.course_structure(99).is_err());
    }
}
