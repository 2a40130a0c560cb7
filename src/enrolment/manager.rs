//! # Enrolment Manager
//!
//! Application-wide coordinator: owns the provider registries, the site
//! salt, the manual provider and the per-course evaluator instances.
//!
//! ## Invariants
//! - One `CourseEnrolment` / `CourseAccess` instance per course
//! - The manual provider is always the first enrolment provider
//! - An enrolment-changed event follows every transition of a persisted
//!   enrolment decision

use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;
use crate::events::EventSink;
use crate::store::{
    require_entity, ContentStore, EntityId, EntityKind, LearnerStore, OptionStore, StoreError,
    UserId,
};

use super::course::{CourseAccess, CourseEnrolment};
use super::errors::{EnrolmentError, EnrolmentResult};
use super::evaluator::{CourseEvaluator, EvaluatorKind};
use super::instances::InstanceCache;
use super::manual::ManualEnrolmentProvider;
use super::provider::Provider;
use super::registry::{ProviderList, ProviderRegistry};
use super::salt::SiteSalt;

/// Enrolment coordinator
pub struct EnrolmentManager {
    content: Arc<dyn ContentStore>,
    learners: Arc<dyn LearnerStore>,
    salt: Arc<SiteSalt>,
    enrolment_registry: Arc<ProviderRegistry>,
    access_registry: Arc<ProviderRegistry>,
    manual: Arc<ManualEnrolmentProvider>,
    enrolments: InstanceCache<CourseEnrolment>,
    access: InstanceCache<CourseAccess>,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl EnrolmentManager {
    pub fn new(
        content: Arc<dyn ContentStore>,
        learners: Arc<dyn LearnerStore>,
        options: Arc<dyn OptionStore>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> EnrolmentResult<Self> {
        let salt = Arc::new(SiteSalt::new(options.clone(), config.site_salt_option.clone()));
        let manual = Arc::new(ManualEnrolmentProvider::new(
            learners.clone(),
            options,
            &config,
        ));

        let enrolment_registry = Arc::new(ProviderRegistry::new());
        enrolment_registry.register_provider(manual.clone())?;

        Ok(Self {
            content,
            learners,
            salt,
            enrolment_registry,
            access_registry: Arc::new(ProviderRegistry::new()),
            manual,
            enrolments: InstanceCache::new(),
            access: InstanceCache::new(),
            events,
            config,
        })
    }

    // ==================
    // Site salt
    // ==================

    /// Current site salt, generated on first use
    pub fn get_site_salt(&self) -> EnrolmentResult<String> {
        self.salt.get()
    }

    /// Replace the site salt, invalidating every cached envelope
    pub fn reset_site_salt(&self) -> EnrolmentResult<String> {
        let salt = self.salt.reset()?;
        info!("all cached enrolment and access results invalidated");
        Ok(salt)
    }

    // ==================
    // Providers
    // ==================

    pub fn enrolment_registry(&self) -> &Arc<ProviderRegistry> {
        &self.enrolment_registry
    }

    pub fn access_registry(&self) -> &Arc<ProviderRegistry> {
        &self.access_registry
    }

    pub fn register_enrolment_provider(&self, provider: Arc<dyn Provider>) -> EnrolmentResult<()> {
        self.enrolment_registry.register_provider(provider)
    }

    pub fn register_access_provider(&self, provider: Arc<dyn Provider>) -> EnrolmentResult<()> {
        self.access_registry.register_provider(provider)
    }

    /// Enrolment provider by id; `None` when never registered
    pub fn get_enrolment_provider_by_id(
        &self,
        id: &str,
    ) -> EnrolmentResult<Option<Arc<dyn Provider>>> {
        self.enrolment_registry.get_provider_by_id(id)
    }

    pub fn get_all_enrolment_providers(&self) -> EnrolmentResult<ProviderList> {
        self.enrolment_registry.get_providers()
    }

    pub fn manual_provider(&self) -> &Arc<ManualEnrolmentProvider> {
        &self.manual
    }

    // ==================
    // Per-course instances
    // ==================

    /// Enrolment evaluator of a course
    pub fn course_enrolment(&self, course: EntityId) -> EnrolmentResult<Arc<CourseEnrolment>> {
        self.require_course(course)?;
        self.enrolments.get_or_insert_with(course, || {
            CourseEnrolment::new(
                self.evaluator(course, EvaluatorKind::Enrolment),
                self.events.clone(),
            )
        })
    }

    /// Access evaluator of a course
    pub fn course_access(&self, course: EntityId) -> EnrolmentResult<Arc<CourseAccess>> {
        self.require_course(course)?;
        self.access.get_or_insert_with(course, || {
            CourseAccess::new(self.evaluator(course, EvaluatorKind::Access))
        })
    }

    /// Drop every per-course instance and every cached provider list
    pub fn reset_instances(&self) -> EnrolmentResult<()> {
        self.enrolments.reset()?;
        self.access.reset()?;
        self.enrolment_registry.reset()?;
        self.access_registry.reset()
    }

    // ==================
    // Decisions
    // ==================

    pub fn is_enrolled(&self, learner: UserId, course: EntityId) -> EnrolmentResult<bool> {
        self.course_enrolment(course)?.is_enrolled(learner, true)
    }

    pub fn has_access(&self, learner: UserId, course: EntityId) -> EnrolmentResult<bool> {
        self.course_access(course)?.has_access(learner, true)
    }

    /// Re-evaluate one pair after an event that may have changed it.
    ///
    /// Only this learner's envelopes for this course are replaced. The
    /// enrolment decision is read, recomputed and stored under the learner's
    /// lock, so concurrent triggers report each transition once.
    pub fn trigger_course_enrolment_check(
        &self,
        learner: UserId,
        course: EntityId,
    ) -> EnrolmentResult<bool> {
        let current = self.course_enrolment(course)?.trigger_recheck(learner)?;
        self.course_access(course)?.trigger_recheck(learner)?;
        Ok(current)
    }

    /// Manually enrol a learner and re-evaluate
    pub fn enrol_student(&self, learner: UserId, course: EntityId) -> EnrolmentResult<bool> {
        self.require_course(course)?;
        self.manual.enrol_student(learner, course)?;
        self.trigger_course_enrolment_check(learner, course)
    }

    /// Manually withdraw a learner and re-evaluate.
    ///
    /// The learner may stay enrolled through another provider.
    pub fn withdraw_student(&self, learner: UserId, course: EntityId) -> EnrolmentResult<bool> {
        self.require_course(course)?;
        self.manual.withdraw_student(learner, course)?;
        self.trigger_course_enrolment_check(learner, course)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn evaluator(&self, course: EntityId, kind: EvaluatorKind) -> CourseEvaluator {
        let registry = match kind {
            EvaluatorKind::Enrolment => self.enrolment_registry.clone(),
            EvaluatorKind::Access => self.access_registry.clone(),
        };
        CourseEvaluator::new(
            course,
            kind,
            registry,
            self.learners.clone(),
            self.salt.clone(),
            &self.config,
        )
    }

    fn require_course(&self, course: EntityId) -> EnrolmentResult<()> {
        match require_entity(self.content.as_ref(), course, EntityKind::Course) {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(_)) | Err(StoreError::WrongKind { .. }) => {
                Err(EnrolmentError::CourseNotFound(course))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrolment::provider::StaticProvider;
    use crate::events::{CourseEvent, MemoryEventSink};
    use crate::store::{InMemoryStore, NewEntity};

    fn manager() -> (Arc<InMemoryStore>, MemoryEventSink, EnrolmentManager, EntityId) {
        let store = Arc::new(InMemoryStore::new());
        let events = MemoryEventSink::new();
        let manager = EnrolmentManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(events.clone()),
            EngineConfig::default(),
        )
        .unwrap();
        let course = store
            .create_entity(NewEntity::new(EntityKind::Course, "Course"))
            .unwrap();
        (store, events, manager, course)
    }

    #[test]
    fn test_manual_provider_registered_first() {
        let (_, _, manager, _) = manager();
        manager
            .register_enrolment_provider(Arc::new(StaticProvider::new("payments", false)))
            .unwrap();

        let providers = manager.get_all_enrolment_providers().unwrap();
        assert_eq!(providers[0].id(), "manual");
        assert_eq!(providers[1].id(), "payments");
        assert!(manager.get_enrolment_provider_by_id("nope").unwrap().is_none());
    }

    #[test]
    fn test_instances_are_shared() {
        let (_, _, manager, course) = manager();
        let a = manager.course_enrolment(course).unwrap();
        let b = manager.course_enrolment(course).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        manager.reset_instances().unwrap();
        let c = manager.course_enrolment(course).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_unknown_course() {
        let (store, _, manager, _) = manager();
        let lesson = store
            .create_entity(NewEntity::new(EntityKind::Lesson, "Lesson"))
            .unwrap();

        assert!(matches!(
            manager.is_enrolled(1, 999),
            Err(EnrolmentError::CourseNotFound(999))
        ));
        assert!(matches!(
            manager.course_access(lesson),
            Err(EnrolmentError::CourseNotFound(_))
        ));
    }

    #[test]
    fn test_enrol_emits_change_once() {
        let (_, events, manager, course) = manager();

        assert!(manager.enrol_student(4, course).unwrap());
        assert!(manager.enrol_student(4, course).unwrap());
        assert_eq!(
            events.events(),
            vec![CourseEvent::EnrolmentChanged {
                learner: 4,
                course,
                is_enrolled: true
            }]
        );

        assert!(!manager.withdraw_student(4, course).unwrap());
        assert_eq!(events.len(), 2);
        assert!(!manager.is_enrolled(4, course).unwrap());
    }

    #[test]
    fn test_withdraw_keeps_other_provider_enrolment() {
        let (_, events, manager, course) = manager();
        manager
            .register_enrolment_provider(Arc::new(StaticProvider::new("payments", true)))
            .unwrap();

        assert!(manager.enrol_student(4, course).unwrap());
        assert!(manager.withdraw_student(4, course).unwrap());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_salt_reset_changes_version() {
        let (_, _, manager, course) = manager();
        let enrolment = manager.course_enrolment(course).unwrap();
        let before = enrolment.current_version().unwrap();
        let salt = manager.get_site_salt().unwrap();

        let reset = manager.reset_site_salt().unwrap();
        assert_ne!(salt, reset);
        assert_ne!(before, enrolment.current_version().unwrap());
    }

    #[test]
    fn test_salt_reset_flip_emits_change() {
        let (_, events, manager, course) = manager();
        let payments = Arc::new(StaticProvider::new("payments", true));
        manager.register_enrolment_provider(payments.clone()).unwrap();

        assert!(manager.is_enrolled(4, course).unwrap());
        payments.set_decision(4, false);
        manager.reset_site_salt().unwrap();
        assert!(!manager.is_enrolled(4, course).unwrap());

        assert_eq!(
            events.events(),
            vec![
                CourseEvent::EnrolmentChanged { learner: 4, course, is_enrolled: true },
                CourseEvent::EnrolmentChanged { learner: 4, course, is_enrolled: false },
            ]
        );
    }

    #[test]
    fn test_first_payment_grant_emits_change() {
        let (_, events, manager, course) = manager();
        let payments = Arc::new(StaticProvider::new("payments", false));
        manager.register_enrolment_provider(payments.clone()).unwrap();

        assert!(!manager.is_enrolled(4, course).unwrap());
        assert!(events.is_empty());

        payments.set_decision(4, true);
        payments.set_version("2");
        assert!(manager.is_enrolled(4, course).unwrap());
        assert!(manager.is_enrolled(4, course).unwrap());
        assert_eq!(
            events.events(),
            vec![CourseEvent::EnrolmentChanged { learner: 4, course, is_enrolled: true }]
        );
    }

    #[test]
    fn test_concurrent_triggers_emit_once() {
        let (_, events, manager, course) = manager();
        let manager = Arc::new(manager);
        manager.manual_provider().enrol_student(4, course).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.trigger_course_enrolment_check(4, course).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert_eq!(events.len(), 1);
    }
}
