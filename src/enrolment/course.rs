//! # Course Enrolment and Course Access
//!
//! Per-course façades over `CourseEvaluator`. Both are handed out by the
//! enrolment manager, one instance per course.
//!
//! Any recompute that moves a learner's persisted enrolment decision emits
//! `EnrolmentChanged`, whichever path triggered it.

use std::sync::Arc;

use tracing::info;

use super::errors::EnrolmentResult;
use super::evaluator::{CourseEvaluator, Evaluation, EvaluatorKind};
use super::results::ProviderResults;
use crate::events::{CourseEvent, EventRecord, EventSink};
use crate::store::{EntityId, UserId};

/// Enrolment decisions for one course
pub struct CourseEnrolment {
    evaluator: CourseEvaluator,
    events: Arc<dyn EventSink>,
}

impl CourseEnrolment {
    pub(crate) fn new(evaluator: CourseEvaluator, events: Arc<dyn EventSink>) -> Self {
        debug_assert_eq!(evaluator.kind(), EvaluatorKind::Enrolment);
        Self { evaluator, events }
    }

    pub fn course_id(&self) -> EntityId {
        self.evaluator.course_id()
    }

    /// Whether the learner is enrolled
    pub fn is_enrolled(&self, learner: UserId, use_cache: bool) -> EnrolmentResult<bool> {
        let evaluation = self.evaluator.evaluate_tracked(learner, use_cache)?;
        Ok(self.notify(learner, evaluation))
    }

    /// Recompute the learner's decision now, replacing any cached one
    pub fn trigger_recheck(&self, learner: UserId) -> EnrolmentResult<bool> {
        let evaluation = self.evaluator.recheck(learner)?;
        Ok(self.notify(learner, evaluation))
    }

    /// Last stored envelope for the learner
    pub fn get_enrolment_check_results(
        &self,
        learner: UserId,
    ) -> EnrolmentResult<Option<ProviderResults>> {
        self.evaluator.get_results(learner)
    }

    /// Decision from a still-valid envelope, if any
    pub fn cached_decision(&self, learner: UserId) -> EnrolmentResult<Option<bool>> {
        self.evaluator.cached_decision(learner)
    }

    pub fn current_version(&self) -> EnrolmentResult<String> {
        self.evaluator.current_version()
    }

    fn notify(&self, learner: UserId, evaluation: Evaluation) -> bool {
        if evaluation.changed() {
            let course = self.course_id();
            info!(learner, course, is_enrolled = evaluation.granted, "enrolment status changed");
            self.events.emit(&EventRecord::new(CourseEvent::EnrolmentChanged {
                learner,
                course,
                is_enrolled: evaluation.granted,
            }));
        }
        evaluation.granted
    }
}

/// Content access decisions for one course
pub struct CourseAccess {
    evaluator: CourseEvaluator,
}

impl CourseAccess {
    pub(crate) fn new(evaluator: CourseEvaluator) -> Self {
        debug_assert_eq!(evaluator.kind(), EvaluatorKind::Access);
        Self { evaluator }
    }

    pub fn course_id(&self) -> EntityId {
        self.evaluator.course_id()
    }

    /// Whether the learner may access the course content
    pub fn has_access(&self, learner: UserId, use_cache: bool) -> EnrolmentResult<bool> {
        self.evaluator.evaluate(learner, use_cache)
    }

    pub fn trigger_recheck(&self, learner: UserId) -> EnrolmentResult<bool> {
        self.evaluator.invalidate(learner)
    }

    /// Last stored access log for the learner
    pub fn get_access_log(&self, learner: UserId) -> EnrolmentResult<Option<ProviderResults>> {
        self.evaluator.get_results(learner)
    }
}
