//! # Course Evaluator
//!
//! Shared decision pipeline behind course enrolment and course access.
//!
//! For a (learner, course) pair the evaluator is either *uncomputed* (no
//! envelope, or a stale one) or *computed* (a valid envelope exists and the
//! decision is read from it without consulting providers).
//!
//! ## Invariants
//! - Providers run in registry order; a provider not handling the course
//!   abstains (`null`)
//! - Decision is true iff at least one non-abstaining provider granted
//! - A failing provider is logged and recorded as an abstention
//! - Read-compute-write of one learner's envelope is mutually exclusive

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::store::{EntityId, LearnerStore, UserId};

use super::errors::{EnrolmentError, EnrolmentResult};
use super::locks::KeyedLocks;
use super::registry::ProviderRegistry;
use super::results::ProviderResults;
use super::salt::{aggregate_version, SiteSalt};

/// Which decision an evaluator makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluatorKind {
    Enrolment,
    Access,
}

impl EvaluatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorKind::Enrolment => "enrolment",
            EvaluatorKind::Access => "access",
        }
    }

    fn meta_suffix(&self) -> &'static str {
        match self {
            EvaluatorKind::Enrolment => "enrolment_results",
            EvaluatorKind::Access => "access_log",
        }
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub granted: bool,
    /// Decision of the envelope found before evaluating, valid or not
    pub previous: Option<bool>,
    /// Providers ran and the envelope was replaced
    pub recomputed: bool,
}

impl Evaluation {
    /// A recompute moved the persisted decision; no envelope counts as not granted
    pub fn changed(&self) -> bool {
        self.recomputed && self.previous.unwrap_or(false) != self.granted
    }
}

/// Evaluator for one course and one decision kind
pub struct CourseEvaluator {
    course_id: EntityId,
    kind: EvaluatorKind,
    registry: Arc<ProviderRegistry>,
    learners: Arc<dyn LearnerStore>,
    salt: Arc<SiteSalt>,
    meta_key: String,
    ttl: Option<Duration>,
    locks: KeyedLocks,
}

impl CourseEvaluator {
    pub fn new(
        course_id: EntityId,
        kind: EvaluatorKind,
        registry: Arc<ProviderRegistry>,
        learners: Arc<dyn LearnerStore>,
        salt: Arc<SiteSalt>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            course_id,
            kind,
            registry,
            learners,
            salt,
            meta_key: format!("{}{}", config.results_meta_prefix, kind.meta_suffix()),
            ttl: config.results_ttl(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn course_id(&self) -> EntityId {
        self.course_id
    }

    pub fn kind(&self) -> EvaluatorKind {
        self.kind
    }

    /// Aggregate version envelopes must carry to be reusable
    pub fn current_version(&self) -> EnrolmentResult<String> {
        let salt = self.salt.get()?;
        let fingerprint = self.registry.version_fingerprint()?;
        Ok(aggregate_version(&salt, &fingerprint))
    }

    /// Decide for a learner, reusing a valid envelope when `use_cache`
    pub fn evaluate(&self, learner: UserId, use_cache: bool) -> EnrolmentResult<bool> {
        Ok(self.evaluate_tracked(learner, use_cache)?.granted)
    }

    /// Like `evaluate`, also reporting the decision the stored envelope held
    pub fn evaluate_tracked(&self, learner: UserId, use_cache: bool) -> EnrolmentResult<Evaluation> {
        let lock = self.locks.lock_for(learner)?;
        let _guard = lock.lock().map_err(|_| EnrolmentError::poisoned())?;
        self.evaluate_locked(learner, use_cache)
    }

    /// Discard and recompute the learner's envelope in one critical section
    pub fn recheck(&self, learner: UserId) -> EnrolmentResult<Evaluation> {
        let lock = self.locks.lock_for(learner)?;
        let _guard = lock.lock().map_err(|_| EnrolmentError::poisoned())?;
        debug!(kind = self.kind.as_str(), course = self.course_id, learner, "rechecking provider results");
        self.evaluate_locked(learner, false)
    }

    fn evaluate_locked(&self, learner: UserId, use_cache: bool) -> EnrolmentResult<Evaluation> {
        let version = self.current_version()?;
        let stored = self.get_results(learner)?;
        let previous = stored.as_ref().map(ProviderResults::is_granted);

        if use_cache {
            if let Some(results) = stored.filter(|r| r.is_valid(&version, Utc::now(), self.ttl)) {
                debug!(
                    kind = self.kind.as_str(),
                    course = self.course_id,
                    learner,
                    "reusing cached provider results"
                );
                return Ok(Evaluation {
                    granted: results.is_granted(),
                    previous,
                    recomputed: false,
                });
            }
        }

        let results = self.compute(learner, version)?;
        self.learners
            .set_learner_meta(learner, self.course_id, &self.meta_key, results.to_value())?;
        Ok(Evaluation {
            granted: results.is_granted(),
            previous,
            recomputed: true,
        })
    }

    /// Stored envelope regardless of validity
    pub fn get_results(&self, learner: UserId) -> EnrolmentResult<Option<ProviderResults>> {
        Ok(self
            .learners
            .get_learner_meta(learner, self.course_id, &self.meta_key)?
            .and_then(ProviderResults::from_value))
    }

    /// Decision from a still-valid envelope, without running providers
    pub fn cached_decision(&self, learner: UserId) -> EnrolmentResult<Option<bool>> {
        let version = self.current_version()?;
        Ok(self
            .get_results(learner)?
            .filter(|r| r.is_valid(&version, Utc::now(), self.ttl))
            .map(|r| r.is_granted()))
    }

    /// Discard the learner's envelope; returns whether one existed
    pub fn invalidate(&self, learner: UserId) -> EnrolmentResult<bool> {
        let lock = self.locks.lock_for(learner)?;
        let _guard = lock.lock().map_err(|_| EnrolmentError::poisoned())?;
        debug!(kind = self.kind.as_str(), course = self.course_id, learner, "discarding provider results");
        Ok(self
            .learners
            .delete_learner_meta(learner, self.course_id, &self.meta_key)?)
    }

    fn compute(&self, learner: UserId, version: String) -> EnrolmentResult<ProviderResults> {
        let providers = self.registry.get_providers()?;
        let mut results = BTreeMap::new();

        for provider in providers.iter() {
            let decision = if !provider.handles(self.course_id) {
                None
            } else {
                match provider.decide(learner, self.course_id) {
                    Ok(decision) => Some(decision),
                    Err(err) => {
                        warn!(
                            kind = self.kind.as_str(),
                            course = self.course_id,
                            learner,
                            provider = provider.id(),
                            error = %err,
                            "provider failed, treating as abstained"
                        );
                        None
                    }
                }
            };
            results.insert(provider.id().to_string(), decision);
        }

        debug!(
            kind = self.kind.as_str(),
            course = self.course_id,
            learner,
            providers = providers.len(),
            "computed provider results"
        );
        Ok(ProviderResults::new(results, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrolment::provider::StaticProvider;
    use crate::store::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        registry: Arc<ProviderRegistry>,
        salt: Arc<SiteSalt>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            Self {
                registry: Arc::new(ProviderRegistry::new()),
                salt: Arc::new(SiteSalt::new(store.clone(), "salt")),
                store,
            }
        }

        fn evaluator(&self, course: EntityId, config: &EngineConfig) -> CourseEvaluator {
            CourseEvaluator::new(
                course,
                EvaluatorKind::Enrolment,
                self.registry.clone(),
                self.store.clone(),
                self.salt.clone(),
                config,
            )
        }

        fn provider(&self, id: &str, default: bool) -> Arc<StaticProvider> {
            let provider = Arc::new(StaticProvider::new(id, default));
            self.registry.register_provider(provider.clone()).unwrap();
            provider
        }
    }

    #[test]
    fn test_no_providers_means_no() {
        let fixture = Fixture::new();
        let evaluator = fixture.evaluator(1, &EngineConfig::default());
        assert!(!evaluator.evaluate(5, true).unwrap());
    }

    #[test]
    fn test_cache_avoids_provider_calls() {
        let fixture = Fixture::new();
        let provider = fixture.provider("manual", true);
        let evaluator = fixture.evaluator(1, &EngineConfig::default());

        assert!(evaluator.evaluate(5, true).unwrap());
        assert!(evaluator.evaluate(5, true).unwrap());
        assert_eq!(provider.calls(), 1);

        assert!(evaluator.evaluate(5, false).unwrap());
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_provider_version_bump_invalidates() {
        let fixture = Fixture::new();
        let provider = fixture.provider("manual", true);
        let evaluator = fixture.evaluator(1, &EngineConfig::default());

        evaluator.evaluate(5, true).unwrap();
        provider.set_version("2");
        evaluator.evaluate(5, true).unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_zero_ttl_always_recomputes() {
        let fixture = Fixture::new();
        let provider = fixture.provider("manual", true);
        let config = EngineConfig::with_results_ttl(0);
        let evaluator = fixture.evaluator(1, &config);

        evaluator.evaluate(5, true).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        evaluator.evaluate(5, true).unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_failing_provider_abstains() {
        let fixture = Fixture::new();
        let broken = fixture.provider("broken", true);
        fixture.provider("payments", true);
        broken.set_failing(true);
        let evaluator = fixture.evaluator(1, &EngineConfig::default());

        assert!(evaluator.evaluate(5, true).unwrap());
        let results = evaluator.get_results(5).unwrap().unwrap();
        assert_eq!(results.provider_result("broken"), Some(None));
        assert_eq!(results.provider_result("payments"), Some(Some(true)));
    }

    #[test]
    fn test_invalidate_single_learner() {
        let fixture = Fixture::new();
        fixture.provider("manual", true);
        let evaluator = fixture.evaluator(1, &EngineConfig::default());

        evaluator.evaluate(5, true).unwrap();
        evaluator.evaluate(6, true).unwrap();

        assert!(evaluator.invalidate(5).unwrap());
        assert!(!evaluator.invalidate(5).unwrap());
        assert_eq!(evaluator.cached_decision(5).unwrap(), None);
        assert_eq!(evaluator.cached_decision(6).unwrap(), Some(true));
    }

    #[test]
    fn test_kinds_use_separate_meta() {
        let fixture = Fixture::new();
        fixture.provider("manual", true);
        let config = EngineConfig::default();
        let enrolment = fixture.evaluator(1, &config);
        let access = CourseEvaluator::new(
            1,
            EvaluatorKind::Access,
            fixture.registry.clone(),
            fixture.store.clone(),
            fixture.salt.clone(),
            &config,
        );

        enrolment.evaluate(5, true).unwrap();
        assert!(access.get_results(5).unwrap().is_none());
        assert!(enrolment.get_results(5).unwrap().is_some());
    }

    #[test]
    fn test_tracked_evaluation_reports_stale_decision() {
        let fixture = Fixture::new();
        let provider = fixture.provider("payments", true);
        let evaluator = fixture.evaluator(1, &EngineConfig::default());

        let first = evaluator.evaluate_tracked(5, true).unwrap();
        assert_eq!(first.previous, None);
        assert!(first.changed());

        let cached = evaluator.evaluate_tracked(5, true).unwrap();
        assert!(!cached.recomputed);
        assert!(!cached.changed());

        provider.set_decision(5, false);
        fixture.salt.reset().unwrap();
        let flipped = evaluator.evaluate_tracked(5, true).unwrap();
        assert_eq!(flipped.previous, Some(true));
        assert!(!flipped.granted);
        assert!(flipped.changed());
    }

    #[test]
    fn test_first_denial_is_not_a_change() {
        let fixture = Fixture::new();
        fixture.provider("payments", false);
        let evaluator = fixture.evaluator(1, &EngineConfig::default());

        let evaluation = evaluator.evaluate_tracked(5, true).unwrap();
        assert!(evaluation.recomputed);
        assert!(!evaluation.changed());
    }

    #[test]
    fn test_recheck_replaces_valid_envelope() {
        let fixture = Fixture::new();
        let provider = fixture.provider("payments", true);
        let evaluator = fixture.evaluator(1, &EngineConfig::default());

        evaluator.evaluate(5, true).unwrap();
        provider.set_decision(5, false);
        let evaluation = evaluator.recheck(5).unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(evaluation.previous, Some(true));
        assert!(!evaluation.granted);
        assert_eq!(evaluator.cached_decision(5).unwrap(), Some(false));
    }

    #[test]
    fn test_concurrent_rechecks_observe_each_transition_once() {
        let fixture = Fixture::new();
        let provider = fixture.provider("payments", false);
        let evaluator = Arc::new(fixture.evaluator(1, &EngineConfig::default()));
        evaluator.evaluate(5, true).unwrap();
        provider.set_decision(5, true);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let evaluator = evaluator.clone();
                std::thread::spawn(move || evaluator.recheck(5).unwrap())
            })
            .collect();
        let changes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(Evaluation::changed)
            .count();

        assert_eq!(changes, 1);
    }
}
