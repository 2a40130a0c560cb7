//! # Providers
//!
//! A provider is a named, versioned policy deciding enrolment (or access)
//! for the courses it handles. Bumping `version` invalidates every envelope
//! computed with the previous logic.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::store::{EntityId, UserId};

use super::errors::ProviderError;

/// Pluggable enrolment/access policy
pub trait Provider: Send + Sync {
    /// Stable identifier, used as the envelope key
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str {
        self.id()
    }

    /// Logic version
    fn version(&self) -> String;

    /// Whether this provider has an opinion about the course
    fn handles(&self, course: EntityId) -> bool;

    /// Decide for a learner on a course the provider handles
    fn decide(&self, learner: UserId, course: EntityId) -> Result<bool, ProviderError>;
}

/// Provider answering from a fixed decision table.
///
/// Handy for imports that grant enrolment to a known list of learners, and
/// for tests: it counts how often it was asked.
#[derive(Debug)]
pub struct StaticProvider {
    id: String,
    version: RwLock<String>,
    default: bool,
    overrides: RwLock<HashMap<UserId, bool>>,
    courses: Option<HashSet<EntityId>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StaticProvider {
    /// Provider giving `default` to every learner on every course
    pub fn new(id: impl Into<String>, default: bool) -> Self {
        Self {
            id: id.into(),
            version: RwLock::new("1".to_string()),
            default,
            overrides: Default::default(),
            courses: None,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Restrict the provider to a set of courses; others are abstained on
    pub fn for_courses(mut self, courses: impl IntoIterator<Item = EntityId>) -> Self {
        self.courses = Some(courses.into_iter().collect());
        self
    }

    /// Set the answer for one learner
    pub fn set_decision(&self, learner: UserId, decision: bool) {
        if let Ok(mut overrides) = self.overrides.write() {
            overrides.insert(learner, decision);
        }
    }

    pub fn set_version(&self, version: impl Into<String>) {
        if let Ok(mut current) = self.version.write() {
            *current = version.into();
        }
    }

    /// Make every subsequent decision fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `decide` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for StaticProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> String {
        self.version
            .read()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn handles(&self, course: EntityId) -> bool {
        self.courses
            .as_ref()
            .map(|courses| courses.contains(&course))
            .unwrap_or(true)
    }

    fn decide(&self, learner: UserId, _course: EntityId) -> Result<bool, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::new(&self.id, "decision table unavailable"));
        }
        let overrides = self
            .overrides
            .read()
            .map_err(|_| ProviderError::new(&self.id, "lock poisoned"))?;
        Ok(overrides.get(&learner).copied().unwrap_or(self.default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider_overrides() {
        let provider = StaticProvider::new("import", false);
        provider.set_decision(7, true);

        assert_eq!(provider.decide(7, 1), Ok(true));
        assert_eq!(provider.decide(8, 1), Ok(false));
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_static_provider_course_filter() {
        let provider = StaticProvider::new("import", true).for_courses([3]);
        assert!(provider.handles(3));
        assert!(!provider.handles(4));
    }

    #[test]
    fn test_static_provider_failure() {
        let provider = StaticProvider::new("import", true);
        provider.set_failing(true);
        assert!(provider.decide(1, 1).is_err());
        assert_eq!(provider.name(), "import");
    }
}
