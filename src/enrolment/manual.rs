//! # Manual Enrolment Provider
//!
//! Built-in provider for explicit enrol/withdraw actions, handling every
//! course. The per-(learner, course) flag is tri-state:
//!
//! - `true`: manually enrolled
//! - `false`: withdrawn; never falls back to the legacy check
//! - absent: run the legacy migration check
//!
//! The legacy check treats learners with course progress recorded before
//! the enrolment system existed as enrolled. It runs only while the site is
//! flagged as a legacy install, the site-wide migration flag is on, the
//! config allows it and the legacy policy does not veto. A positive result
//! is persisted as an explicit enrolment so the check never repeats.

use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::store::{EntityId, LearnerStore, OptionStore, StoreError, StoreResult, UserId};

use super::errors::{EnrolmentError, EnrolmentResult, ProviderError};
use super::provider::Provider;

/// Provider id
pub const MANUAL_PROVIDER_ID: &str = "manual";

/// Learner meta key holding the manual flag
pub const MANUAL_ENROLMENT_META: &str = "sensei_manual_enrolment";

/// Option set when the site was upgraded from a pre-enrolment version
pub const LEGACY_INSTALL_OPTION: &str = "sensei_enrolment_legacy";

/// Site-wide switch for the legacy migration
pub const LEGACY_MIGRATION_OPTION: &str = "sensei_enrolment_legacy_migration";

const MANUAL_PROVIDER_VERSION: &str = "1";

/// Extension point that may veto a legacy enrolment
pub trait LegacyEnrolmentPolicy: Send + Sync {
    fn allow_legacy_enrolment(&self, learner: UserId, course: EntityId) -> bool;
}

impl<F> LegacyEnrolmentPolicy for F
where
    F: Fn(UserId, EntityId) -> bool + Send + Sync,
{
    fn allow_legacy_enrolment(&self, learner: UserId, course: EntityId) -> bool {
        self(learner, course)
    }
}

/// Explicit enrol/withdraw provider
pub struct ManualEnrolmentProvider {
    learners: Arc<dyn LearnerStore>,
    options: Arc<dyn OptionStore>,
    legacy_enabled: bool,
    policy: RwLock<Option<Arc<dyn LegacyEnrolmentPolicy>>>,
}

impl ManualEnrolmentProvider {
    pub fn new(
        learners: Arc<dyn LearnerStore>,
        options: Arc<dyn OptionStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            learners,
            options,
            legacy_enabled: config.legacy_enrolment_migration,
            policy: RwLock::new(None),
        }
    }

    /// Install (or clear) the legacy veto policy
    pub fn set_legacy_policy(
        &self,
        policy: Option<Arc<dyn LegacyEnrolmentPolicy>>,
    ) -> EnrolmentResult<()> {
        *self.policy.write().map_err(|_| EnrolmentError::poisoned())? = policy;
        Ok(())
    }

    /// Mark the learner as manually enrolled; returns whether the flag changed
    pub fn enrol_student(&self, learner: UserId, course: EntityId) -> EnrolmentResult<bool> {
        let changed = self.set_flag(learner, course, true)?;
        if changed {
            info!(learner, course, "learner manually enrolled");
        }
        Ok(changed)
    }

    /// Withdraw the learner, blocking legacy enrolment; returns whether the
    /// flag changed
    pub fn withdraw_student(&self, learner: UserId, course: EntityId) -> EnrolmentResult<bool> {
        let changed = self.set_flag(learner, course, false)?;
        if changed {
            info!(learner, course, "learner manually withdrawn");
        }
        Ok(changed)
    }

    fn set_flag(&self, learner: UserId, course: EntityId, enrolled: bool) -> EnrolmentResult<bool> {
        if self.manual_flag(learner, course)? == Some(enrolled) {
            return Ok(false);
        }
        self.learners
            .set_learner_meta(learner, course, MANUAL_ENROLMENT_META, Value::Bool(enrolled))?;
        Ok(true)
    }

    /// Whether the explicit flag says enrolled (legacy check not run)
    pub fn is_manually_enrolled(&self, learner: UserId, course: EntityId) -> EnrolmentResult<bool> {
        Ok(self.manual_flag(learner, course)? == Some(true))
    }

    fn manual_flag(&self, learner: UserId, course: EntityId) -> StoreResult<Option<bool>> {
        Ok(self
            .learners
            .get_learner_meta(learner, course, MANUAL_ENROLMENT_META)?
            .and_then(|v| v.as_bool()))
    }

    fn legacy_migration_active(&self) -> StoreResult<bool> {
        if !self.legacy_enabled {
            return Ok(false);
        }
        Ok(is_truthy(self.options.get_option(LEGACY_INSTALL_OPTION)?.as_ref())
            && is_truthy(self.options.get_option(LEGACY_MIGRATION_OPTION)?.as_ref()))
    }

    fn has_legacy_enrolment(&self, learner: UserId, course: EntityId) -> StoreResult<bool> {
        if !self.legacy_migration_active()? {
            return Ok(false);
        }

        let allowed = self
            .policy
            .read()
            .map_err(|_| StoreError::poisoned())?
            .as_ref()
            .map(|policy| policy.allow_legacy_enrolment(learner, course))
            .unwrap_or(true);
        if !allowed {
            debug!(learner, course, "legacy enrolment vetoed");
            return Ok(false);
        }

        self.learners.has_course_progress(learner, course)
    }
}

impl Provider for ManualEnrolmentProvider {
    fn id(&self) -> &str {
        MANUAL_PROVIDER_ID
    }

    fn name(&self) -> &str {
        "Manual"
    }

    fn version(&self) -> String {
        MANUAL_PROVIDER_VERSION.to_string()
    }

    fn handles(&self, _course: EntityId) -> bool {
        true
    }

    fn decide(&self, learner: UserId, course: EntityId) -> Result<bool, ProviderError> {
        let flag = self
            .manual_flag(learner, course)
            .map_err(|err| ProviderError::store(MANUAL_PROVIDER_ID, err))?;
        if let Some(enrolled) = flag {
            return Ok(enrolled);
        }

        let legacy = self
            .has_legacy_enrolment(learner, course)
            .map_err(|err| ProviderError::store(MANUAL_PROVIDER_ID, err))?;
        if legacy {
            self.learners
                .set_learner_meta(learner, course, MANUAL_ENROLMENT_META, Value::Bool(true))
                .map_err(|err| ProviderError::store(MANUAL_PROVIDER_ID, err))?;
            info!(learner, course, "migrated legacy enrolment");
        }
        Ok(legacy)
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Null) | None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn provider(config: &EngineConfig) -> (Arc<InMemoryStore>, ManualEnrolmentProvider) {
        let store = Arc::new(InMemoryStore::new());
        let provider = ManualEnrolmentProvider::new(store.clone(), store.clone(), config);
        (store, provider)
    }

    fn flag_legacy_site(store: &InMemoryStore) {
        store.set_option(LEGACY_INSTALL_OPTION, json!("1.11.0")).unwrap();
        store.set_option(LEGACY_MIGRATION_OPTION, json!(true)).unwrap();
    }

    #[test]
    fn test_enrol_and_withdraw_idempotent() {
        let (_, provider) = provider(&EngineConfig::default());

        assert!(provider.enrol_student(1, 10).unwrap());
        assert!(!provider.enrol_student(1, 10).unwrap());
        assert_eq!(provider.decide(1, 10), Ok(true));

        assert!(provider.withdraw_student(1, 10).unwrap());
        assert!(!provider.withdraw_student(1, 10).unwrap());
        assert_eq!(provider.decide(1, 10), Ok(false));
        assert!(!provider.is_manually_enrolled(1, 10).unwrap());
    }

    #[test]
    fn test_handles_every_course() {
        let (_, provider) = provider(&EngineConfig::default());
        assert!(provider.handles(1));
        assert!(provider.handles(999));
        assert_eq!(provider.id(), MANUAL_PROVIDER_ID);
    }

    #[test]
    fn test_legacy_progress_enrols_once() {
        let (store, provider) = provider(&EngineConfig::default());
        flag_legacy_site(&store);
        store.record_course_progress(1, 10).unwrap();

        assert_eq!(provider.decide(1, 10), Ok(true));
        assert!(provider.is_manually_enrolled(1, 10).unwrap());
        assert_eq!(provider.decide(2, 10), Ok(false));
    }

    #[test]
    fn test_legacy_requires_both_flags() {
        let (store, provider) = provider(&EngineConfig::default());
        store.record_course_progress(1, 10).unwrap();
        store.set_option(LEGACY_INSTALL_OPTION, json!("1.11.0")).unwrap();

        assert_eq!(provider.decide(1, 10), Ok(false));

        store.set_option(LEGACY_MIGRATION_OPTION, json!(0)).unwrap();
        assert_eq!(provider.decide(1, 10), Ok(false));
    }

    #[test]
    fn test_withdrawal_blocks_legacy() {
        let (store, provider) = provider(&EngineConfig::default());
        flag_legacy_site(&store);
        store.record_course_progress(1, 10).unwrap();

        provider.withdraw_student(1, 10).unwrap();
        assert_eq!(provider.decide(1, 10), Ok(false));
    }

    #[test]
    fn test_policy_veto() {
        let (store, provider) = provider(&EngineConfig::default());
        flag_legacy_site(&store);
        store.record_course_progress(1, 10).unwrap();
        store.record_course_progress(2, 10).unwrap();

        let policy: Arc<dyn LegacyEnrolmentPolicy> =
            Arc::new(|learner: UserId, _course: EntityId| learner != 1);
        provider.set_legacy_policy(Some(policy)).unwrap();

        assert_eq!(provider.decide(1, 10), Ok(false));
        assert_eq!(provider.decide(2, 10), Ok(true));
    }

    #[test]
    fn test_config_disables_legacy() {
        let config = EngineConfig {
            legacy_enrolment_migration: false,
            ..Default::default()
        };
        let (store, provider) = provider(&config);
        flag_legacy_site(&store);
        store.record_course_progress(1, 10).unwrap();

        assert_eq!(provider.decide(1, 10), Ok(false));
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(Some(&json!("yes"))));
        assert!(!is_truthy(Some(&json!("0"))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(is_truthy(Some(&json!(1))));
        assert!(!is_truthy(None));
    }
}
