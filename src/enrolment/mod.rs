//! # Course Enrolment and Access
//!
//! Pluggable, cached decision pipeline over enrolment (and access)
//! providers.
//!
//! ## Invariants
//! - A learner is enrolled iff at least one provider handling the course
//!   grants; a provider may only veto through its own internal policy
//! - A cached envelope is reused only while its aggregate version (site
//!   salt + provider versions) is current and its TTL has not passed
//! - Salt resets and per-pair invalidations are visible to the next read

mod course;
mod errors;
mod evaluator;
mod instances;
mod locks;
mod manager;
mod manual;
mod provider;
mod registry;
mod results;
mod salt;

pub use course::{CourseAccess, CourseEnrolment};
pub use errors::{EnrolmentError, EnrolmentResult, ProviderError};
pub use evaluator::{CourseEvaluator, Evaluation, EvaluatorKind};
pub use instances::InstanceCache;
pub use locks::KeyedLocks;
pub use manager::EnrolmentManager;
pub use manual::{
    LegacyEnrolmentPolicy, ManualEnrolmentProvider, LEGACY_INSTALL_OPTION,
    LEGACY_MIGRATION_OPTION, MANUAL_ENROLMENT_META, MANUAL_PROVIDER_ID,
};
pub use provider::{Provider, StaticProvider};
pub use registry::{DiscoveryHook, ProviderList, ProviderRegistry};
pub use results::{ProviderResults, RESULTS_SCHEMA_VERSION};
pub use salt::{aggregate_version, generate_salt, SiteSalt};
