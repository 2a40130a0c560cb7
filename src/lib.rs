//! lms-core - course enrolment, access and structure engine for an LMS
//!
//! - `enrolment`: provider-based enrolment and access decisions with
//!   versioned, cached per-learner results
//! - `structure`: validating, all-or-nothing reconciliation of a course's
//!   lessons and modules
//! - `store`: storage seam and in-memory backend
//! - `engine`: wires the above behind one explicit context
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod config;
pub mod engine;
pub mod enrolment;
pub mod events;
pub mod store;
pub mod structure;

pub use config::{ConfigError, EngineConfig};
pub use engine::CourseEngine;
