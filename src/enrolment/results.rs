//! # Provider Results Envelope
//!
//! Versioned, timestamped snapshot of every provider's decision for one
//! (learner, course) pair.
//!
//! Stored schema (version 1), kept compact with single-letter keys:
//!
//! ```text
//! {"s":1,"t":1700000000.25,"v":"<aggregate version>","r":{"manual":false,"payments":true,"groups":null}}
//! ```
//!
//! - `s`: schema version; envelopes with another schema are treated as absent
//! - `t`: computation time, fractional seconds since the epoch
//! - `v`: aggregate version (site salt + provider versions) at computation
//! - `r`: provider id to decision, `null` when the provider abstained
//!
//! ## Invariants
//! - Envelopes are never mutated; a re-evaluation replaces them
//! - An envelope is reusable only while its version is current and its TTL
//!   has not passed

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current stored schema version
pub const RESULTS_SCHEMA_VERSION: u8 = 1;

/// Snapshot of per-provider decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResults {
    #[serde(rename = "s")]
    schema: u8,

    #[serde(rename = "t")]
    computed_at: f64,

    #[serde(rename = "v")]
    version: String,

    #[serde(rename = "r")]
    results: BTreeMap<String, Option<bool>>,
}

impl ProviderResults {
    /// Envelope computed now
    pub fn new(results: BTreeMap<String, Option<bool>>, version: impl Into<String>) -> Self {
        Self::computed_at(results, version, Utc::now())
    }

    pub fn computed_at(
        results: BTreeMap<String, Option<bool>>,
        version: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            schema: RESULTS_SCHEMA_VERSION,
            computed_at: at.timestamp_micros() as f64 / 1_000_000.0,
            version: version.into(),
            results,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Computation time in fractional seconds
    pub fn time(&self) -> f64 {
        self.computed_at
    }

    pub fn results(&self) -> &BTreeMap<String, Option<bool>> {
        &self.results
    }

    /// Decision of one provider: `None` if absent, `Some(None)` if it abstained
    pub fn provider_result(&self, provider: &str) -> Option<Option<bool>> {
        self.results.get(provider).copied()
    }

    /// True iff at least one provider granted
    pub fn is_granted(&self) -> bool {
        self.results.values().any(|r| *r == Some(true))
    }

    /// Whether the envelope may be reused under `current_version` at `now`
    pub fn is_valid(&self, current_version: &str, now: DateTime<Utc>, ttl: Option<Duration>) -> bool {
        if self.version != current_version {
            return false;
        }
        match ttl {
            None => true,
            Some(ttl) => {
                let now_secs = now.timestamp_micros() as f64 / 1_000_000.0;
                let ttl_secs = ttl.num_milliseconds() as f64 / 1_000.0;
                now_secs - self.computed_at <= ttl_secs
            }
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decode a stored envelope; `None` for malformed or foreign-schema data
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value::<Self>(value)
            .ok()
            .filter(|r| r.schema == RESULTS_SCHEMA_VERSION)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(input: &str) -> Option<Self> {
        serde_json::from_str::<Value>(input).ok().and_then(Self::from_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn results(entries: &[(&str, Option<bool>)]) -> BTreeMap<String, Option<bool>> {
        entries
            .iter()
            .map(|(id, r)| (id.to_string(), *r))
            .collect()
    }

    #[test]
    fn test_granted_when_any_provider_grants() {
        let envelope = ProviderResults::new(
            results(&[("manual", Some(false)), ("payments", Some(true))]),
            "v1",
        );
        assert!(envelope.is_granted());
        assert_eq!(envelope.provider_result("manual"), Some(Some(false)));
        assert_eq!(envelope.provider_result("unknown"), None);
    }

    #[test]
    fn test_abstentions_do_not_grant() {
        let envelope = ProviderResults::new(results(&[("groups", None)]), "v1");
        assert!(!envelope.is_granted());
        assert!(!ProviderResults::new(BTreeMap::new(), "v1").is_granted());
    }

    #[test]
    fn test_version_mismatch_invalidates() {
        let envelope = ProviderResults::new(results(&[("manual", Some(true))]), "v1");
        assert!(envelope.is_valid("v1", Utc::now(), None));
        assert!(!envelope.is_valid("v2", Utc::now(), None));
    }

    #[test]
    fn test_ttl_expiry() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let envelope = ProviderResults::computed_at(results(&[]), "v1", at);
        let ttl = Some(Duration::minutes(10));

        assert!(envelope.is_valid("v1", at + Duration::minutes(5), ttl));
        assert!(!envelope.is_valid("v1", at + Duration::minutes(11), ttl));
    }

    #[test]
    fn test_compact_schema() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(250);
        let envelope = ProviderResults::computed_at(
            results(&[("groups", None), ("manual", Some(true))]),
            "abc",
            at,
        );
        assert_eq!(
            envelope.to_json(),
            r#"{"s":1,"t":1704067200.25,"v":"abc","r":{"groups":null,"manual":true}}"#
        );
        assert_eq!(ProviderResults::from_json(&envelope.to_json()), Some(envelope));
    }

    #[test]
    fn test_foreign_schema_rejected() {
        assert!(ProviderResults::from_json(r#"{"s":2,"t":1.0,"v":"x","r":{}}"#).is_none());
        assert!(ProviderResults::from_json(r#"{"t":1.0,"v":"x"}"#).is_none());
        assert!(ProviderResults::from_json("not json").is_none());
    }
}
