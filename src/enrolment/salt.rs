//! # Site Salt
//!
//! Site-wide invalidation token. Every envelope is stamped with a version
//! derived from the salt, so replacing the salt makes all of them stale at
//! once.
//!
//! ## Invariants
//! - The salt is read from the option store on every use; a reset is
//!   visible to the very next evaluation
//! - Lazy generation never overwrites a salt written concurrently

use std::sync::Arc;

use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::store::OptionStore;

use super::errors::{EnrolmentError, EnrolmentResult};

/// Persisted site salt
pub struct SiteSalt {
    options: Arc<dyn OptionStore>,
    option_name: String,
}

impl SiteSalt {
    pub fn new(options: Arc<dyn OptionStore>, option_name: impl Into<String>) -> Self {
        Self {
            options,
            option_name: option_name.into(),
        }
    }

    /// Current salt, generated and persisted on first access
    pub fn get(&self) -> EnrolmentResult<String> {
        if let Some(salt) = self.read()? {
            return Ok(salt);
        }

        let salt = generate_salt();
        if self
            .options
            .add_option(&self.option_name, Value::String(salt.clone()))?
        {
            return Ok(salt);
        }

        // Lost the race against another writer; use theirs
        self.read()?
            .ok_or_else(|| EnrolmentError::Internal("site salt vanished after write".to_string()))
    }

    /// Replace the salt; returns the new value
    pub fn reset(&self) -> EnrolmentResult<String> {
        let salt = generate_salt();
        self.options
            .set_option(&self.option_name, Value::String(salt.clone()))?;
        info!(option = %self.option_name, "site salt reset");
        Ok(salt)
    }

    fn read(&self) -> EnrolmentResult<Option<String>> {
        Ok(self
            .options
            .get_option(&self.option_name)?
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty()))
    }
}

/// Generate a random 128-bit salt, base64 encoded
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Aggregate version stamped into envelopes
pub fn aggregate_version(salt: &str, provider_fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"|");
    hasher.update(provider_fingerprint.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn salt() -> (Arc<InMemoryStore>, SiteSalt) {
        let store = Arc::new(InMemoryStore::new());
        let salt = SiteSalt::new(store.clone(), "salt");
        (store, salt)
    }

    #[test]
    fn test_salt_generated_once() {
        let (store, salt) = salt();
        let first = salt.get().unwrap();
        assert_eq!(salt.get().unwrap(), first);
        assert_eq!(store.get_option("salt").unwrap(), Some(Value::String(first)));
    }

    #[test]
    fn test_reset_replaces_salt() {
        let (_, salt) = salt();
        let first = salt.get().unwrap();
        let reset = salt.reset().unwrap();

        assert_ne!(first, reset);
        assert_eq!(salt.get().unwrap(), reset);
    }

    #[test]
    fn test_existing_salt_is_kept() {
        let (store, salt) = salt();
        store.set_option("salt", Value::String("fixed".into())).unwrap();
        assert_eq!(salt.get().unwrap(), "fixed");
    }

    #[test]
    fn test_aggregate_version() {
        let v1 = aggregate_version("a", "manual:1");
        assert_eq!(v1, aggregate_version("a", "manual:1"));
        assert_ne!(v1, aggregate_version("b", "manual:1"));
        assert_ne!(v1, aggregate_version("a", "manual:2"));
    }

    #[test]
    fn test_generated_salts_differ() {
        assert_ne!(generate_salt(), generate_salt());
        assert_eq!(generate_salt().len(), 22);
    }
}
