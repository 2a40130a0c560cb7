//! # Provider Registry
//!
//! Ordered list of providers for one decision kind. The list is built once
//! from explicit registrations plus discovery hooks and cached until
//! `reset()` or a new registration.
//!
//! ## Invariants
//! - Registration order is evaluation order
//! - Provider ids are unique within a registry

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use super::errors::{EnrolmentError, EnrolmentResult};
use super::provider::Provider;

/// Shared, ordered provider list
pub type ProviderList = Arc<Vec<Arc<dyn Provider>>>;

/// Hook run when the provider list is built; may add, remove or reorder
pub type DiscoveryHook = Arc<dyn Fn(&mut Vec<Arc<dyn Provider>>) + Send + Sync>;

/// Registry of providers for one decision kind
#[derive(Default)]
pub struct ProviderRegistry {
    registered: RwLock<Vec<Arc<dyn Provider>>>,
    hooks: RwLock<Vec<DiscoveryHook>>,
    cache: RwLock<Option<ProviderList>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider after the already registered ones
    pub fn register_provider(&self, provider: Arc<dyn Provider>) -> EnrolmentResult<()> {
        let mut registered = self
            .registered
            .write()
            .map_err(|_| EnrolmentError::poisoned())?;
        if registered.iter().any(|p| p.id() == provider.id()) {
            return Err(EnrolmentError::DuplicateProvider(provider.id().to_string()));
        }
        debug!(provider = provider.id(), "registering provider");
        registered.push(provider);
        drop(registered);
        self.reset()
    }

    /// Add a discovery hook; it runs the next time the list is built
    pub fn add_discovery_hook(&self, hook: DiscoveryHook) -> EnrolmentResult<()> {
        self.hooks
            .write()
            .map_err(|_| EnrolmentError::poisoned())?
            .push(hook);
        self.reset()
    }

    /// Providers in evaluation order
    pub fn get_providers(&self) -> EnrolmentResult<ProviderList> {
        if let Some(cached) = self
            .cache
            .read()
            .map_err(|_| EnrolmentError::poisoned())?
            .as_ref()
        {
            return Ok(Arc::clone(cached));
        }

        let mut cache = self.cache.write().map_err(|_| EnrolmentError::poisoned())?;
        if let Some(cached) = cache.as_ref() {
            return Ok(Arc::clone(cached));
        }

        let mut providers = self
            .registered
            .read()
            .map_err(|_| EnrolmentError::poisoned())?
            .clone();
        for hook in self
            .hooks
            .read()
            .map_err(|_| EnrolmentError::poisoned())?
            .iter()
        {
            hook(&mut providers);
        }

        let mut unique: Vec<Arc<dyn Provider>> = Vec::with_capacity(providers.len());
        for provider in providers {
            if unique.iter().any(|p| p.id() == provider.id()) {
                warn!(provider = provider.id(), "discovery produced a duplicate provider id, keeping the first");
                continue;
            }
            unique.push(provider);
        }

        let list: ProviderList = Arc::new(unique);
        *cache = Some(Arc::clone(&list));
        Ok(list)
    }

    /// Look up a provider; `None` when it was never registered
    pub fn get_provider_by_id(&self, id: &str) -> EnrolmentResult<Option<Arc<dyn Provider>>> {
        Ok(self
            .get_providers()?
            .iter()
            .find(|p| p.id() == id)
            .cloned())
    }

    /// `id:version` of every provider in evaluation order
    pub fn version_fingerprint(&self) -> EnrolmentResult<String> {
        Ok(self
            .get_providers()?
            .iter()
            .map(|p| format!("{}:{}", p.id(), p.version()))
            .collect::<Vec<_>>()
            .join(";"))
    }

    /// Drop the built list; the next read rebuilds it
    pub fn reset(&self) -> EnrolmentResult<()> {
        *self.cache.write().map_err(|_| EnrolmentError::poisoned())? = None;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.get_providers().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self
            .registered
            .read()
            .map(|r| r.iter().map(|p| p.id().to_string()).collect())
            .unwrap_or_default();
        f.debug_struct("ProviderRegistry")
            .field("registered", &ids)
            .finish()
    }
}
