//! Provider registry - maps provider keys to their adapters

use std::collections::HashMap;
use std::sync::Arc;

use domain::value_objects::Provider;

use crate::error::ApplicationError;
use crate::ports::ProviderPort;

/// Registry of configured provider adapters
///
/// Built once at startup; providers without configured adapters are simply
/// absent, and operations against them fail with a configuration error.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderPort>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter for a provider
    #[must_use]
    pub fn with_adapter(mut self, provider: Provider, adapter: Arc<dyn ProviderPort>) -> Self {
        self.adapters.insert(provider, adapter);
        self
    }

    /// Look up the adapter for a provider
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Configuration`] when no adapter is
    /// registered for the provider.
    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderPort>, ApplicationError> {
        self.adapters.get(&provider).cloned().ok_or_else(|| {
            ApplicationError::Configuration(format!("no adapter registered for {provider}"))
        })
    }

    /// Providers with a registered adapter
    #[must_use]
    pub fn configured(&self) -> Vec<Provider> {
        let mut providers: Vec<_> = self.adapters.keys().copied().collect();
        providers.sort_by_key(Provider::as_str);
        providers
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("configured", &self.configured())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockProviderPort;

    #[test]
    fn empty_registry_reports_missing_adapter() {
        let registry = ProviderRegistry::new();
        let err = registry.get(Provider::Google).unwrap_err();
        assert!(matches!(err, ApplicationError::Configuration(_)));
    }

    #[test]
    fn registered_adapter_is_returned() {
        let registry = ProviderRegistry::new()
            .with_adapter(Provider::Google, Arc::new(MockProviderPort::new()));
        assert!(registry.get(Provider::Google).is_ok());
        assert!(registry.get(Provider::Outlook).is_err());
        assert_eq!(registry.configured(), vec![Provider::Google]);
    }
}
