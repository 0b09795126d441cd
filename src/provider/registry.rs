//! Provider lookup by name.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::local::LocalProvider;
use super::null::NullProvider;
use super::schema::ResourceSchema;
use super::traits::{Provider, ProviderResult};
use crate::error::ProviderError;

/// The set of providers available to one engine.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in `null` and `local` providers.
    ///
    /// Relative `local_file` paths resolve against `base_dir`.
    #[must_use]
    pub fn with_builtins(base_dir: impl AsRef<Path>) -> Self {
        Self::new()
            .with(Arc::new(NullProvider::new()))
            .with(Arc::new(LocalProvider::new(base_dir.as_ref())))
    }

    /// Adds a provider, replacing any with the same name.
    #[must_use]
    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    /// Adds a provider, replacing any with the same name.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        debug!("Registering provider: {}", provider.name());
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Looks up a provider.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Looks up a provider or fails with a descriptive error.
    ///
    /// # Errors
    ///
    /// Returns an error if no provider has that name.
    pub fn require(&self, name: &str) -> ProviderResult<Arc<dyn Provider>> {
        self.get(name).ok_or_else(|| ProviderError::InvalidConfig {
            message: format!(
                "provider \"{name}\" is not available; known providers: {}",
                self.names().join(", ")
            ),
        })
    }

    /// Schema of a resource type served by `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is missing or does not serve the type.
    pub fn schema(&self, provider: &str, resource_type: &str) -> ProviderResult<ResourceSchema> {
        self.require(provider)?
            .schema(resource_type)
            .ok_or_else(|| ProviderError::unsupported(provider, resource_type))
    }

    /// Names of all registered providers.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_builtins() {
        let registry = ProviderRegistry::with_builtins(".");
        assert_eq!(registry.names(), vec!["local", "null"]);
        assert!(registry.schema("null", "null_resource").is_ok());
        assert!(registry.schema("local", "local_file").is_ok());
    }

    #[test]
    fn test_missing_provider_and_type() {
        let registry = ProviderRegistry::with_builtins(".");
        assert!(matches!(
            registry.schema("aws", "aws_instance"),
            Err(ProviderError::InvalidConfig { .. })
        ));
        assert_eq!(
            registry.schema("null", "null_thing").unwrap_err(),
            ProviderError::unsupported("null", "null_thing")
        );
    }
}
