//! The provider interface.

use async_trait::async_trait;

use super::schema::ResourceSchema;
use crate::error::ProviderError;
use crate::value::MarkedValue;

/// Result type for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A plugin that manages objects of one or more resource types.
///
/// Values passed in and out carry no marks; the engine strips them before
/// a call and re-applies sensitive marks afterwards.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name, e.g. `local`.
    fn name(&self) -> &str;

    /// Resource types this provider manages.
    fn resource_types(&self) -> Vec<String>;

    /// Schema of one resource type.
    fn schema(&self, resource_type: &str) -> Option<ResourceSchema>;

    /// Applies provider-level configuration. Called once per walk before
    /// any resource of this provider is visited.
    async fn configure(&self, config: &MarkedValue) -> ProviderResult<()>;

    /// Reads the current object behind a recorded one.
    ///
    /// Returns `None` if the object no longer exists.
    async fn read(
        &self,
        resource_type: &str,
        current: &MarkedValue,
    ) -> ProviderResult<Option<MarkedValue>>;

    /// Creates an object and returns its full attributes.
    async fn create(&self, resource_type: &str, planned: &MarkedValue)
    -> ProviderResult<MarkedValue>;

    /// Updates an object in place and returns its new attributes.
    async fn update(
        &self,
        resource_type: &str,
        prior: &MarkedValue,
        planned: &MarkedValue,
    ) -> ProviderResult<MarkedValue>;

    /// Deletes an object.
    async fn delete(&self, resource_type: &str, prior: &MarkedValue) -> ProviderResult<()>;

    /// Reads an existing, unmanaged object by identifier.
    async fn import(&self, resource_type: &str, id: &str) -> ProviderResult<MarkedValue>;
}
