//! The `null` provider: resources that exist only in state.
//!
//! `null_resource` has no remote object. It is useful for sequencing and for
//! forcing replacement of dependents through its `triggers` map.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::schema::{AttributeSchema, ResourceSchema};
use super::traits::{Provider, ProviderResult};
use crate::error::ProviderError;
use crate::value::{MarkedValue, ValueType};

const NULL_RESOURCE: &str = "null_resource";

/// The built-in `null` provider.
#[derive(Debug, Default)]
pub struct NullProvider;

impl NullProvider {
    /// Creates the provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn check_type(resource_type: &str) -> ProviderResult<()> {
        if resource_type == NULL_RESOURCE {
            Ok(())
        } else {
            Err(ProviderError::unsupported("null", resource_type))
        }
    }

    fn object(id: &str, triggers: MarkedValue) -> MarkedValue {
        MarkedValue::object_from([("id", MarkedValue::string(id)), ("triggers", triggers)])
    }
}

fn triggers_of(value: &MarkedValue) -> MarkedValue {
    value.get_attr("triggers").unwrap_or_default()
}

#[async_trait]
impl Provider for NullProvider {
    fn name(&self) -> &'static str {
        "null"
    }

    fn resource_types(&self) -> Vec<String> {
        vec![NULL_RESOURCE.to_string()]
    }

    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        (resource_type == NULL_RESOURCE).then(|| {
            ResourceSchema::new(NULL_RESOURCE)
                .attribute(AttributeSchema::optional("triggers", ValueType::Object).force_new())
                .attribute(AttributeSchema::computed("id", ValueType::String))
        })
    }

    async fn configure(&self, config: &MarkedValue) -> ProviderResult<()> {
        match config.as_object() {
            Some(attrs) if !attrs.is_empty() => Err(ProviderError::InvalidConfig {
                message: "the null provider takes no configuration".to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn read(
        &self,
        resource_type: &str,
        current: &MarkedValue,
    ) -> ProviderResult<Option<MarkedValue>> {
        Self::check_type(resource_type)?;
        Ok(Some(current.clone()))
    }

    async fn create(&self, resource_type: &str, planned: &MarkedValue) -> ProviderResult<MarkedValue> {
        Self::check_type(resource_type)?;
        let id = Uuid::new_v4().as_u64_pair().0.to_string();
        debug!("Created null_resource {id}");
        Ok(Self::object(&id, triggers_of(planned)))
    }

    async fn update(
        &self,
        resource_type: &str,
        prior: &MarkedValue,
        planned: &MarkedValue,
    ) -> ProviderResult<MarkedValue> {
        Self::check_type(resource_type)?;
        let id = prior
            .get_attr("id")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| ProviderError::InvalidValue {
                resource_type: resource_type.to_string(),
                message: "prior object has no id".to_string(),
            })?;
        Ok(Self::object(&id, triggers_of(planned)))
    }

    async fn delete(&self, resource_type: &str, _prior: &MarkedValue) -> ProviderResult<()> {
        Self::check_type(resource_type)
    }

    async fn import(&self, resource_type: &str, id: &str) -> ProviderResult<MarkedValue> {
        Self::check_type(resource_type)?;
        Ok(Self::object(id, MarkedValue::null()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_id() {
        let provider = NullProvider::new();
        let planned = MarkedValue::object_from([(
            "triggers",
            MarkedValue::object_from([("v", MarkedValue::string("1"))]),
        )]);
        let created = provider.create(NULL_RESOURCE, &planned).await.unwrap();
        let id = created.get_attr("id").unwrap();
        assert!(id.as_str().is_some_and(|s| !s.is_empty()));
        assert_eq!(created.get_attr("triggers").unwrap(), triggers_of(&planned));

        let updated = provider.update(NULL_RESOURCE, &created, &planned).await.unwrap();
        assert_eq!(updated.get_attr("id"), Some(id));
    }

    #[tokio::test]
    async fn test_rejects_other_types_and_config() {
        let provider = NullProvider::new();
        assert!(provider.import("null_other", "x").await.is_err());
        assert!(provider
            .configure(&MarkedValue::object_from([("x", MarkedValue::bool(true))]))
            .await
            .is_err());
        assert!(provider.configure(&MarkedValue::object(std::collections::BTreeMap::new())).await.is_ok());
    }
}
