//! Providers: the plugins that manage real objects.
//!
//! The core only speaks to infrastructure through the [`Provider`] trait.
//! Two providers are built in: `null` (state-only resources) and `local`
//! (files on disk).

mod local;
mod null;
mod registry;
mod schema;
mod traits;

pub use local::LocalProvider;
pub use null::NullProvider;
pub use registry::ProviderRegistry;
pub use schema::{AttributeSchema, ResourceSchema};
pub use traits::{Provider, ProviderResult};
