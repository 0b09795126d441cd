//! The `local` provider: files on the machine running Strata.

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::schema::{AttributeSchema, ResourceSchema};
use super::traits::{Provider, ProviderResult};
use crate::error::ProviderError;
use crate::value::{MarkedValue, ValueType};

const LOCAL_FILE: &str = "local_file";

/// The built-in `local` provider.
///
/// Relative file names resolve against a base directory: the configuration
/// directory, or `base_dir` from the provider block.
#[derive(Debug)]
pub struct LocalProvider {
    root: PathBuf,
    base_dir: RwLock<PathBuf>,
}

impl LocalProvider {
    /// Creates the provider rooted at `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            base_dir: RwLock::new(root.to_path_buf()),
        }
    }

    fn check_type(resource_type: &str) -> ProviderResult<()> {
        if resource_type == LOCAL_FILE {
            Ok(())
        } else {
            Err(ProviderError::unsupported("local", resource_type))
        }
    }

    fn resolve(&self, filename: &str) -> PathBuf {
        let path = Path::new(filename);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.read().join(path)
        }
    }

    async fn write(&self, planned: &MarkedValue, operation: &str) -> ProviderResult<MarkedValue> {
        let filename = string_attr(planned, "filename").ok_or_else(|| ProviderError::InvalidValue {
            resource_type: LOCAL_FILE.to_string(),
            message: "\"filename\" must be a known string".to_string(),
        })?;
        let content = string_attr(planned, "content").unwrap_or_default();
        let path = self.resolve(&filename);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::action(LOCAL_FILE, operation, e.to_string()))?;
        }
        fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| ProviderError::action(LOCAL_FILE, operation, e.to_string()))?;
        info!("Wrote {} ({} bytes)", path.display(), content.len());

        Ok(file_object(&filename, &content))
    }
}

fn string_attr(value: &MarkedValue, name: &str) -> Option<String> {
    value
        .as_object()?
        .get(name)?
        .as_str()
        .map(str::to_string)
}

fn content_id(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn file_object(filename: &str, content: &str) -> MarkedValue {
    MarkedValue::object_from([
        ("content", MarkedValue::string(content)),
        ("filename", MarkedValue::string(filename)),
        ("id", MarkedValue::string(content_id(content))),
    ])
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn resource_types(&self) -> Vec<String> {
        vec![LOCAL_FILE.to_string()]
    }

    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        (resource_type == LOCAL_FILE).then(|| {
            ResourceSchema::new(LOCAL_FILE)
                .attribute(AttributeSchema::required("filename", ValueType::String).force_new())
                .attribute(AttributeSchema::optional("content", ValueType::String).also_computed())
                .attribute(AttributeSchema::computed("id", ValueType::String))
        })
    }

    async fn configure(&self, config: &MarkedValue) -> ProviderResult<()> {
        let Some(attrs) = config.as_object() else {
            return Ok(());
        };
        for (name, value) in attrs {
            match name.as_str() {
                "base_dir" => {
                    let dir = value.as_str().ok_or_else(|| ProviderError::InvalidConfig {
                        message: "\"base_dir\" must be a string".to_string(),
                    })?;
                    let dir = self.root.join(dir);
                    debug!("local provider base directory: {}", dir.display());
                    *self.base_dir.write() = dir;
                }
                other => {
                    return Err(ProviderError::InvalidConfig {
                        message: format!("unsupported argument \"{other}\" for the local provider"),
                    });
                }
            }
        }
        Ok(())
    }

    async fn read(
        &self,
        resource_type: &str,
        current: &MarkedValue,
    ) -> ProviderResult<Option<MarkedValue>> {
        Self::check_type(resource_type)?;
        let Some(filename) = string_attr(current, "filename") else {
            return Ok(None);
        };
        match fs::read_to_string(self.resolve(&filename)).await {
            Ok(content) => Ok(Some(file_object(&filename, &content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProviderError::action(LOCAL_FILE, "read", e.to_string())),
        }
    }

    async fn create(&self, resource_type: &str, planned: &MarkedValue) -> ProviderResult<MarkedValue> {
        Self::check_type(resource_type)?;
        self.write(planned, "create").await
    }

    async fn update(
        &self,
        resource_type: &str,
        _prior: &MarkedValue,
        planned: &MarkedValue,
    ) -> ProviderResult<MarkedValue> {
        Self::check_type(resource_type)?;
        self.write(planned, "update").await
    }

    async fn delete(&self, resource_type: &str, prior: &MarkedValue) -> ProviderResult<()> {
        Self::check_type(resource_type)?;
        let Some(filename) = string_attr(prior, "filename") else {
            return Ok(());
        };
        let path = self.resolve(&filename);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProviderError::action(LOCAL_FILE, "delete", e.to_string())),
        }
    }

    async fn import(&self, resource_type: &str, id: &str) -> ProviderResult<MarkedValue> {
        Self::check_type(resource_type)?;
        let lookup = MarkedValue::object_from([("filename", MarkedValue::string(id))]);
        self.read(resource_type, &lookup)
            .await?
            .ok_or_else(|| ProviderError::NotFound { id: id.to_string() })
    }
}
