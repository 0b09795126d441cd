//! Configuration loader for configuration directories.
//!
//! A configuration is every `*.strata.yaml` (or `*.strata.yml`) file in one
//! directory, merged in file-name order. Variable values come from the
//! command line, then `STRATA_VAR_<name>` environment variables (a `.env`
//! file in the directory is loaded first), then declared defaults.

use crate::addrs::ModulePath;
use crate::error::{ConfigError, Result, StrataError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::module::{Configuration, Module};
use super::spec::ConfigFile;

/// Environment variable prefix for input variable values.
pub const VAR_ENV_PREFIX: &str = "STRATA_VAR_";

/// File suffixes recognised as configuration files.
pub const CONFIG_SUFFIXES: &[&str] = &[".strata.yaml", ".strata.yml"];

/// Configuration parser for loading configuration directories.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths and finding `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a configuration directory, or a single file if `path` is one.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is found, a file cannot be read or parsed,
    /// or two files declare the same name.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Configuration> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let (dir, files) = if path.is_file() {
            let dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            (dir, vec![path.to_path_buf()])
        } else {
            (path.to_path_buf(), find_config_files(path)?)
        };
        info!("Loading configuration from: {}", dir.display());

        let mut merged = ConfigFile::default();
        let mut root = Module::default();
        for file in &files {
            let raw = self.load_file(file)?;
            let name = file
                .file_name()
                .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().to_string());
            let module = Module::compile(&raw, ModulePath::root(), &name, "")?;
            root.merge(module)?;
            merge_raw(&mut merged, raw)?;
        }
        merged.normalize();

        debug!(
            "Loaded {} file(s): {} resource block(s), {} module call(s)",
            files.len(),
            root.resources.len(),
            root.calls.len()
        );

        Ok(Configuration {
            root,
            backend: merged.backend.clone(),
            cloud: merged.cloud.clone(),
            source: merged,
            dir,
            files,
        })
    }

    /// Loads one configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ConfigFile> {
        let path = path.as_ref();
        debug!("Reading configuration file: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses one configuration file from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ConfigFile> {
        if content.trim().is_empty() {
            return Ok(ConfigFile::default());
        }
        serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StrataError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StrataError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Lists configuration files in `dir`, sorted by file name.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or holds no configuration.
pub fn find_config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| CONFIG_SUFFIXES.iter().any(|s| n.ends_with(s)))
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(ConfigError::EmptyDirectory {
            path: dir.to_path_buf(),
        }
        .into());
    }
    Ok(files)
}

/// Parses `NAME=VALUE` command-line assignments.
///
/// # Errors
///
/// Returns an error for entries without `=` or with an empty name.
pub fn parse_var_assignments(inputs: &[String]) -> Result<BTreeMap<String, String>> {
    inputs
        .iter()
        .map(|input| match input.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(ConfigError::InvalidVariableAssignment {
                input: input.clone(),
            }
            .into()),
        })
        .collect()
}

/// Collects `STRATA_VAR_<name>` values from the process environment.
#[must_use]
pub fn variables_from_env() -> BTreeMap<String, String> {
    std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(VAR_ENV_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| (name.to_string(), value))
        })
        .collect()
}

fn merge_raw(into: &mut ConfigFile, from: ConfigFile) -> Result<()> {
    fn absorb<V>(
        into: &mut BTreeMap<String, V>,
        from: BTreeMap<String, V>,
        kind: &str,
    ) -> Result<()> {
        for (name, value) in from {
            if into.insert(name.clone(), value).is_some() {
                return Err(ConfigError::DuplicateName {
                    kind: kind.to_string(),
                    name,
                }
                .into());
            }
        }
        Ok(())
    }

    absorb(&mut into.variables, from.variables, "variable")?;
    absorb(&mut into.locals, from.locals, "local")?;
    absorb(&mut into.providers, from.providers, "provider")?;
    absorb(&mut into.outputs, from.outputs, "output")?;
    absorb(&mut into.modules, from.modules, "module")?;
    into.resources.extend(from.resources);
    into.imports.extend(from.imports);

    if from.backend.is_some() {
        if into.backend.is_some() {
            return Err(ConfigError::DuplicateName {
                kind: "backend".to_string(),
                name: "backend".to_string(),
            }
            .into());
        }
        into.backend = from.backend;
    }
    if from.cloud.is_some() {
        if into.cloud.is_some() {
            return Err(ConfigError::DuplicateName {
                kind: "cloud".to_string(),
                name: "cloud".to_string(),
            }
            .into());
        }
        into.cloud = from.cloud;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_directory_merges_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("b.strata.yaml"),
            "resources:\n  - type: null_resource\n    name: b\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.strata.yaml"),
            "variables:\n  x:\n    default: 1\nresources:\n  - type: null_resource\n    name: a\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.yaml"), "ignored: true\n").unwrap();

        let config = ConfigParser::new().load(dir.path()).unwrap();
        assert_eq!(config.files.len(), 2);
        assert!(config.files[0].ends_with("a.strata.yaml"));
        assert_eq!(config.root.resources.len(), 2);
        assert_eq!(
            config.root.resources["null_resource.b"].range.file,
            "b.strata.yaml"
        );
        assert_eq!(config.source.resources[0].name, "a");
    }

    #[test]
    fn test_duplicate_across_files() {
        let dir = TempDir::new().unwrap();
        let body = "resources:\n  - type: null_resource\n    name: a\n";
        fs::write(dir.path().join("a.strata.yaml"), body).unwrap();
        fs::write(dir.path().join("b.strata.yaml"), body).unwrap();
        let err = ConfigParser::new().load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ConfigParser::new().load(dir.path()),
            Err(StrataError::Config(ConfigError::EmptyDirectory { .. }))
        ));
    }

    #[test]
    fn test_missing_path() {
        assert!(matches!(
            ConfigParser::new().load("/definitely/not/here"),
            Err(StrataError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_var_assignments() {
        let vars = parse_var_assignments(&["a=1".to_string(), "b=x=y".to_string()]).unwrap();
        assert_eq!(vars["a"], "1");
        assert_eq!(vars["b"], "x=y");
        assert!(parse_var_assignments(&["novalue".to_string()]).is_err());
        assert!(parse_var_assignments(&["=v".to_string()]).is_err());
    }

    #[test]
    fn test_parse_empty_file() {
        let file = ConfigParser::new().parse_yaml("   \n", None).unwrap();
        assert_eq!(file, ConfigFile::default());
    }
}
