//! Configuration loading for Strata.
//!
//! This module handles all configuration-related functionality:
//! - Parsing `*.strata.yaml` files and merging a configuration directory
//! - Compiling argument values into expressions
//! - Validation of names, imports, module inputs and backends
//! - Computing configuration hashes for saved-plan staleness checks

mod hash;
mod module;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use module::{
    compile_expression, default_provider, Configuration, Import, Lifecycle, Module, ModuleCall,
    Output, ProviderConfig, Resource, Variable,
};
pub use parser::{
    find_config_files, parse_var_assignments, variables_from_env, ConfigParser, CONFIG_SUFFIXES,
    VAR_ENV_PREFIX,
};
pub use spec::{
    BackendSpec, BackendType, CloudSpec, CloudWorkspaces, ConfigFile, ImportSpec, LifecycleSpec,
    ModuleCallSpec, OutputSpec, ProviderSpec, ResourceSpec, VariableSpec,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
