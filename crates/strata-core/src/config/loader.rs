//! Layered configuration loading

use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_fs::NormalizedPath;

use crate::env::{EnvLookup, ProcessEnv};
use crate::merge::{MergeOptions, merge_into};
use crate::value::{Mapping, Value};
use crate::{Error, Result};

use super::StrataConfig;

/// Name of the configuration file looked up in the global config directory
/// and in the base path.
pub const CONFIG_FILE_NAME: &str = "strata.yaml";

const ALT_CONFIG_FILE_NAME: &str = "strata.yml";

/// Values supplied explicitly by the caller, typically from CLI flags.
///
/// These win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_path: Option<PathBuf>,
    pub stacks_base_path: Option<String>,
    pub included_paths: Option<Vec<String>>,
    pub excluded_paths: Option<Vec<String>>,
    pub name_pattern: Option<String>,
    pub name_template: Option<String>,
    pub list_merge_strategy: Option<String>,
}

/// Loads [`StrataConfig`] from a hierarchy of sources.
///
/// Layers, lowest precedence first:
/// 1. Built-in defaults
/// 2. Global config (`<config_dir>/strata/strata.yaml`)
/// 3. Project config (`<base_path>/strata.yaml`)
/// 4. `STRATA_*` environment variables
/// 5. [`ConfigOverrides`]
///
/// Missing files are skipped. Invalid YAML in any file is an error.
pub struct ConfigLoader {
    /// Directory relative paths are resolved against (usually the cwd).
    working_dir: PathBuf,

    /// Override for the global config directory (used for testing).
    global_config_dir_override: Option<PathBuf>,

    env: Arc<dyn EnvLookup>,
    overrides: ConfigOverrides,
}

impl ConfigLoader {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            global_config_dir_override: None,
            env: Arc::new(ProcessEnv),
            overrides: ConfigOverrides::default(),
        }
    }

    /// Use a custom global config directory instead of the platform one.
    pub fn with_global_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.global_config_dir_override = Some(dir.into());
        self
    }

    pub fn with_env(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = env;
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.global_config_dir_override {
            return Some(dir.clone());
        }
        dirs::config_dir().map(|d| d.join("strata"))
    }

    /// Explicitly requested base path, from overrides or the environment.
    fn explicit_base_path(&self) -> Option<PathBuf> {
        self.overrides
            .base_path
            .clone()
            .or_else(|| self.env.var("STRATA_BASE_PATH").map(PathBuf::from))
            .map(|p| absolutize(&self.working_dir, &p))
    }

    /// Resolve the configuration by merging all layers.
    pub fn load(&self) -> Result<StrataConfig> {
        let explicit_base = self.explicit_base_path();
        let project_dir = explicit_base
            .clone()
            .unwrap_or_else(|| self.working_dir.clone());

        let mut layered = Mapping::new();

        if let Some(global_dir) = self.global_config_dir() {
            let global_config_path = global_dir.join(CONFIG_FILE_NAME);
            if global_config_path.is_file() {
                tracing::debug!(?global_config_path, "Loading global config");
                merge_layer(&mut layered, &global_config_path)?;
            } else {
                tracing::debug!(?global_config_path, "No global config found, skipping");
            }
        }

        let project_config_path = [CONFIG_FILE_NAME, ALT_CONFIG_FILE_NAME]
            .iter()
            .map(|name| project_dir.join(name))
            .find(|path| path.is_file());
        if let Some(ref path) = project_config_path {
            tracing::debug!(project_config_path = ?path, "Loading project config");
            merge_layer(&mut layered, path)?;
        }

        let source = project_config_path
            .as_deref()
            .unwrap_or(project_dir.as_path())
            .display()
            .to_string();
        let yaml = serde_yaml::to_value(Value::Mapping(layered))?;
        let mut config: StrataConfig =
            serde_yaml::from_value(yaml).map_err(|e| Error::ConfigParse {
                path: source,
                message: e.to_string(),
            })?;

        // A relative base_path in a file is relative to the project directory.
        config.base_path = match explicit_base {
            Some(base) => base,
            None => absolutize(&project_dir, &config.base_path),
        };

        self.apply_env(&mut config)?;
        self.apply_overrides(&mut config)?;
        config.validate()?;

        tracing::debug!(
            base_path = %config.base_path.display(),
            stacks = %config.stacks.base_path,
            "Resolved configuration"
        );
        Ok(config)
    }

    fn apply_env(&self, config: &mut StrataConfig) -> Result<()> {
        let env = self.env.as_ref();
        if let Some(v) = env.var("STRATA_STACKS_BASE_PATH") {
            config.stacks.base_path = v;
        }
        if let Some(v) = env.var("STRATA_STACKS_INCLUDED_PATHS") {
            config.stacks.included_paths = split_list(&v);
        }
        if let Some(v) = env.var("STRATA_STACKS_EXCLUDED_PATHS") {
            config.stacks.excluded_paths = split_list(&v);
        }
        if let Some(v) = env.var("STRATA_STACKS_NAME_PATTERN") {
            config.stacks.name_pattern = Some(v);
        }
        if let Some(v) = env.var("STRATA_STACKS_NAME_TEMPLATE") {
            config.stacks.name_template = Some(v);
        }
        if let Some(v) = env.var("STRATA_SETTINGS_LIST_MERGE_STRATEGY") {
            config.settings.list_merge_strategy = v.parse()?;
        }
        if let Some(v) = env.var("STRATA_COMPONENTS_TERRAFORM_BASE_PATH") {
            config.components.terraform.base_path = v;
        }
        if let Some(v) = env.var("STRATA_COMPONENTS_HELMFILE_BASE_PATH") {
            config.components.helmfile.base_path = v;
        }
        if let Some(v) = env.var("STRATA_IMPORTS_MAX_DEPTH") {
            config.imports.max_depth = v.trim().parse().map_err(|_| Error::InvalidConfig {
                message: format!("STRATA_IMPORTS_MAX_DEPTH must be a number, got '{v}'"),
            })?;
        }
        Ok(())
    }

    fn apply_overrides(&self, config: &mut StrataConfig) -> Result<()> {
        let o = &self.overrides;
        if let Some(ref v) = o.stacks_base_path {
            config.stacks.base_path = v.clone();
        }
        if let Some(ref v) = o.included_paths {
            config.stacks.included_paths = v.clone();
        }
        if let Some(ref v) = o.excluded_paths {
            config.stacks.excluded_paths = v.clone();
        }
        if let Some(ref v) = o.name_pattern {
            config.stacks.name_pattern = Some(v.clone());
        }
        if let Some(ref v) = o.name_template {
            config.stacks.name_template = Some(v.clone());
        }
        if let Some(ref v) = o.list_merge_strategy {
            config.settings.list_merge_strategy = v.parse()?;
        }
        Ok(())
    }
}

fn merge_layer(layered: &mut Mapping, path: &Path) -> Result<()> {
    let content = strata_fs::io::read_text(&NormalizedPath::new(path))?;
    let parse_error = |message: String| Error::ConfigParse {
        path: path.display().to_string(),
        message,
    };
    let layer = match Value::parse_yaml(&content).map_err(|e| parse_error(e.to_string()))? {
        Value::Null => Mapping::new(),
        Value::Mapping(m) => m,
        other => {
            return Err(parse_error(format!(
                "expected a map at the top level, found {}",
                other.type_name()
            )));
        }
    };
    merge_into(layered, &layer, MergeOptions::default())
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        NormalizedPath::new(base)
            .join(&path.to_string_lossy())
            .to_native()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
