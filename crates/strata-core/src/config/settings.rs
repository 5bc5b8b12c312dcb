//! Configuration data model

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_fs::NormalizedPath;

use crate::component::ComponentType;
use crate::merge::{ListMergeStrategy, MergeOptions};
use crate::{Error, Result};

/// Default cap on import nesting.
pub const DEFAULT_MAX_IMPORT_DEPTH: usize = 10;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Root that every other relative path is resolved against.
    pub base_path: PathBuf,
    pub stacks: StacksConfig,
    pub components: ComponentsConfig,
    pub settings: SettingsConfig,
    pub imports: ImportsConfig,
    pub functions: FunctionsConfig,
    /// Named stores reachable through `!store`.
    pub stores: BTreeMap<String, StoreConfig>,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            stacks: StacksConfig::default(),
            components: ComponentsConfig::default(),
            settings: SettingsConfig::default(),
            imports: ImportsConfig::default(),
            functions: FunctionsConfig::default(),
            stores: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StacksConfig {
    /// Stacks directory, relative to `base_path`.
    pub base_path: String,
    /// Globs, relative to the stacks directory, selecting top-level manifests.
    pub included_paths: Vec<String>,
    /// Globs removing entries from the included set.
    pub excluded_paths: Vec<String>,
    /// Token pattern such as `{tenant}-{environment}-{stage}`.
    pub name_pattern: Option<String>,
    /// Template rendered against the component sections; wins over the pattern.
    pub name_template: Option<String>,
}

impl Default for StacksConfig {
    fn default() -> Self {
        Self {
            base_path: "stacks".to_string(),
            included_paths: vec!["**/*".to_string()],
            excluded_paths: Vec::new(),
            name_pattern: None,
            name_template: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentsConfig {
    pub terraform: ComponentTypeConfig,
    pub helmfile: ComponentTypeConfig,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            terraform: ComponentTypeConfig {
                base_path: "components/terraform".to_string(),
            },
            helmfile: ComponentTypeConfig {
                base_path: "components/helmfile".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentTypeConfig {
    /// Directory holding component folders, relative to `base_path`.
    pub base_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    pub list_merge_strategy: ListMergeStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportsConfig {
    pub max_depth: usize,
}

impl Default for ImportsConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_IMPORT_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionsConfig {
    /// Per-call timeout for shell and output collaborators.
    pub timeout_secs: Option<u64>,
}

/// A named store declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub options: serde_yaml::Value,
}

impl StrataConfig {
    /// Absolute base path.
    pub fn base(&self) -> NormalizedPath {
        NormalizedPath::new(&self.base_path)
    }

    pub fn stacks_base_path(&self) -> NormalizedPath {
        self.base().join(&self.stacks.base_path)
    }

    /// Directory holding component folders of the given type.
    pub fn component_base_path(&self, component_type: ComponentType) -> NormalizedPath {
        let relative = match component_type {
            ComponentType::Terraform => &self.components.terraform.base_path,
            ComponentType::Helmfile => &self.components.helmfile.base_path,
        };
        self.base().join(relative)
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions::new(self.settings.list_merge_strategy)
    }

    /// Point this configuration at a copy of the tree rooted elsewhere.
    ///
    /// `base_path` must live under `from`; its position relative to `from`
    /// is preserved under `to`.
    pub fn rebase(&self, from: &Path, to: &Path) -> Result<StrataConfig> {
        let from = NormalizedPath::new(from);
        let base = self.base();
        let relative = base.strip_prefix(&from).ok_or_else(|| Error::InvalidConfig {
            message: format!(
                "base path '{}' is not inside '{}'",
                base.as_str(),
                from.as_str()
            ),
        })?;
        let rebased = if relative.is_empty() {
            NormalizedPath::new(to)
        } else {
            NormalizedPath::new(to).join(relative)
        };
        let mut config = self.clone();
        config.base_path = rebased.to_native();
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.stacks.included_paths.is_empty() {
            return Err(Error::InvalidConfig {
                message: "stacks.included_paths must list at least one pattern".to_string(),
            });
        }
        if self.imports.max_depth == 0 {
            return Err(Error::InvalidConfig {
                message: "imports.max_depth must be greater than zero".to_string(),
            });
        }
        for (alias, store) in &self.stores {
            if store.kind.trim().is_empty() {
                return Err(Error::InvalidConfig {
                    message: format!("store '{alias}' has no type"),
                });
            }
        }
        Ok(())
    }
}
