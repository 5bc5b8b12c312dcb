//! Component types and the resolved component configuration

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::value::{Mapping, Value};
use crate::{Error, Result};

/// Sections that hold component data and may contain function calls.
pub const DATA_SECTIONS: [&str; 6] = ["vars", "env", "settings", "backend", "providers", "metadata"];

/// The kind of provisioning tool a component belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Terraform,
    Helmfile,
}

impl ComponentType {
    pub const ALL: [ComponentType; 2] = [ComponentType::Terraform, ComponentType::Helmfile];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Terraform => "terraform",
            ComponentType::Helmfile => "helmfile",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "terraform" => Ok(ComponentType::Terraform),
            "helmfile" => Ok(ComponentType::Helmfile),
            other => Err(Error::InvalidConfig {
                message: format!("unknown component type '{other}'"),
            }),
        }
    }
}

/// A component instance in one stack, after inheritance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentConfig {
    /// Instance name under `components.<type>`.
    pub name: String,
    pub component_type: ComponentType,
    pub stack: String,
    /// Top-level manifest, relative to the stacks directory.
    pub stack_file: String,
    /// Folder holding the component's code, relative to the type's base path.
    pub folder: String,
    pub vars: Mapping,
    pub env: Mapping,
    pub settings: Mapping,
    pub backend_type: Option<String>,
    pub backend: Mapping,
    pub providers: Mapping,
    pub metadata: Mapping,
    /// Base components, highest precedence first.
    pub inheritance: Vec<String>,
    /// Every manifest merged into the stack, in merge order.
    pub imports: Vec<String>,
    pub workspace: Option<String>,
}

impl ComponentConfig {
    /// Abstract components are blueprints and are never provisioned.
    pub fn is_abstract(&self) -> bool {
        self.metadata.get("type").and_then(Value::as_str) == Some("abstract")
    }

    pub fn is_enabled(&self) -> bool {
        self.metadata.get("enabled").and_then(Value::as_bool) != Some(false)
    }

    /// Context tokens carried in `vars`.
    pub fn context(&self) -> Context {
        Context::from_vars(&self.vars)
    }

    pub fn section(&self, name: &str) -> Option<&Mapping> {
        match name {
            "vars" => Some(&self.vars),
            "env" => Some(&self.env),
            "settings" => Some(&self.settings),
            "backend" => Some(&self.backend),
            "providers" => Some(&self.providers),
            "metadata" => Some(&self.metadata),
            _ => None,
        }
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut Mapping> {
        match name {
            "vars" => Some(&mut self.vars),
            "env" => Some(&mut self.env),
            "settings" => Some(&mut self.settings),
            "backend" => Some(&mut self.backend),
            "providers" => Some(&mut self.providers),
            "metadata" => Some(&mut self.metadata),
            _ => None,
        }
    }

    /// The configuration as it is compared between revisions.
    ///
    /// Leaves out where the component was declared, so moving a
    /// definition between files is not a change.
    pub fn comparable(&self) -> Mapping {
        let mut map = Mapping::new();
        for name in DATA_SECTIONS {
            if let Some(section) = self.section(name) {
                map.insert(name.to_string(), Value::Mapping(section.clone()));
            }
        }
        if let Some(ref backend_type) = self.backend_type {
            map.insert("backend_type".into(), Value::from(backend_type.as_str()));
        }
        map.insert("component".into(), Value::from(self.folder.as_str()));
        if let Some(ref workspace) = self.workspace {
            map.insert("workspace".into(), Value::from(workspace.as_str()));
        }
        map
    }

    /// Full output form of the component.
    pub fn to_mapping(&self) -> Mapping {
        let mut map = self.comparable();
        map.insert("stack".into(), Value::from(self.stack.as_str()));
        map.insert("stack_file".into(), Value::from(self.stack_file.as_str()));
        map.insert(
            "inheritance".into(),
            Value::Sequence(self.inheritance.iter().map(|s| Value::from(s.as_str())).collect()),
        );
        map.insert(
            "imports".into(),
            Value::Sequence(self.imports.iter().map(|s| Value::from(s.as_str())).collect()),
        );
        map
    }

    /// Project the output form onto the requested top-level keys.
    pub fn project(&self, sections: &[String]) -> Mapping {
        let full = self.to_mapping();
        if sections.is_empty() {
            return full;
        }
        full.into_iter()
            .filter(|(key, _)| sections.iter().any(|s| s == key))
            .collect()
    }
}
