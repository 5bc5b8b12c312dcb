//! Where a resolved value came from

use serde::Serialize;

use crate::component::ComponentType;
use crate::manifest::ManifestFragment;
use crate::value::Value;

use super::InheritanceChain;

/// How the contributing manifest is related to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    /// The top-level manifest itself.
    Inline,
    /// A manifest reached through `import`.
    Import,
}

/// One manifest location that sets the traced value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvenanceEntry {
    /// Manifest path relative to the stacks directory.
    pub file: String,
    /// Section the value was found in, e.g. `components.terraform.vpc.vars`.
    pub section: String,
    pub value: Value,
    pub dependency: DependencyType,
}

/// Every manifest location contributing `section.key` to a component,
/// highest precedence first.
///
/// Levels are walked own component, bases (highest first), component type,
/// then stack-wide. Within a level the top-level manifest comes first,
/// followed by imports from last merged to first merged. `key` may be a
/// dotted path into the section.
pub fn trace_sources(
    fragments: &[ManifestFragment],
    component_type: ComponentType,
    chain: &InheritanceChain,
    section: &str,
    key: &str,
) -> Vec<ProvenanceEntry> {
    let kind = component_type.as_str();
    let key_path: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();

    let inheritance = chain.inheritance();
    let names = std::iter::once(chain.component()).chain(inheritance.iter().map(String::as_str));

    let mut levels: Vec<(String, Vec<&str>)> = Vec::new();
    for name in names {
        levels.push((
            format!("components.{kind}.{name}.{section}"),
            vec!["components", kind, name, section],
        ));
    }
    levels.push((format!("{kind}.{section}"), vec![kind, section]));
    levels.push((section.to_string(), vec![section]));

    let mut entries = Vec::new();
    for (label, prefix) in &levels {
        let path: Vec<&str> = prefix.iter().chain(key_path.iter()).copied().collect();
        for fragment in fragments.iter().rev() {
            let Some(value) = fragment.content.get(path[0]).and_then(|v| v.get_path(&path[1..])) else {
                continue;
            };
            let entry = ProvenanceEntry {
                file: fragment.file.relative().to_string(),
                section: label.clone(),
                value: value.clone(),
                dependency: if fragment.is_root() {
                    DependencyType::Inline
                } else {
                    DependencyType::Import
                },
            };
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
    }
    entries
}
