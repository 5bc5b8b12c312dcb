//! Stack naming context
//!
//! A stack's name is derived from the context tokens in a component's final
//! `vars` (namespace, tenant, environment, stage, region, attributes) using
//! either a token pattern like `{tenant}-{environment}-{stage}` or a template.
//! When neither is configured the manifest's own name is used.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::config::StrataConfig;
use crate::manifest::ManifestFile;
use crate::template::TemplateEngine;
use crate::value::{Mapping, Value};
use crate::{Error, Result};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([A-Za-z_-]+)\}").unwrap());

/// Context tokens a stack name can be built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Context {
    pub namespace: String,
    pub tenant: String,
    pub environment: String,
    pub stage: String,
    pub region: String,
    pub attributes: Vec<String>,
}

impl Context {
    /// Read the context tokens out of a `vars` section.
    ///
    /// Missing or non-scalar values leave the token empty.
    pub fn from_vars(vars: &Mapping) -> Self {
        let text = |key: &str| {
            vars.get(key)
                .filter(|v| !v.is_null())
                .and_then(Value::scalar_string)
                .unwrap_or_default()
        };
        let attributes = vars
            .get("attributes")
            .and_then(Value::as_sequence)
            .map(|items| items.iter().filter_map(Value::scalar_string).collect())
            .unwrap_or_default();
        Self {
            namespace: text("namespace"),
            tenant: text("tenant"),
            environment: text("environment"),
            stage: text("stage"),
            region: text("region"),
            attributes,
        }
    }

    /// The value of a single-valued token, if the name is a context token.
    pub fn token(&self, name: &str) -> Option<&str> {
        match name {
            "namespace" => Some(&self.namespace),
            "tenant" => Some(&self.tenant),
            "environment" => Some(&self.environment),
            "stage" => Some(&self.stage),
            "region" => Some(&self.region),
            _ => None,
        }
    }
}

/// Component-specific values available to token replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentTokens<'a> {
    pub component: &'a str,
    pub base_component: &'a str,
    pub component_path: &'a str,
    pub workspace: &'a str,
}

/// Replace every known `{token}` in `pattern` in a single pass.
///
/// Substituted values are never rescanned. Unknown tokens are left
/// untouched; attributes are joined with `-`.
pub fn replace_context_tokens(context: &Context, tokens: &ComponentTokens<'_>, pattern: &str) -> String {
    let attributes = context.attributes.join("-");
    TOKEN
        .replace_all(pattern, |caps: &Captures<'_>| {
            let value: &str = match &caps[1] {
                "base-component" => tokens.base_component,
                "component" => tokens.component,
                "component-path" => tokens.component_path,
                "workspace" | "terraform_workspace" => tokens.workspace,
                "attributes" => &attributes,
                other => match context.token(other) {
                    Some(value) => value,
                    None => return caps[0].to_string(),
                },
            };
            value.to_string()
        })
        .into_owned()
}

/// Build a stack name from a token pattern.
///
/// Every token the pattern references must be set in the context.
pub fn stack_name_from_pattern(context: &Context, pattern: &str, manifest: &ManifestFile) -> Result<String> {
    for caps in TOKEN.captures_iter(pattern) {
        let token = &caps[1];
        if let Some(value) = context.token(token)
            && value.is_empty()
        {
            return Err(Error::MissingContextToken {
                token: token.to_string(),
                pattern: pattern.to_string(),
                stack: manifest.logical_name().to_string(),
                file: manifest.relative().to_string(),
            });
        }
    }
    Ok(replace_context_tokens(context, &ComponentTokens::default(), pattern))
}

/// How stack names are derived, picked from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackNaming {
    /// Render a template against the component's sections.
    Template(String),
    /// Replace context tokens in a pattern.
    Pattern(String),
    /// Use the manifest's path without its extension.
    Manifest,
}

impl StackNaming {
    /// The template wins over the pattern when both are set.
    pub fn from_config(config: &StrataConfig) -> Self {
        let non_empty = |s: &Option<String>| s.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        if let Some(template) = non_empty(&config.stacks.name_template) {
            StackNaming::Template(template)
        } else if let Some(pattern) = non_empty(&config.stacks.name_pattern) {
            StackNaming::Pattern(pattern)
        } else {
            StackNaming::Manifest
        }
    }

    /// Name the stack a component belongs to.
    ///
    /// `sections` is the component's configuration as template data; only
    /// `vars` is consulted for token patterns.
    pub fn stack_name(
        &self,
        sections: &Mapping,
        manifest: &ManifestFile,
        templates: &dyn TemplateEngine,
    ) -> Result<String> {
        match self {
            StackNaming::Template(template) => {
                let name = templates.render(template, &Value::Mapping(sections.clone()))?;
                Ok(name.trim().to_string())
            }
            StackNaming::Pattern(pattern) => {
                let vars = sections
                    .get("vars")
                    .and_then(Value::as_mapping)
                    .cloned()
                    .unwrap_or_default();
                stack_name_from_pattern(&Context::from_vars(&vars), pattern, manifest)
            }
            StackNaming::Manifest => Ok(manifest.logical_name().to_string()),
        }
    }
}
