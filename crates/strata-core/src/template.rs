//! Template rendering
//!
//! Templates show up in three places: import contexts rendered into the
//! imported manifest, `stacks.name_template`, and the `!template` function.
//! All three go through [`TemplateEngine`] so callers can plug in a richer
//! engine. The built-in [`PathTemplateEngine`] understands field lookups of
//! the form `{{ .vars.stage }}`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::value::Value;
use crate::{Error, Result};

pub trait TemplateEngine: Send + Sync {
    /// Render `template` against `data`.
    fn render(&self, template: &str, data: &Value) -> Result<String>;
}

static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{-?\s*(.*?)\s*-?\}\}").unwrap());

static FIELD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.([A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*)?$").unwrap()
});

/// Renders `{{ .a.b }}` field lookups.
///
/// A missing field is an error. Maps and lists render as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathTemplateEngine;

impl PathTemplateEngine {
    fn lookup<'a>(expr: &str, data: &'a Value) -> Result<&'a Value> {
        if !FIELD_PATH.is_match(expr) {
            return Err(Error::Template {
                message: format!("unsupported template expression '{expr}'"),
            });
        }
        let path: Vec<&str> = expr.split('.').filter(|s| !s.is_empty()).collect();
        data.get_path(&path).ok_or_else(|| Error::Template {
            message: format!("map has no entry for '{expr}'"),
        })
    }
}

impl TemplateEngine for PathTemplateEngine {
    fn render(&self, template: &str, data: &Value) -> Result<String> {
        let mut failure = None;
        let rendered = ACTION.replace_all(template, |caps: &Captures<'_>| {
            match Self::lookup(caps[1].trim(), data) {
                Ok(value) => value.to_string(),
                Err(e) => {
                    failure.get_or_insert(e);
                    String::new()
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(rendered.into_owned()),
        }
    }
}

/// Whether the text contains template actions at all.
pub fn has_template_actions(text: &str) -> bool {
    ACTION.is_match(text)
}
