//! Deep merge of configuration trees
//!
//! Later inputs win. Mappings merge key by key, scalars are replaced and
//! lists follow the configured [`ListMergeStrategy`]. A `null` coming from a
//! later input never erases an earlier value.
//!
//! Inputs are never mutated and the result shares nothing with them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::{Mapping, Value};
use crate::{Error, Result};

/// How two lists at the same key are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMergeStrategy {
    /// The later list replaces the earlier one.
    #[default]
    Replace,
    /// The later list is appended to the earlier one.
    Append,
    /// Lists merge element by element; extra elements are appended.
    Merge,
}

impl ListMergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListMergeStrategy::Replace => "replace",
            ListMergeStrategy::Append => "append",
            ListMergeStrategy::Merge => "merge",
        }
    }
}

impl fmt::Display for ListMergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListMergeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(ListMergeStrategy::Replace),
            "append" => Ok(ListMergeStrategy::Append),
            "merge" => Ok(ListMergeStrategy::Merge),
            other => Err(Error::InvalidConfig {
                message: format!(
                    "invalid list merge strategy '{other}', expected one of: replace, append, merge"
                ),
            }),
        }
    }
}

/// Options controlling a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub list_strategy: ListMergeStrategy,
}

impl MergeOptions {
    pub fn new(list_strategy: ListMergeStrategy) -> Self {
        Self { list_strategy }
    }
}

/// Merge an ordered list of mappings into a fresh mapping.
///
/// Zero inputs give an empty mapping; one input gives a deep copy of it.
pub fn merge<'a, I>(inputs: I, options: MergeOptions) -> Result<Mapping>
where
    I: IntoIterator<Item = &'a Mapping>,
{
    let mut result = Mapping::new();
    for input in inputs {
        merge_into(&mut result, input, options)?;
    }
    Ok(result)
}

/// Merge `src` on top of `dest` in place.
pub fn merge_into(dest: &mut Mapping, src: &Mapping, options: MergeOptions) -> Result<()> {
    let mut path = Vec::new();
    merge_mapping(dest, src, &mut path, options)
}

fn merge_mapping(
    dest: &mut Mapping,
    src: &Mapping,
    path: &mut Vec<String>,
    options: MergeOptions,
) -> Result<()> {
    for (key, incoming) in src {
        path.push(key.clone());
        match dest.get_mut(key) {
            Some(existing) => merge_value(existing, incoming, path, options)?,
            None => {
                dest.insert(key.clone(), incoming.clone());
            }
        }
        path.pop();
    }
    Ok(())
}

fn merge_value(
    existing: &mut Value,
    incoming: &Value,
    path: &mut Vec<String>,
    options: MergeOptions,
) -> Result<()> {
    match (existing, incoming) {
        (_, Value::Null) => Ok(()),
        (existing @ Value::Null, incoming) => {
            *existing = incoming.clone();
            Ok(())
        }
        (Value::Mapping(dest), Value::Mapping(src)) => merge_mapping(dest, src, path, options),
        (Value::Sequence(dest), Value::Sequence(src)) => {
            merge_sequence(dest, src, path, options)
        }
        (existing, incoming) if existing.is_scalar() && incoming.is_scalar() => {
            *existing = incoming.clone();
            Ok(())
        }
        (existing, incoming) => Err(Error::MergeTypeMismatch {
            path: path.join("."),
            existing: existing.type_name(),
            incoming: incoming.type_name(),
        }),
    }
}

fn merge_sequence(
    dest: &mut Vec<Value>,
    src: &[Value],
    path: &mut Vec<String>,
    options: MergeOptions,
) -> Result<()> {
    match options.list_strategy {
        ListMergeStrategy::Replace => *dest = src.to_vec(),
        ListMergeStrategy::Append => dest.extend(src.iter().cloned()),
        ListMergeStrategy::Merge => {
            for (index, incoming) in src.iter().enumerate() {
                match dest.get_mut(index) {
                    Some(existing @ Value::Mapping(_)) if matches!(incoming, Value::Mapping(_)) => {
                        path.push(index.to_string());
                        merge_value(existing, incoming, path, options)?;
                        path.pop();
                    }
                    Some(existing) => {
                        if !incoming.is_null() {
                            *existing = incoming.clone();
                        }
                    }
                    None => dest.push(incoming.clone()),
                }
            }
        }
    }
    Ok(())
}
