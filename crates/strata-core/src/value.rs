//! Configuration value tree
//!
//! Manifests are parsed into [`Value`], a YAML-shaped tree with string keys
//! and sorted mappings. Sorting keeps merge output, serialization and
//! equality independent of the order keys appeared in source files.
//!
//! Custom YAML tags (`!exec ls`, `!env HOME`) survive parsing as plain
//! strings prefixed with the tag, so function calls can be detected after
//! all merging is done.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A mapping with ordered string keys.
pub type Mapping = BTreeMap<String, Value>;

/// A node in a configuration tree.
///
/// Floats compare by bit pattern, so `.nan` equals itself and a tree is
/// always equal to its own clone.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(Mapping),
}

impl Value {
    /// Parse YAML text into a value tree.
    pub fn parse_yaml(text: &str) -> Result<Value, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let mut raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        raw.apply_merge()?;
        Ok(Value::from_yaml(raw))
    }

    /// Convert a `serde_yaml` tree, flattening custom tags into strings.
    pub fn from_yaml(raw: serde_yaml::Value) -> Value {
        use serde_yaml::Value as Y;
        match raw {
            Y::Null => Value::Null,
            Y::Bool(b) => Value::Bool(b),
            Y::Number(n) => number_from_yaml(&n),
            Y::String(s) => Value::String(s),
            Y::Sequence(items) => Value::Sequence(items.into_iter().map(Value::from_yaml).collect()),
            Y::Mapping(map) => Value::Mapping(
                map.into_iter()
                    .map(|(k, v)| (yaml_key(k), Value::from_yaml(v)))
                    .collect(),
            ),
            Y::Tagged(tagged) => {
                let tag = tagged.tag.to_string();
                match Value::from_yaml(tagged.value) {
                    Value::Null => Value::String(tag),
                    Value::String(s) if s.is_empty() => Value::String(tag),
                    Value::String(s) => Value::String(format!("{tag} {s}")),
                    Value::Bool(b) => Value::String(format!("{tag} {b}")),
                    Value::Int(i) => Value::String(format!("{tag} {i}")),
                    Value::Float(f) => Value::String(format!("{tag} {f}")),
                    // Tags on collections carry no function semantics.
                    other => other,
                }
            }
        }
    }

    /// Convert a JSON tree.
    pub fn from_json(raw: serde_json::Value) -> Value {
        use serde_json::Value as J;
        match raw {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Value::String(s),
            J::Array(items) => Value::Sequence(items.into_iter().map(Value::from_json).collect()),
            J::Object(map) => Value::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render as a YAML document.
    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Short name of the value's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "list",
            Value::Mapping(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Sequence(_) | Value::Mapping(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a key when this value is a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// Follow a path of mapping keys. Numeric segments index into lists.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            let segment = segment.as_ref();
            current = match current {
                Value::Mapping(m) => m.get(segment)?,
                Value::Sequence(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Render a scalar the way it would appear in a YAML document.
    ///
    /// Returns `None` for collections.
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Sequence(_) | Value::Mapping(_) => None,
        }
    }

    /// Decode `text` as JSON if it parses, otherwise keep it as a string.
    pub fn from_json_or_string(text: &str) -> Value {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => Value::from_json(json),
            Err(_) => Value::String(text.to_string()),
        }
    }
}

fn number_from_yaml(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match Value::from_yaml(key) {
        Value::Null => "null".to_string(),
        // Keys are scalars in every manifest we accept; a collection key is
        // kept readable rather than rejected.
        other => other
            .scalar_string()
            .unwrap_or_else(|| serde_json::to_string(&other).unwrap_or_default()),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Mapping(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scalar_string() {
            Some(s) => f.write_str(&s),
            None => match serde_json::to_string(self) {
                Ok(s) => f.write_str(&s),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Mapping> for Value {
    fn from(m: Mapping) -> Self {
        Value::Mapping(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}
