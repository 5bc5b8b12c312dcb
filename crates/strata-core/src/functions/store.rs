//! Named stores for `!store`

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::CollaboratorError;
use crate::value::{Mapping, Value};
use crate::{Error, Result};

use super::collaborators::Store;

/// Stores by alias.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: BTreeMap<String, Arc<dyn Store>>,
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("aliases", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build stores from configuration. Only the `static` type is built in.
    pub fn from_config(stores: &BTreeMap<String, StoreConfig>) -> Result<Self> {
        let mut registry = Self::new();
        for (alias, config) in stores {
            match config.kind.as_str() {
                "static" => {
                    let store = StaticStore::from_options(&config.options).map_err(|message| {
                        Error::InvalidConfig {
                            message: format!("store '{alias}': {message}"),
                        }
                    })?;
                    registry.register(alias.clone(), Arc::new(store));
                }
                other => {
                    return Err(Error::InvalidConfig {
                        message: format!("store '{alias}' has unsupported type '{other}'"),
                    });
                }
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, alias: impl Into<String>, store: Arc<dyn Store>) {
        self.stores.insert(alias.into(), store);
    }

    pub fn get(&self, alias: &str) -> Option<&Arc<dyn Store>> {
        self.stores.get(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }
}

/// A store backed by a fixed map of `stack -> component -> key -> value`.
#[derive(Debug, Clone, Default)]
pub struct StaticStore {
    data: Mapping,
}

impl StaticStore {
    pub fn new(data: Mapping) -> Self {
        Self { data }
    }

    fn from_options(options: &serde_yaml::Value) -> std::result::Result<Self, String> {
        let options = Value::from_yaml(options.clone());
        match options.get("data") {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Mapping(data)) => Ok(Self::new(data.clone())),
            Some(other) => Err(format!("'data' must be a map, found {}", other.type_name())),
        }
    }
}

impl Store for StaticStore {
    fn get(&self, stack: &str, component: &str, key: &str) -> std::result::Result<Value, CollaboratorError> {
        self.data
            .get(stack)
            .and_then(|s| s.get_path(&[component, key]))
            .cloned()
            .ok_or_else(|| {
                format!("key '{key}' not found for component '{component}' in stack '{stack}'").into()
            })
    }
}
