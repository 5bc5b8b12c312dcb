//! Engine configuration
//!
//! [`StrataConfig`] tells the engine where stacks and components live and
//! how stack names are derived. [`ConfigLoader`] builds one from layered
//! `strata.yaml` files, `STRATA_*` environment variables and explicit
//! overrides.

mod loader;
mod settings;

pub use loader::{CONFIG_FILE_NAME, ConfigLoader, ConfigOverrides};
pub use settings::{
    ComponentTypeConfig, ComponentsConfig, FunctionsConfig, ImportsConfig, SettingsConfig,
    StacksConfig, StoreConfig, StrataConfig,
};
