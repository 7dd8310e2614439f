//! # Parley Framework
//!
//! Plugin units and the plugin manager.
//!
//! This layer provides:
//! - Static plugin descriptors with plain `fn` hooks ([`PluginDescriptor`])
//! - Link-time plugin packages ([`plugin_package!`], [`PluginCatalog`])
//! - Dependency-ordered loading, hot reload and unload ([`PluginManager`])
//! - Operator plugins `core.plug`, `core.size`, `core.alias` and `core.more`
//!   (with the `builtin` feature)
//!
//! Plugins register their handlers into the [`Registry`](parley_core::Registry)
//! shared by every worker; the manager removes them again on unload.

pub mod error;
pub mod manager;
pub mod plugin;

#[cfg(test)]
pub(crate) mod testing;

#[doc(hidden)]
pub use linkme;

pub use error::{PluginError, PluginResult};
pub use manager::{BLACKLIST_KEY, LoadStatus, LoadSummary, PluginManager};
pub use plugin::{
    HookFn, InitFn, PLUGIN_PACKAGES, Plugin, PluginCatalog, PluginDescriptor, PluginEnv,
    PluginLoadContext, PluginPackage,
};
