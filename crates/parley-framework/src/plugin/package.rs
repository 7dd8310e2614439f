//! Plugin packages and the catalog resolving plugin ids.
//!
//! A package is a named, ordered list of plugin descriptors. Packages declared
//! with [`plugin_package!`](crate::plugin_package) are collected at link time
//! into [`PLUGIN_PACKAGES`]; [`PluginCatalog::from_linked`] picks them up.

use std::collections::BTreeMap;

use linkme::distributed_slice;
use tracing::warn;

use super::descriptor::PluginDescriptor;

/// A named manifest of plugins, loaded in declaration order.
#[derive(Debug, Clone, Copy)]
pub struct PluginPackage {
    pub name: &'static str,
    pub plugins: &'static [PluginDescriptor],
}

/// Every package linked into the binary.
#[distributed_slice]
pub static PLUGIN_PACKAGES: [PluginPackage];

/// Package and plugin lookup.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    packages: BTreeMap<&'static str, PluginPackage>,
    plugins: BTreeMap<&'static str, PluginDescriptor>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog of every linked package.
    pub fn from_linked() -> Self {
        let mut catalog = Self::new();
        for package in PLUGIN_PACKAGES.iter() {
            catalog.register(*package);
        }
        catalog
    }

    /// Adds or replaces a package.
    pub fn register(&mut self, package: PluginPackage) {
        for plugin in package.plugins {
            if let Some(prev) = self.plugins.insert(plugin.id, *plugin)
                && !std::ptr::fn_addr_eq(prev.init, plugin.init)
            {
                warn!(plugin = %plugin.id, package = %package.name, "Plugin id declared twice, last wins");
            }
        }
        self.packages.insert(package.name, package);
    }

    pub fn package(&self, name: &str) -> Option<PluginPackage> {
        self.packages.get(name).copied()
    }

    pub fn resolve(&self, id: &str) -> Option<PluginDescriptor> {
        self.plugins.get(id).copied()
    }

    pub fn package_names(&self) -> Vec<&'static str> {
        self.packages.keys().copied().collect()
    }
}
