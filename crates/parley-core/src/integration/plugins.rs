//! Plugin control exposed to operator commands.

use crate::error::ChatResult;

/// Outcome of a batch reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    /// Plugin ids that reloaded successfully.
    pub reloaded: Vec<String>,
    /// `(id, reason)` for every plugin that failed.
    pub errors: Vec<(String, String)>,
}

impl ReloadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Implemented by the plugin manager so handlers can drive it.
pub trait PluginControl: Send + Sync {
    /// Force-reloads every id in order.
    fn reload(&self, ids: &[String]) -> ReloadReport;

    /// Unloads a plugin.
    fn unload(&self, id: &str) -> ChatResult<()>;

    /// Removes `id` from the blacklist and loads it.
    fn enable(&self, id: &str) -> ChatResult<()>;

    /// Blacklists `id` and unloads it.
    fn disable(&self, id: &str) -> ChatResult<()>;

    /// Sorted ids of loaded plugins.
    fn loaded(&self) -> Vec<String>;

    /// Whether `id` is protected from removal.
    fn is_default(&self, id: &str) -> bool;
}
