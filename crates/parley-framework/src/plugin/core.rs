use std::sync::Arc;
use std::time::SystemTime;

use parley_core::{Callback, Command, EventCategory, Morph, Registrations, SharedStore};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::descriptor::PluginDescriptor;

// ─── PluginEnv ────────────────────────────────────────────────────────────────

/// What a plugin's hooks can see of the runtime.
///
/// Holds the plugin's configuration section (`plugins.<id>` in the config
/// file, or `null`) and the persistence collaborator, if any.
#[derive(Clone)]
pub struct PluginEnv {
    id: &'static str,
    config: Arc<Value>,
    store: Option<SharedStore>,
}

impl PluginEnv {
    pub(crate) fn new(id: &'static str, config: Arc<Value>, store: Option<SharedStore>) -> Self {
        Self { id, config, store }
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Deserialises the config section into `T`.
    ///
    /// Use `#[serde(default)]` on `T` to make an absent section acceptable.
    pub fn get_config<T>(&self) -> serde_json::Result<T>
    where
        T: DeserializeOwned,
    {
        T::deserialize(self.config.as_ref())
    }

    pub fn store(&self) -> Option<&SharedStore> {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for PluginEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEnv")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

// ─── PluginLoadContext ────────────────────────────────────────────────────────

/// Passed to a plugin's `init` hook.
///
/// Handlers registered here are staged; they become visible in the shared
/// registry only once `init` returned `Ok`.
#[derive(Debug)]
pub struct PluginLoadContext {
    env: Arc<PluginEnv>,
    registrations: Registrations,
}

impl PluginLoadContext {
    pub(crate) fn new(env: Arc<PluginEnv>) -> Self {
        Self {
            env,
            registrations: Registrations::new(),
        }
    }

    pub fn env(&self) -> &PluginEnv {
        &self.env
    }

    pub fn get_config<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        self.env.get_config()
    }

    pub fn first(&mut self, category: EventCategory, callback: Callback) -> &mut Self {
        self.registrations.first(category, callback);
        self
    }

    pub fn main(&mut self, category: EventCategory, callback: Callback) -> &mut Self {
        self.registrations.main(category, callback);
        self
    }

    pub fn last(&mut self, category: EventCategory, callback: Callback) -> &mut Self {
        self.registrations.last(category, callback);
        self
    }

    pub fn remote(&mut self, category: EventCategory, callback: Callback) -> &mut Self {
        self.registrations.remote(category, callback);
        self
    }

    pub fn command(&mut self, command: Command) -> &mut Self {
        self.registrations.command(command);
        self
    }

    pub fn input_morph(&mut self, morph: Morph) -> &mut Self {
        self.registrations.input_morph(morph);
        self
    }

    pub fn output_morph(&mut self, morph: Morph) -> &mut Self {
        self.registrations.output_morph(morph);
        self
    }

    pub(crate) fn into_registrations(self) -> Registrations {
        self.registrations
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

/// A loaded plugin.
#[derive(Debug)]
pub struct Plugin {
    descriptor: PluginDescriptor,
    env: Arc<PluginEnv>,
    loaded_at: SystemTime,
}

impl Plugin {
    pub(crate) fn new(descriptor: PluginDescriptor, env: Arc<PluginEnv>) -> Self {
        Self {
            descriptor,
            env,
            loaded_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> &'static str {
        self.descriptor.id
    }

    pub fn depends_on(&self) -> &'static [&'static str] {
        self.descriptor.depends_on
    }

    pub fn descriptor(&self) -> PluginDescriptor {
        self.descriptor
    }

    pub fn env(&self) -> &Arc<PluginEnv> {
        &self.env
    }

    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }
}
