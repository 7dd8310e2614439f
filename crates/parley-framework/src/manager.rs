//! Plugin lifecycle management.
//!
//! [`PluginManager`] owns the set of loaded plugins and is the only writer of
//! plugin handlers into the shared [`Registry`]. It:
//!
//! - Loads packages in manifest order, loading each plugin's declared
//!   dependencies ahead of it ([`load_all`](PluginManager::load_all)).
//! - Guards against dependency cycles and reload storms with an in-progress
//!   map of load-start timestamps.
//! - Commits a plugin's staged handlers only after its `init` returned `Ok`,
//!   and removes all of them on unload.
//! - Garbage-collects plugins that disappeared from the configured packages,
//!   except the default (protected) ones.
//! - Keeps a blacklist, persisted through the [`Persistence`](parley_core::Persistence)
//!   collaborator under `plugins/blacklist`.
//!
//! Every load, unload and reload runs under one re-entrant load lock, so
//! registry readers observe either the state before or after an operation.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = Arc::new(
//!     PluginManager::new(Arc::clone(&registry))
//!         .with_catalog(PluginCatalog::from_linked())
//!         .with_defaults(["core.plug", "core.size"]),
//! );
//! let summary = manager.load_all(&["core".into(), "basic".into()]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::SystemTime;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use parley_core::{
    ChatResult, PluginControl, Registry, ReloadReport, SharedStore, panic_message,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::plugin::{Plugin, PluginCatalog, PluginDescriptor, PluginEnv, PluginLoadContext};

/// Persistence key of the blacklist document.
pub const BLACKLIST_KEY: &str = "plugins/blacklist";

/// What a single load request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// `init` ran and the handlers were committed.
    Loaded,
    /// Already loaded and not forced.
    AlreadyLoaded,
    /// Skipped because the id is blacklisted.
    Blacklisted,
    /// Skipped because a load of the same id is under way higher up the stack.
    InProgress,
}

/// Outcome of [`PluginManager::load_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Ids loaded (or kept) by this batch, in load order.
    pub loaded: Vec<String>,
    /// Ids whose `init` declined with a requirement failure.
    pub skipped: Vec<String>,
    /// `(id, reason)` for every other failure.
    pub errors: Vec<(String, String)>,
    /// Stale ids removed after the batch.
    pub unloaded: Vec<String>,
}

#[derive(Default)]
struct ManagerState {
    loaded: BTreeMap<String, Arc<Plugin>>,
    in_progress: HashMap<String, SystemTime>,
    blacklist: BTreeSet<String>,
}

/// Loads, unloads and reloads plugins.
pub struct PluginManager {
    registry: Arc<Registry>,
    catalog: RwLock<PluginCatalog>,
    state: Mutex<ManagerState>,
    defaults: BTreeSet<String>,
    configs: HashMap<String, Arc<Value>>,
    store: Option<SharedStore>,
    load_lock: ReentrantMutex<()>,
}

impl PluginManager {
    /// Creates a manager writing into `registry`, with an empty catalog.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            catalog: RwLock::new(PluginCatalog::new()),
            state: Mutex::new(ManagerState::default()),
            defaults: BTreeSet::new(),
            configs: HashMap::new(),
            store: None,
            load_lock: ReentrantMutex::new(()),
        }
    }

    pub fn with_catalog(self, catalog: PluginCatalog) -> Self {
        *self.catalog.write() = catalog;
        self
    }

    /// Plugins protected from garbage collection and from `disable`.
    pub fn with_defaults<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defaults = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Per-plugin configuration sections, keyed by plugin id.
    pub fn with_configs(mut self, configs: HashMap<String, Value>) -> Self {
        self.configs = configs
            .into_iter()
            .map(|(id, value)| (id, Arc::new(value)))
            .collect();
        self
    }

    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Seeds the blacklist, e.g. from configuration.
    pub fn with_blacklist<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .blacklist
            .extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn catalog(&self) -> PluginCatalog {
        self.catalog.read().clone()
    }

    /// Replaces the catalog; loaded plugins are untouched.
    pub fn set_catalog(&self, catalog: PluginCatalog) {
        *self.catalog.write() = catalog;
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn is_loaded(&self, id: &str) -> bool {
        self.state.lock().loaded.contains_key(id)
    }

    pub fn loaded_ids(&self) -> Vec<String> {
        self.state.lock().loaded.keys().cloned().collect()
    }

    pub fn plugin(&self, id: &str) -> Option<Arc<Plugin>> {
        self.state.lock().loaded.get(id).cloned()
    }

    pub fn blacklist(&self) -> Vec<String> {
        self.state.lock().blacklist.iter().cloned().collect()
    }

    pub fn in_progress(&self) -> Vec<(String, SystemTime)> {
        self.state
            .lock()
            .in_progress
            .iter()
            .map(|(id, started)| (id.clone(), *started))
            .collect()
    }

    // ─── Blacklist persistence ───────────────────────────────────────────────

    /// Merges the persisted blacklist into the in-memory one.
    pub fn restore_blacklist(&self) -> PluginResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let Some(document) = store.load(BLACKLIST_KEY)? else {
            return Ok(0);
        };
        let ids: Vec<String> = serde_json::from_value(document).unwrap_or_else(|err| {
            warn!(error = %err, "Persisted blacklist is malformed, ignoring");
            Vec::new()
        });
        let count = ids.len();
        self.state.lock().blacklist.extend(ids);
        Ok(count)
    }

    fn save_blacklist(&self) -> PluginResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let document = Value::from(self.blacklist());
        store.save(BLACKLIST_KEY, &document)?;
        Ok(())
    }

    // ─── Loading ─────────────────────────────────────────────────────────────

    /// Loads every plugin of the named packages, then unloads stale plugins.
    ///
    /// Per-plugin failures never abort the batch: requirement failures are
    /// recorded as skipped, anything else as an error.
    pub fn load_all(&self, packages: &[String]) -> LoadSummary {
        let _guard = self.load_lock.lock();
        let mut summary = LoadSummary::default();
        let mut batch = Vec::new();

        for name in packages {
            let Some(package) = self.catalog.read().package(name) else {
                error!(package = %name, "No such plugin package");
                summary
                    .errors
                    .push((name.clone(), PluginError::NoSuchPackage(name.clone()).to_string()));
                continue;
            };
            info!(package = %name, plugins = package.plugins.len(), "Loading plugin package");

            for descriptor in package.plugins {
                match self.load_deps(descriptor.id, false, &mut batch) {
                    Ok(status) => {
                        debug!(plugin = %descriptor.id, status = ?status, "Plugin processed");
                    }
                    Err(err) if err.is_require() => {
                        info!(plugin = %descriptor.id, reason = %err, "Plugin skipped");
                        summary.skipped.push(descriptor.id.to_string());
                    }
                    Err(err) => {
                        error!(plugin = %descriptor.id, error = %err, "Plugin failed to load");
                        summary.errors.push((descriptor.id.to_string(), err.to_string()));
                    }
                }
            }
        }

        let stale: Vec<String> = self
            .state
            .lock()
            .loaded
            .keys()
            .filter(|id| !batch.contains(*id) && !self.defaults.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            info!(plugin = %id, "Unloading stale plugin");
            if let Err(err) = self.unload(&id) {
                warn!(plugin = %id, error = %err, "Stale plugin unload failed");
            }
            summary.unloaded.push(id);
        }

        summary.loaded = batch;
        info!(
            loaded = summary.loaded.len(),
            skipped = summary.skipped.len(),
            errors = summary.errors.len(),
            unloaded = summary.unloaded.len(),
            "Plugin packages loaded"
        );
        summary
    }

    /// Loads the dependencies of `id`, then `id` itself.
    ///
    /// Dependencies are never forced. Every plugin that ends up loaded is
    /// appended to `batch` in load order.
    pub fn load_deps(
        &self,
        id: &str,
        force: bool,
        batch: &mut Vec<String>,
    ) -> PluginResult<LoadStatus> {
        let _guard = self.load_lock.lock();
        let descriptor = self.resolve(id)?;
        if !self.begin(id) {
            return Ok(LoadStatus::InProgress);
        }

        let result = (|| -> PluginResult<LoadStatus> {
            for dependency in descriptor.depends_on {
                self.load_deps(dependency, false, batch)
                    .map_err(|err| PluginError::Dependency {
                        id: id.to_string(),
                        dependency: dependency.to_string(),
                        source: Box::new(err),
                    })?;
            }
            self.load_unit(descriptor, force)
        })();

        self.finish(id);
        if let Ok(LoadStatus::Loaded | LoadStatus::AlreadyLoaded) = result
            && !batch.iter().any(|b| b == id)
        {
            batch.push(id.to_string());
        }
        result
    }

    /// Loads a single plugin without touching its dependencies.
    ///
    /// With `force` an already loaded instance is unloaded and replaced.
    pub fn load_mod(&self, id: &str, force: bool) -> PluginResult<LoadStatus> {
        let _guard = self.load_lock.lock();
        let descriptor = self.resolve(id)?;
        if !self.begin(id) {
            return Ok(LoadStatus::InProgress);
        }
        let result = self.load_unit(descriptor, force);
        self.finish(id);
        result
    }

    /// Reloads `id`, loading missing dependencies on the way.
    pub fn reload_one(&self, id: &str) -> PluginResult<LoadStatus> {
        self.load_deps(id, true, &mut Vec::new())
    }

    fn resolve(&self, id: &str) -> PluginResult<PluginDescriptor> {
        self.catalog
            .read()
            .resolve(id)
            .ok_or_else(|| PluginError::NoSuchPlugin(id.to_string()))
    }

    fn begin(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        if let Some(started) = state.in_progress.get(id) {
            debug!(plugin = %id, since = ?started, "Plugin load already in progress");
            return false;
        }
        state.in_progress.insert(id.to_string(), SystemTime::now());
        true
    }

    fn finish(&self, id: &str) {
        self.state.lock().in_progress.remove(id);
    }

    fn load_unit(&self, descriptor: PluginDescriptor, force: bool) -> PluginResult<LoadStatus> {
        let id = descriptor.id;
        let (blacklisted, loaded) = {
            let state = self.state.lock();
            (state.blacklist.contains(id), state.loaded.contains_key(id))
        };
        if blacklisted {
            info!(plugin = %id, "Plugin is blacklisted, not loading");
            return Ok(LoadStatus::Blacklisted);
        }
        if loaded {
            if !force {
                return Ok(LoadStatus::AlreadyLoaded);
            }
            debug!(plugin = %id, "Reloading plugin, unloading previous instance");
            self.unload_loaded(id);
        }

        let config = self
            .configs
            .get(id)
            .cloned()
            .unwrap_or_else(|| Arc::new(Value::Object(Default::default())));
        let env = Arc::new(PluginEnv::new(id, config, self.store.clone()));
        let mut ctx = PluginLoadContext::new(Arc::clone(&env));

        match catch_unwind(AssertUnwindSafe(|| (descriptor.init)(&mut ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(source)) => return Err(PluginError::from_init(id, source)),
            Err(panic) => {
                return Err(PluginError::Panicked {
                    id: id.to_string(),
                    hook: "init",
                    message: panic_message(panic.as_ref()),
                });
            }
        }

        self.registry.commit(id, ctx.into_registrations());
        self.state
            .lock()
            .loaded
            .insert(id.to_string(), Arc::new(Plugin::new(descriptor, Arc::clone(&env))));

        if let Some(background) = descriptor.background_init {
            let spawned = thread::Builder::new()
                .name(format!("bg-{id}"))
                .spawn(move || {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| background(&env))) {
                        error!(
                            plugin = %env.id(),
                            panic = %panic_message(panic.as_ref()),
                            "Background init panicked"
                        );
                    }
                });
            if let Err(err) = spawned {
                error!(plugin = %id, error = %err, "Cannot spawn background init thread");
            }
        }

        info!(plugin = %id, "Plugin loaded");
        Ok(LoadStatus::Loaded)
    }

    // ─── Unloading ───────────────────────────────────────────────────────────

    /// Runs the plugin's `shutdown` hook and removes all of its handlers.
    ///
    /// Registry entries are purged even when the plugin is not loaded; the
    /// call then fails with [`PluginError::NoSuchPlugin`].
    pub fn unload(&self, id: &str) -> PluginResult<()> {
        let _guard = self.load_lock.lock();
        if self.unload_loaded(id) {
            Ok(())
        } else {
            self.registry.unload(id);
            Err(PluginError::NoSuchPlugin(id.to_string()))
        }
    }

    fn unload_loaded(&self, id: &str) -> bool {
        let Some(plugin) = self.state.lock().loaded.remove(id) else {
            return false;
        };
        if let Some(shutdown) = plugin.descriptor().shutdown {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| shutdown(plugin.env()))) {
                error!(
                    plugin = %id,
                    panic = %panic_message(panic.as_ref()),
                    "Plugin shutdown panicked"
                );
            }
        }
        let removed = self.registry.unload(id);
        info!(plugin = %id, removed, "Plugin unloaded");
        true
    }

    /// Unloads every plugin, dependents first.
    pub fn unload_all(&self) {
        let _guard = self.load_lock.lock();
        let ids: Vec<String> = self.state.lock().loaded.keys().cloned().collect();
        for id in ids.iter().rev() {
            self.unload_loaded(id);
        }
    }

    // ─── Blacklist ───────────────────────────────────────────────────────────

    /// Removes `id` from the blacklist and loads it.
    pub fn enable_plugin(&self, id: &str) -> PluginResult<LoadStatus> {
        let _guard = self.load_lock.lock();
        self.resolve(id)?;
        self.state.lock().blacklist.remove(id);
        self.save_blacklist()?;
        self.load_deps(id, false, &mut Vec::new())
    }

    /// Blacklists `id` and unloads it. Default plugins are refused.
    pub fn disable_plugin(&self, id: &str) -> PluginResult<()> {
        let _guard = self.load_lock.lock();
        if self.defaults.contains(id) {
            return Err(PluginError::Protected(id.to_string()));
        }
        self.state.lock().blacklist.insert(id.to_string());
        self.save_blacklist()?;
        self.unload_loaded(id);
        Ok(())
    }
}

impl PluginControl for PluginManager {
    fn reload(&self, ids: &[String]) -> ReloadReport {
        let mut report = ReloadReport::default();
        for id in ids {
            match self.reload_one(id) {
                Ok(LoadStatus::Blacklisted) => {
                    report.errors.push((id.clone(), "blacklisted".to_string()));
                }
                Ok(_) => report.reloaded.push(id.clone()),
                Err(err) => {
                    warn!(plugin = %id, error = %err, "Reload failed");
                    report.errors.push((id.clone(), err.to_string()));
                }
            }
        }
        report
    }

    fn unload(&self, id: &str) -> ChatResult<()> {
        PluginManager::unload(self, id).map_err(Into::into)
    }

    fn enable(&self, id: &str) -> ChatResult<()> {
        self.enable_plugin(id).map(|_| ()).map_err(Into::into)
    }

    fn disable(&self, id: &str) -> ChatResult<()> {
        self.disable_plugin(id).map_err(Into::into)
    }

    fn loaded(&self) -> Vec<String> {
        self.loaded_ids()
    }

    fn is_default(&self, id: &str) -> bool {
        self.defaults.contains(id)
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("loaded", &self.loaded_ids())
            .field("defaults", &self.defaults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parley_core::{
        BoxError, Callback, ChatError, Command, EventCategory, Morph, Outcome, Persistence, handler,
    };

    use super::*;
    use crate::plugin::PluginPackage;

    fn noop() -> parley_core::HandlerFn {
        handler(|_, _| Ok(Outcome::Handled))
    }

    fn manager_with(packages: &[PluginPackage]) -> PluginManager {
        let mut catalog = PluginCatalog::new();
        for package in packages {
            catalog.register(*package);
        }
        PluginManager::new(Arc::new(Registry::new())).with_catalog(catalog)
    }

    // ─── Idempotent reload ───────────────────────────────────────────────────

    fn echo_init(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
        ctx.command(Command::new("echo", noop()))
            .first(EventCategory::Message, Callback::new("flood", noop()));
        Ok(())
    }

    const ECHO: PluginDescriptor = PluginDescriptor::new("t.echo", echo_init);
    static ECHO_PKG: [PluginDescriptor; 1] = [ECHO];

    #[test]
    fn test_reload_is_idempotent() {
        let manager = manager_with(&[PluginPackage {
            name: "t",
            plugins: &ECHO_PKG,
        }]);
        assert_eq!(manager.load_mod("t.echo", false).unwrap(), LoadStatus::Loaded);
        assert_eq!(
            manager.load_mod("t.echo", false).unwrap(),
            LoadStatus::AlreadyLoaded
        );
        manager.load_mod("t.echo", true).unwrap();
        manager.load_mod("t.echo", true).unwrap();

        let sizes = manager.registry().sizes();
        assert_eq!(sizes.commands, 1);
        assert_eq!(sizes.first, 1);
        assert_eq!(manager.loaded_ids(), vec!["t.echo".to_string()]);
        assert!(manager.in_progress().is_empty());
    }

    fn morph_init(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
        ctx.input_morph(Morph::new("trim", |txt, _| txt.trim().to_string()))
            .output_morph(Morph::new("shout", |txt, _| txt.to_uppercase()));
        Ok(())
    }

    static MORPH_PKG: [PluginDescriptor; 1] = [PluginDescriptor::new("t.morph", morph_init)];

    #[test]
    fn test_morphs_leave_with_their_plugin() {
        let manager = manager_with(&[PluginPackage {
            name: "t",
            plugins: &MORPH_PKG,
        }]);
        manager.load_mod("t.morph", false).unwrap();
        manager.load_mod("t.morph", true).unwrap();
        let view = manager.registry().view();
        assert_eq!(view.input_morphs.len(), 1);
        assert_eq!(view.output_morphs.apply("hi", None), "HI");

        manager.unload("t.morph").unwrap();
        let view = manager.registry().view();
        assert!(view.input_morphs.is_empty());
        assert!(view.output_morphs.is_empty());
    }

    #[test]
    fn test_unknown_plugin() {
        let manager = manager_with(&[]);
        assert!(matches!(
            manager.load_mod("nope", false),
            Err(PluginError::NoSuchPlugin(_))
        ));
        assert!(matches!(
            manager.unload("nope"),
            Err(PluginError::NoSuchPlugin(_))
        ));
    }

    // ─── Dependency order ────────────────────────────────────────────────────

    static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    fn order_a(_: &mut PluginLoadContext) -> Result<(), BoxError> {
        ORDER.lock().push("a");
        Ok(())
    }

    fn order_b(_: &mut PluginLoadContext) -> Result<(), BoxError> {
        ORDER.lock().push("b");
        Ok(())
    }

    static DEPS_PKG: [PluginDescriptor; 2] = [
        PluginDescriptor::new("d.a", order_a).depends_on(&["d.b"]),
        PluginDescriptor::new("d.b", order_b),
    ];

    #[test]
    fn test_dependencies_load_first() {
        let manager = manager_with(&[PluginPackage {
            name: "deps",
            plugins: &DEPS_PKG,
        }]);
        let summary = manager.load_all(&["deps".to_string()]);
        assert_eq!(*ORDER.lock(), vec!["b", "a"]);
        assert_eq!(summary.loaded, vec!["d.b".to_string(), "d.a".to_string()]);
        assert!(summary.errors.is_empty());
    }

    // ─── Cycle guard ─────────────────────────────────────────────────────────

    fn plain(_: &mut PluginLoadContext) -> Result<(), BoxError> {
        Ok(())
    }

    static CYCLE_PKG: [PluginDescriptor; 2] = [
        PluginDescriptor::new("c.one", plain).depends_on(&["c.two"]),
        PluginDescriptor::new("c.two", plain).depends_on(&["c.one"]),
    ];

    #[test]
    fn test_cycle_does_not_recurse() {
        let manager = manager_with(&[PluginPackage {
            name: "cycle",
            plugins: &CYCLE_PKG,
        }]);
        let summary = manager.load_all(&["cycle".to_string()]);
        assert!(manager.is_loaded("c.one"));
        assert!(manager.is_loaded("c.two"));
        assert_eq!(summary.loaded.len(), 2);
        assert!(manager.in_progress().is_empty());
    }

    // ─── Failures ────────────────────────────────────────────────────────────

    fn needs_db(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
        ctx.command(Command::new("query", noop()));
        Err(ChatError::require("no database configured").into())
    }

    fn explodes(_: &mut PluginLoadContext) -> Result<(), BoxError> {
        panic!("init exploded")
    }

    static FAIL_PKG: [PluginDescriptor; 4] = [
        PluginDescriptor::new("f.db", needs_db),
        PluginDescriptor::new("f.boom", explodes),
        PluginDescriptor::new("f.stats", plain).depends_on(&["f.db"]),
        PluginDescriptor::new("f.ok", echo_init),
    ];

    #[test]
    fn test_failures_do_not_abort_batch() {
        let manager = manager_with(&[PluginPackage {
            name: "fail",
            plugins: &FAIL_PKG,
        }]);
        let summary = manager.load_all(&["fail".to_string(), "missing".to_string()]);

        assert_eq!(summary.skipped, vec!["f.db".to_string(), "f.stats".to_string()]);
        let failed: Vec<&str> = summary.errors.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["f.boom", "missing"]);
        assert_eq!(summary.loaded, vec!["f.ok".to_string()]);

        assert!(manager.registry().view().commands.get("query").is_none());
        assert!(manager.registry().view().commands.get("echo").is_some());
    }

    // ─── Garbage collection ──────────────────────────────────────────────────

    static GC_FULL: [PluginDescriptor; 3] = [
        PluginDescriptor::new("g.keep", plain),
        PluginDescriptor::new("g.stale", echo_init),
        PluginDescriptor::new("g.default", plain),
    ];
    static GC_SMALL: [PluginDescriptor; 1] = [PluginDescriptor::new("g.keep", plain)];

    #[test]
    fn test_stale_plugins_are_collected() {
        let manager = manager_with(&[
            PluginPackage {
                name: "full",
                plugins: &GC_FULL,
            },
            PluginPackage {
                name: "small",
                plugins: &GC_SMALL,
            },
        ])
        .with_defaults(["g.default"]);

        manager.load_all(&["full".to_string()]);
        assert_eq!(manager.loaded_ids().len(), 3);

        let summary = manager.load_all(&["small".to_string()]);
        assert_eq!(summary.unloaded, vec!["g.stale".to_string()]);
        assert!(manager.is_loaded("g.keep"));
        assert!(manager.is_loaded("g.default"));
        assert!(manager.registry().view().commands.is_empty());
    }

    // ─── Hooks ───────────────────────────────────────────────────────────────

    static SHUTDOWNS: AtomicUsize = AtomicUsize::new(0);
    static BACKGROUND: AtomicUsize = AtomicUsize::new(0);

    fn count_shutdown(_: &PluginEnv) {
        SHUTDOWNS.fetch_add(1, Ordering::SeqCst);
    }

    fn count_background(env: &PluginEnv) {
        assert_eq!(env.id(), "h.hooks");
        BACKGROUND.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown_panics(_: &PluginEnv) {
        panic!("shutdown exploded")
    }

    static HOOK_PKG: [PluginDescriptor; 2] = [
        PluginDescriptor::new("h.hooks", echo_init)
            .background(count_background)
            .on_shutdown(count_shutdown),
        PluginDescriptor::new("h.bad", plain).on_shutdown(shutdown_panics),
    ];

    #[test]
    fn test_hooks_run_and_panics_are_contained() {
        let manager = manager_with(&[PluginPackage {
            name: "hooks",
            plugins: &HOOK_PKG,
        }]);
        manager.load_all(&["hooks".to_string()]);
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(BACKGROUND.load(Ordering::SeqCst), 1);

        manager.unload("h.hooks").unwrap();
        assert_eq!(SHUTDOWNS.load(Ordering::SeqCst), 1);
        assert!(manager.registry().view().commands.is_empty());

        manager.unload("h.bad").unwrap();
        assert!(!manager.is_loaded("h.bad"));
    }

    // ─── Blacklist ───────────────────────────────────────────────────────────

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<String, Value>>);

    impl Persistence for MapStore {
        fn load(&self, key: &str) -> ChatResult<Option<Value>> {
            Ok(self.0.lock().get(key).cloned())
        }

        fn save(&self, key: &str, document: &Value) -> ChatResult<()> {
            self.0.lock().insert(key.to_string(), document.clone());
            Ok(())
        }

        fn exists(&self, key: &str) -> bool {
            self.0.lock().contains_key(key)
        }
    }

    static BL_PKG: [PluginDescriptor; 2] = [
        PluginDescriptor::new("b.echo", echo_init),
        PluginDescriptor::new("b.core", plain),
    ];

    #[test]
    fn test_blacklist_is_persisted() {
        let store = Arc::new(MapStore::default());
        let manager = manager_with(&[PluginPackage {
            name: "bl",
            plugins: &BL_PKG,
        }])
        .with_defaults(["b.core"])
        .with_store(store.clone());
        manager.load_all(&["bl".to_string()]);

        manager.disable_plugin("b.echo").unwrap();
        assert!(!manager.is_loaded("b.echo"));
        assert_eq!(
            manager.load_mod("b.echo", false).unwrap(),
            LoadStatus::Blacklisted
        );
        assert_eq!(
            store.load(BLACKLIST_KEY).unwrap(),
            Some(Value::from(vec!["b.echo"]))
        );
        assert!(matches!(
            manager.disable_plugin("b.core"),
            Err(PluginError::Protected(_))
        ));

        let restored = manager_with(&[]).with_store(store.clone());
        assert_eq!(restored.restore_blacklist().unwrap(), 1);
        assert_eq!(restored.blacklist(), vec!["b.echo".to_string()]);

        manager.enable_plugin("b.echo").unwrap();
        assert!(manager.is_loaded("b.echo"));
        assert_eq!(store.load(BLACKLIST_KEY).unwrap(), Some(Value::from(Vec::<String>::new())));
    }

    #[test]
    fn test_plugin_control_reload_report() {
        let manager = manager_with(&[PluginPackage {
            name: "fail",
            plugins: &FAIL_PKG,
        }]);
        let report = PluginControl::reload(&manager, &["f.ok".to_string(), "f.boom".to_string()]);
        assert_eq!(report.reloaded, vec!["f.ok".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "f.boom");
    }
}
