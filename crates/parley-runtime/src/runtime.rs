//! Runtime orchestration: plugins, workers and shutdown.
//!
//! The runtime loads the configured plugin packages into one shared
//! [`Registry`], builds a [`DispatchWorker`] per enabled bot using the
//! driver factory registered for its `type`, and boots every worker on its
//! own thread, retrying until it connects.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parley_runtime::ParleyRuntime;
//!
//! // Auto-loads parley.toml from the current directory
//! let runtime = ParleyRuntime::new();
//! runtime.register_driver("console", |bot| Ok(ConsoleDriver::new(bot)));
//! runtime.run().await?;
//!
//! // Custom configuration path
//! let runtime = ParleyRuntime::builder()
//!     .config_file("config/parley.toml")
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;
use parley_core::{
    AliasTable, BoxedDriver, ChatResult, OutputCache, PluginControl, Registry, SharedStore,
};
use parley_framework::{LoadSummary, PluginCatalog, PluginManager};
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{BotConfig, ConfigError, ConfigLoader, ConfigResult, ParleyConfig};
use crate::error::RuntimeResult;
use crate::fleet::Fleet;
use crate::logging;
use crate::store::FileStore;
use crate::worker::{DispatchWorker, ExitOptions, WorkerState};

/// Builds the driver for one bot section.
pub type DriverFactory = Arc<dyn Fn(&BotConfig) -> ChatResult<BoxedDriver> + Send + Sync>;

/// The Parley runtime.
///
/// # Simple Usage
///
/// ```rust,ignore
/// let runtime = ParleyRuntime::new();
/// runtime.register_driver("console", console_driver);
/// runtime.run().await?;
/// ```
pub struct ParleyRuntime {
    config: ParleyConfig,
    registry: Arc<Registry>,
    manager: Arc<PluginManager>,
    store: SharedStore,
    aliases: Arc<AliasTable>,
    output_cache: Arc<OutputCache>,
    fleet: Arc<Fleet>,
    drivers: RwLock<HashMap<String, DriverFactory>>,
    running: AtomicBool,
}

impl ParleyRuntime {
    /// Creates a runtime with automatic configuration loading.
    ///
    /// Searches the current directory for `parley.toml` (or `config.toml`);
    /// falls back to defaults when nothing usable is found.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                ParleyConfig::default()
            });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initializes logging.
    ///
    /// Plugin state is persisted below `global.data_dir`.
    pub fn from_config(config: &ParleyConfig) -> Self {
        let store: SharedStore = Arc::new(FileStore::new(config.global.data_dir.clone()));
        Self::with_store(config, store)
    }

    /// Like [`from_config`](Self::from_config) with a caller-provided store.
    pub fn with_store(config: &ParleyConfig, store: SharedStore) -> Self {
        logging::init_from_config(&config.logging);

        let registry = Arc::new(Registry::new());
        let manager = PluginManager::new(Arc::clone(&registry))
            .with_catalog(PluginCatalog::from_linked())
            .with_defaults(config.global.default_plugins.iter().cloned())
            .with_configs(config.plugins.clone())
            .with_store(Arc::clone(&store))
            .with_blacklist(config.global.blacklist.iter().cloned());

        info!(
            log_level = %config.logging.level,
            bots = config.bots.len(),
            data_dir = %config.global.data_dir.display(),
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            registry,
            manager: Arc::new(manager),
            aliases: Arc::new(AliasTable::with_store(Arc::clone(&store))),
            output_cache: Arc::new(OutputCache::new()),
            store,
            fleet: Fleet::new(),
            drivers: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    pub fn fleet(&self) -> &Arc<Fleet> {
        &self.fleet
    }

    /// Alias table shared by every worker.
    pub fn aliases(&self) -> &Arc<AliasTable> {
        &self.aliases
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Registers the driver factory used for bots of type `kind`.
    ///
    /// ```rust,ignore
    /// runtime.register_driver("console", |bot| Ok(Arc::new(ConsoleDriver::new(bot)) as BoxedDriver));
    /// ```
    pub fn register_driver<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&BotConfig) -> ChatResult<BoxedDriver> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(driver = %kind, "Driver registered");
        self.drivers.write().insert(kind, Arc::new(factory));
    }

    // =========================================================================
    // Plugins
    // =========================================================================

    /// Restores the persisted blacklist and aliases, then loads the
    /// configured packages.
    pub fn load_plugins(&self) -> LoadSummary {
        match self.manager.restore_blacklist() {
            Ok(0) => {}
            Ok(count) => info!(count, "Restored plugin blacklist"),
            Err(err) => warn!(error = %err, "Cannot restore plugin blacklist"),
        }
        match self.aliases.restore() {
            Ok(0) => {}
            Ok(count) => info!(count, "Restored aliases"),
            Err(err) => warn!(error = %err, "Cannot restore aliases"),
        }

        let summary = self.manager.load_all(&self.config.global.plugin_packages);
        for (id, reason) in &summary.errors {
            error!(plugin = %id, reason = %reason, "Plugin failed to load");
        }
        info!(
            loaded = summary.loaded.len(),
            skipped = summary.skipped.len(),
            failed = summary.errors.len(),
            "Plugins loaded"
        );
        summary
    }

    // =========================================================================
    // Workers
    // =========================================================================

    fn build_worker(&self, bot: &BotConfig) -> RuntimeResult<Arc<DispatchWorker>> {
        let factory = self
            .drivers
            .read()
            .get(&bot.kind)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDriver {
                bot: bot.name.clone(),
                kind: bot.kind.clone(),
            })?;
        let driver = factory(bot)?;

        Ok(DispatchWorker::builder(bot.clone(), driver)
            .global(self.config.global.clone())
            .registry(Arc::clone(&self.registry))
            .store(Arc::clone(&self.store))
            .aliases(Arc::clone(&self.aliases))
            .output_cache(Arc::clone(&self.output_cache))
            .plugins(Arc::clone(&self.manager) as Arc<dyn PluginControl>)
            .build())
    }

    /// Builds a worker for `bot`, adds it to the fleet and boots it.
    pub fn add_bot(&self, bot: &BotConfig) -> RuntimeResult<Arc<DispatchWorker>> {
        let worker = self.build_worker(bot)?;
        self.fleet.register(Arc::clone(&worker))?;
        self.boot(&worker);
        Ok(worker)
    }

    /// Stops the named worker and removes it from the fleet.
    pub fn remove_bot(&self, name: &str) -> RuntimeResult<()> {
        let worker = self.fleet.get(name)?;
        worker.exit(ExitOptions::quit());
        Ok(())
    }

    /// Starts [`DispatchWorker::start`] on a boot thread, retrying every
    /// `global.boot_retry_secs` until it connects or the worker is stopped.
    fn boot(&self, worker: &Arc<DispatchWorker>) -> Option<JoinHandle<()>> {
        let worker = Arc::clone(worker);
        let retry = self.config.global.boot_retry();
        let name = worker.config().name.clone();
        let spawned = thread::Builder::new()
            .name(format!("{name}-boot"))
            .spawn(move || {
                while worker.state() != WorkerState::Stopped {
                    match worker.start(true) {
                        Ok(()) => return,
                        Err(err) if err.is_startup() => error!(
                            bot = %worker.config().name,
                            error = %err,
                            retry_secs = retry.as_secs(),
                            "Worker is not startable, retrying"
                        ),
                        Err(err) => warn!(
                            bot = %worker.config().name,
                            error = %err,
                            retry_secs = retry.as_secs(),
                            "Worker failed to start, retrying"
                        ),
                    }
                    if !worker.pause_unless_stopped(retry) {
                        break;
                    }
                }
                debug!(bot = %worker.config().name, "Boot abandoned, worker stopped");
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(bot = %name, error = %err, "Cannot spawn boot thread");
                None
            }
        }
    }

    /// Loads plugins and boots a worker for every enabled bot.
    pub fn start(&self) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Runtime is already running");
            return Ok(());
        }
        info!("Starting Parley runtime");

        self.load_plugins();
        for bot in self.config.bots.iter().filter(|b| b.enabled) {
            if let Err(err) = self.add_bot(bot) {
                self.running.store(false, Ordering::SeqCst);
                return Err(err);
            }
        }
        for bot in self.config.bots.iter().filter(|b| !b.enabled) {
            debug!(bot = %bot.name, "Bot disabled, not started");
        }

        info!(workers = self.fleet.len(), "Runtime started");
        Ok(())
    }

    /// Stops every worker and unloads all plugins.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Runtime is not running");
            return;
        }
        info!("Stopping Parley runtime");
        self.fleet.shutdown_all();
        if let Err(err) = self.aliases.save() {
            warn!(error = %err, "Cannot save aliases");
        }
        self.manager.unload_all();
        info!("Runtime stopped");
    }

    /// Runs until Ctrl+C, SIGTERM, or the last worker quitting.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start()?;
        info!("Parley runtime is now running. Press Ctrl+C to stop.");

        tokio::select! {
            _ = wait_for_signal() => {}
            _ = self.fleet.wait_shutdown() => {
                info!("All workers quit, shutting down");
            }
        }

        self.stop();
        Ok(())
    }

    /// Runs until `shutdown` resolves or the last worker quits.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.start()?;

        tokio::select! {
            _ = shutdown => {}
            _ = self.fleet.wait_shutdown() => {
                info!("All workers quit, shutting down");
            }
        }

        self.stop();
        Ok(())
    }
}

impl Default for ParleyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "Cannot register SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => error!(error = %err, "Cannot listen for Ctrl+C"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a `ParleyRuntime` with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = ParleyRuntime::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables `PARLEY_*` environment overrides (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> ConfigResult<ParleyRuntime> {
        let config = self.config_loader.load()?;
        Ok(ParleyRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::RuntimeError;
    use crate::store::MemoryStore;
    use crate::testing::{ScriptedDriver, eventually};

    fn config_with_bot(kind: &str) -> ParleyConfig {
        let mut bot = BotConfig::new("main", kind);
        bot.owner = vec!["root@host".into()];
        bot.benice_ms = 0;
        bot.ping_grace_secs = 3600;

        let mut config = ParleyConfig::default();
        config.global.plugin_packages = Vec::new();
        config.global.boot_retry_secs = 1;
        config.bots.push(bot);
        config
    }

    fn runtime(config: &ParleyConfig) -> ParleyRuntime {
        ParleyRuntime::with_store(config, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let runtime = runtime(&config_with_bot("irc"));
        let err = runtime.start().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::UnknownDriver { ref kind, .. }) if kind == "irc"
        ));
        assert!(!runtime.is_running());
    }

    #[test]
    fn test_start_and_stop_workers() {
        let runtime = runtime(&config_with_bot("scripted"));
        let driver = ScriptedDriver::new();
        let shared = Arc::clone(&driver);
        runtime.register_driver("scripted", move |_| Ok(Arc::clone(&shared) as BoxedDriver));

        runtime.start().unwrap();
        let worker = runtime.fleet().get("main").unwrap();
        assert!(eventually(Duration::from_secs(5), || {
            worker.state() == WorkerState::Connected
        }));
        assert_eq!(driver.connects(), 1);

        runtime.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(!runtime.is_running());
    }

    #[test]
    fn test_disabled_bots_are_skipped() {
        let mut config = config_with_bot("scripted");
        config.bots[0].enabled = false;
        let runtime = runtime(&config);
        runtime.register_driver("scripted", |_| Ok(ScriptedDriver::new() as BoxedDriver));
        runtime.start().unwrap();
        assert!(runtime.fleet().is_empty());
        runtime.stop();
    }

    #[test]
    fn test_boot_retries_until_plugins_attached() {
        let config = config_with_bot("scripted");
        let runtime = runtime(&config);
        let driver = ScriptedDriver::new();
        let worker = DispatchWorker::builder(
            config.bots[0].clone(),
            Arc::clone(&driver) as BoxedDriver,
        )
        .global(config.global.clone())
        .registry(Arc::clone(runtime.registry()))
        .build();

        runtime.boot(&worker);
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(driver.connects(), 0);

        worker.set_plugins(Arc::clone(runtime.plugins()) as Arc<dyn PluginControl>);
        assert!(eventually(Duration::from_secs(5), || {
            worker.state() == WorkerState::Connected
        }));
        worker.exit(ExitOptions::default());
    }

    #[test]
    fn test_boot_gives_up_once_stopped() {
        let mut config = config_with_bot("scripted");
        config.global.boot_retry_secs = 60;
        let runtime = runtime(&config);
        let driver = ScriptedDriver::new();
        let worker = DispatchWorker::builder(
            config.bots[0].clone(),
            Arc::clone(&driver) as BoxedDriver,
        )
        .global(config.global.clone())
        .build();

        let boot = runtime.boot(&worker).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let started = std::time::Instant::now();
        worker.exit(ExitOptions::default());
        boot.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(driver.connects(), 0);
    }

    #[test]
    fn test_aliases_persist_across_runs() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let config = config_with_bot("scripted");
        let first = ParleyRuntime::with_store(&config, Arc::clone(&store));
        first.register_driver("scripted", |_| Ok(ScriptedDriver::new() as BoxedDriver));
        first.start().unwrap();
        first.aliases().set("hi", "echo hello");
        first.stop();

        let second = ParleyRuntime::with_store(&config, store);
        second.load_plugins();
        assert_eq!(second.aliases().get("hi").as_deref(), Some("echo hello"));
    }

    #[tokio::test]
    async fn test_run_until_last_worker_quits() {
        let runtime = runtime(&config_with_bot("scripted"));
        runtime.register_driver("scripted", |_| Ok(ScriptedDriver::new() as BoxedDriver));

        let run = runtime.run_until(std::future::pending());
        let quit = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            runtime.remove_bot("main").unwrap();
        };
        let (result, ()) = tokio::join!(run, quit);
        result.unwrap();
        assert!(runtime.fleet().is_empty());
        assert!(!runtime.is_running());
    }
}
