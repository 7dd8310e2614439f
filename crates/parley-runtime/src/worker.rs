//! The per-connection dispatch worker.
//!
//! A [`DispatchWorker`] owns one protocol [`Driver`] and runs three loops on
//! named threads:
//!
//! - `<bot>-events` pops the event queue and runs each event through the
//!   `first` → `main` → command table → `last` sequence of one registry view
//! - `<bot>-output` pops the output queue, hands text to the driver and
//!   feeds an `OUTPUT` event back through the `first` chain
//! - `<bot>-heartbeat` asks the driver for liveness and reconnects on failure
//!
//! Both queues are priority queues keyed by the event's `speed`; lower runs
//! earlier, equal speeds run in arrival order.
//!
//! Every (re)start bumps a generation counter. Loops carry the generation
//! they were started with and stop as soon as it changes, which is how
//! [`exit`](DispatchWorker::exit) and reconnects retire stale loops.
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_runtime::{BotConfig, DispatchWorker};
//!
//! let worker = DispatchWorker::builder(BotConfig::new("main", "console"), driver)
//!     .registry(registry)
//!     .plugins(manager)
//!     .build();
//! worker.start(true)?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use parley_core::{
    AliasTable, Bot, BoxedBot, BoxedDriver, ChatError, ChatResult, DEFAULT_SPEED, Event,
    EventCategory, EventData, Gatekeeper, OutputCache, PluginControl, Registry, RegistryView,
    RemoteEnvelope, SharedStore, UserDirectory, WeakBot, normalize_control_chars, panic_message,
    render_reply,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::config::{BotConfig, ChannelConfig, GlobalConfig};
use crate::fleet::Fleet;
use crate::queue::PriorityQueue;
use crate::users::{AllowList, MemoryUsers};

/// Connection state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Never started, or loops halted without stopping.
    #[default]
    Idle,
    Connected,
    Reconnecting,
    /// Stopped on purpose; no reconnects happen from here.
    Stopped,
}

/// What [`DispatchWorker::exit`] tears down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOptions {
    /// Mark the worker stopped so no reconnect brings it back.
    pub stop: bool,
    /// Shut the driver down.
    pub close: bool,
    /// Persist the joined channels.
    pub save: bool,
    /// Leave the fleet; the last worker to leave shuts the runtime down.
    pub quit: bool,
}

impl Default for ExitOptions {
    fn default() -> Self {
        Self {
            stop: true,
            close: true,
            save: true,
            quit: false,
        }
    }
}

impl ExitOptions {
    pub fn quit() -> Self {
        Self {
            quit: true,
            ..Self::default()
        }
    }

    /// Halts loops and the driver but keeps the worker eligible to restart.
    pub fn for_reconnect() -> Self {
        Self {
            stop: false,
            close: true,
            save: false,
            quit: false,
        }
    }
}

struct Outgoing {
    target: String,
    text: String,
    event: Option<Arc<Event>>,
}

/// Document stored under [`DispatchWorker::state_key`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct SavedState {
    #[serde(default)]
    joined_channels: Vec<ChannelConfig>,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`DispatchWorker`].
pub struct WorkerBuilder {
    config: BotConfig,
    driver: BoxedDriver,
    global: GlobalConfig,
    registry: Option<Arc<Registry>>,
    users: Option<Arc<dyn UserDirectory>>,
    gatekeeper: Option<Arc<dyn Gatekeeper>>,
    store: Option<SharedStore>,
    plugins: Option<Arc<dyn PluginControl>>,
    aliases: Option<Arc<AliasTable>>,
    output_cache: Option<Arc<OutputCache>>,
}

impl WorkerBuilder {
    pub fn global(mut self, global: GlobalConfig) -> Self {
        self.global = global;
        self
    }

    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn gatekeeper(mut self, gatekeeper: Arc<dyn Gatekeeper>) -> Self {
        self.gatekeeper = Some(gatekeeper);
        self
    }

    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn plugins(mut self, plugins: Arc<dyn PluginControl>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn aliases(mut self, aliases: Arc<AliasTable>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    pub fn output_cache(mut self, cache: Arc<OutputCache>) -> Self {
        self.output_cache = Some(cache);
        self
    }

    /// Builds the worker. Owners come from both the bot and the global
    /// section; they always pass the gatekeeper.
    pub fn build(self) -> Arc<DispatchWorker> {
        let mut owners = self.config.owner.clone();
        for owner in &self.global.owner {
            if !owners.contains(owner) {
                owners.push(owner.clone());
            }
        }

        let users = self
            .users
            .unwrap_or_else(|| Arc::new(MemoryUsers::with_owners(owners.clone())));
        let gatekeeper = self.gatekeeper.unwrap_or_else(|| {
            Arc::new(AllowList::new(
                self.config.allow.iter().chain(owners.iter()).cloned(),
            ))
        });
        let nick = self.config.nick.clone();
        let ignored = self.config.ignore.iter().cloned().collect();

        Arc::new_cyclic(|me| DispatchWorker {
            me: me.clone(),
            nick: RwLock::new(nick),
            owners,
            registry: self.registry.unwrap_or_default(),
            users,
            gatekeeper,
            driver: self.driver,
            store: self.store,
            plugins: RwLock::new(self.plugins),
            aliases: self.aliases.unwrap_or_default(),
            output_cache: self.output_cache.unwrap_or_default(),
            ignored: RwLock::new(ignored),
            fleet: RwLock::new(Weak::new()),
            events: PriorityQueue::new(),
            output: PriorityQueue::new(),
            joined: RwLock::new(BTreeMap::new()),
            state: Mutex::new(WorkerState::Idle),
            generation: AtomicU64::new(0),
            reconnects: AtomicU32::new(0),
            reconnecting: Mutex::new(()),
            pause_lock: Mutex::new(()),
            pause_cv: Condvar::new(),
            threads: Mutex::new(Vec::new()),
            config: self.config,
            global: self.global,
        })
    }
}

// =============================================================================
// DispatchWorker
// =============================================================================

/// One bot: a driver, its queues and the loops draining them.
pub struct DispatchWorker {
    me: Weak<DispatchWorker>,
    config: BotConfig,
    global: GlobalConfig,
    owners: Vec<String>,
    nick: RwLock<String>,

    registry: Arc<Registry>,
    users: Arc<dyn UserDirectory>,
    gatekeeper: Arc<dyn Gatekeeper>,
    driver: BoxedDriver,
    store: Option<SharedStore>,
    plugins: RwLock<Option<Arc<dyn PluginControl>>>,
    aliases: Arc<AliasTable>,
    output_cache: Arc<OutputCache>,
    ignored: RwLock<BTreeSet<String>>,
    fleet: RwLock<Weak<Fleet>>,

    events: PriorityQueue<Arc<Event>>,
    output: PriorityQueue<Outgoing>,
    joined: RwLock<BTreeMap<String, Option<String>>>,

    state: Mutex<WorkerState>,
    generation: AtomicU64,
    reconnects: AtomicU32,
    reconnecting: Mutex<()>,
    pause_lock: Mutex<()>,
    pause_cv: Condvar,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchWorker {
    pub fn builder(config: BotConfig, driver: BoxedDriver) -> WorkerBuilder {
        WorkerBuilder {
            config,
            driver,
            global: GlobalConfig::default(),
            registry: None,
            users: None,
            gatekeeper: None,
            store: None,
            plugins: None,
            aliases: None,
            output_cache: None,
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn owners(&self) -> &[String] {
        &self.owners
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Reconnect attempts since the last fresh start.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn set_nick(&self, nick: impl Into<String>) {
        *self.nick.write() = nick.into();
    }

    pub fn set_plugins(&self, plugins: Arc<dyn PluginControl>) {
        *self.plugins.write() = Some(plugins);
    }

    pub(crate) fn set_fleet(&self, fleet: Weak<Fleet>) {
        *self.fleet.write() = fleet;
    }

    /// Stops replying to `origin`.
    pub fn ignore(&self, origin: impl Into<String>) {
        self.ignored.write().insert(origin.into());
    }

    pub fn unignore(&self, origin: &str) -> bool {
        self.ignored.write().remove(origin)
    }

    pub fn is_ignored(&self, origin: &str) -> bool {
        !origin.is_empty() && self.ignored.read().contains(origin)
    }

    /// Lengths of the event and output queues.
    pub fn queue_lengths(&self) -> (usize, usize) {
        (self.events.len(), self.output.len())
    }

    /// Store key of the worker's persisted state.
    pub fn state_key(&self) -> String {
        format!("fleet/{}/state", self.config.name)
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
        self.wake();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    // ─── Submission ──────────────────────────────────────────────────────────

    /// Runs `event` inline when `direct`, otherwise queues it by speed.
    pub fn submit(self: &Arc<Self>, event: Arc<Event>, direct: bool) {
        if direct {
            self.process(&event);
        } else {
            self.enqueue(event);
        }
    }

    /// Queues `event` and blocks until its handlers signal ready or the
    /// global wait timeout elapses. Returns the collected results.
    pub fn dispatch_wait(self: &Arc<Self>, event: Arc<Event>) -> Vec<String> {
        event.startout();
        self.submit(Arc::clone(&event), false);
        event.wait(self.global.wait_timeout())
    }

    fn enqueue(&self, event: Arc<Event>) {
        let speed = event.speed();
        if !self.events.push(speed, event) {
            debug!(bot = %self.config.name, "Event queue closed, event dropped");
        }
    }

    // ─── Dispatch ────────────────────────────────────────────────────────────

    /// Processes one event on the calling thread.
    pub fn handle_event(self: &Arc<Self>, event: &Arc<Event>) {
        self.process(event);
    }

    fn process(self: &Arc<Self>, event: &Arc<Event>) {
        if event.is_done() {
            trace!(bot = %self.config.name, token = %event.token(), "Event already done");
            return;
        }
        if event.is_remote() {
            if let Err(err) = self.do_remote(event) {
                warn!(bot = %self.config.name, error = %err, "Remote event rejected");
            }
            return;
        }
        if self.is_own_echo(event) {
            trace!(bot = %self.config.name, "Dropping own echo");
            event.set_stop();
            return;
        }
        if !self.admits(event) {
            info!(
                bot = %self.config.name,
                origin = %event.data().target(),
                "Origin not allowed, event dropped"
            );
            event.set_stop();
            return;
        }

        let view = self.registry.view();
        if !view.input_morphs.is_empty() {
            let txt = view.input_morphs.apply(&event.txt(), Some(event.as_ref()));
            event.update(|d| d.txt = txt);
        }
        event.bind(&**self, false);
        let bot: BoxedBot = Arc::clone(self) as BoxedBot;
        self.run_chains(&view, &bot, event);
    }

    fn run_chains(&self, view: &RegistryView, bot: &BoxedBot, event: &Arc<Event>) {
        let finished = |e: &Arc<Event>| e.is_done() || e.is_stopped();

        view.first.check(bot, event);

        let mut executed = false;
        if !finished(event) {
            view.main.check(bot, event);
            let flags = event.flags();
            if flags.iscommand && !flags.nodispatch && !finished(event) {
                let last = event.execute_with(view, bot);
                if !Arc::ptr_eq(&last, event) {
                    // pipelines report through their last stage
                    for result in last.wait(self.global.wait_timeout()) {
                        event.push_result(result);
                    }
                    event.ready(false);
                }
                executed = true;
            }
        }

        if !event.is_stopped() {
            view.last.check(bot, event);
        }
        event.update(|d| d.flags.callback_done = true);

        if event.flags().nodispatch {
            // nodispatch events never signal ready; release waiters directly
            event.set_stop();
        } else if !executed {
            event.ready(false);
        }
    }

    /// Verifies and unwraps a remote envelope, then dispatches the inner
    /// event through the `remote` chain and the regular chains.
    ///
    /// The outer event is marked done either way. A bad digest fails with
    /// [`ChatError::NoProperDigest`] before any handler sees the payload; a
    /// signed but blank payload fails with [`ChatError::NoEventProvided`].
    pub fn do_remote(self: &Arc<Self>, event: &Arc<Event>) -> ChatResult<Arc<Event>> {
        let opened = RemoteEnvelope::parse(&event.txt()).and_then(|envelope| envelope.open());
        event.mark_done();
        let inner = match opened {
            Ok(inner) => inner,
            Err(err) => {
                event.set_stop();
                return Err(err);
            }
        };

        inner.update(|d| {
            d.bot_name = self.config.name.clone();
            d.speed = 1;
            d.flags.nodispatch = true;
            d.flags.forwarded = true;
            d.flags.dontbind = true;
            d.flags.remote = true;
        });
        let inner = Arc::new(inner);
        debug!(
            bot = %self.config.name,
            category = %inner.category(),
            origin = %inner.data().origin,
            "Remote event accepted"
        );

        inner.prepare(&**self);
        let bot: BoxedBot = Arc::clone(self) as BoxedBot;
        let view = self.registry.view();
        view.remote.check(&bot, &inner);
        self.run_chains(&view, &bot, &inner);
        Ok(inner)
    }

    fn is_own_echo(&self, event: &Event) -> bool {
        let data = event.data();
        if !data.flags.groupchat {
            return false;
        }
        let nick = self.nick();
        !nick.is_empty()
            && (data.nick.eq_ignore_ascii_case(&nick) || data.origin.eq_ignore_ascii_case(&nick))
    }

    fn admits(&self, event: &Event) -> bool {
        if !self.config.closed {
            return true;
        }
        let data = event.data();
        let origin = data.target();
        origin.is_empty() || self.gatekeeper.is_allowed(origin)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Connects the driver and starts the loops.
    ///
    /// `fresh` resets the reconnect counter; reconnects pass `false`.
    pub fn start(self: &Arc<Self>, fresh: bool) -> ChatResult<()> {
        if self.config.name.trim().is_empty() {
            return Err(ChatError::NameNotSet);
        }
        if self.owners.is_empty() {
            return Err(ChatError::NoOwnerSet);
        }
        if self.plugins.read().is_none() {
            return Err(ChatError::PlugsNotConnected);
        }
        match self.state() {
            WorkerState::Connected => {
                warn!(bot = %self.config.name, "Worker already started");
                return Ok(());
            }
            WorkerState::Stopped if !fresh => {
                return Err(ChatError::driver(format!(
                    "worker {} is stopped",
                    self.config.name
                )));
            }
            _ => {}
        }

        if fresh {
            self.reconnects.store(0, Ordering::SeqCst);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.reopen();
        self.output.reopen();
        let channels = self.channels_to_join();

        if let Err(err) = self.launch(generation, channels) {
            self.halt_loops(false);
            return Err(err);
        }
        Ok(())
    }

    fn launch(self: &Arc<Self>, generation: u64, channels: Vec<ChannelConfig>) -> ChatResult<()> {
        self.spawn_loop("events", move |worker| worker.event_loop(generation))?;

        let weak: WeakBot = self.me.clone();
        let connected = catch_unwind(AssertUnwindSafe(|| self.driver.connect(weak)))
            .unwrap_or_else(|panic| {
                error!(
                    bot = %self.config.name,
                    panic = %panic_message(panic.as_ref()),
                    "Driver panicked while connecting"
                );
                false
            });
        if !connected {
            return Err(ChatError::driver(format!(
                "{} driver could not connect {}",
                self.driver.kind(),
                self.config.name
            )));
        }

        self.spawn_loop("output", move |worker| worker.output_loop(generation))?;
        self.spawn_loop("heartbeat", move |worker| worker.heartbeat_loop(generation))?;
        {
            let mut state = self.state.lock();
            if *state == WorkerState::Stopped || !self.is_current(generation) {
                return Err(ChatError::driver(format!(
                    "worker {} stopped while starting",
                    self.config.name
                )));
            }
            *state = WorkerState::Connected;
        }
        info!(
            bot = %self.config.name,
            driver = %self.driver.kind(),
            generation,
            "Worker started"
        );

        self.spawn_loop("joiner", move |worker| {
            worker.join_channels(generation, channels)
        })
    }

    fn spawn_loop<F>(self: &Arc<Self>, role: &str, body: F) -> ChatResult<()>
    where
        F: FnOnce(Arc<Self>) + Send + 'static,
    {
        let worker = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("{}-{role}", self.config.name))
            .spawn(move || body(worker))
            .map_err(|e| ChatError::driver(format!("cannot spawn {role} loop: {e}")))?;
        self.threads.lock().push(handle);
        Ok(())
    }

    /// Tears the worker down according to `options`.
    pub fn exit(&self, options: ExitOptions) {
        info!(
            bot = %self.config.name,
            stop = options.stop,
            close = options.close,
            quit = options.quit,
            "Worker exiting"
        );
        if options.stop {
            self.set_state(WorkerState::Stopped);
        }
        if options.stop || options.close {
            self.halt_loops(options.close);
        }
        if options.save {
            if let Err(err) = self.save_state() {
                warn!(bot = %self.config.name, error = %err, "Cannot save worker state");
            }
        }
        if options.quit {
            self.leave_fleet();
        }
    }

    /// Retires the current loops and joins their threads, except the
    /// calling one.
    fn halt_loops(&self, close_driver: bool) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.events.close();
        self.output.close();
        {
            let mut state = self.state.lock();
            if *state == WorkerState::Connected {
                *state = WorkerState::Idle;
            }
        }
        self.wake();

        if close_driver {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.driver.shutdown())) {
                error!(
                    bot = %self.config.name,
                    panic = %panic_message(panic.as_ref()),
                    "Driver panicked during shutdown"
                );
            }
        }

        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(bot = %self.config.name, "Worker thread panicked");
            }
        }
    }

    fn leave_fleet(&self) {
        let Some(fleet) = self.fleet.read().upgrade() else {
            return;
        };
        fleet.remove(&self.config.name);
        if fleet.is_empty() {
            info!(bot = %self.config.name, "Last worker quit, requesting shutdown");
            fleet.request_shutdown();
        }
    }

    // ─── Reconnect ───────────────────────────────────────────────────────────

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .reconnect_step()
            .saturating_mul(attempt)
            .min(self.config.reconnect_max())
    }

    /// Restarts the worker until it connects or is stopped.
    ///
    /// Only one reconnect runs at a time; a concurrent call returns `false`
    /// right away. The attempt counter keeps growing across reconnects and is
    /// reset only by a fresh [`start`](Self::start).
    pub fn reconnect(self: &Arc<Self>) -> bool {
        let Some(_running) = self.reconnecting.try_lock() else {
            debug!(bot = %self.config.name, "Reconnect already in progress");
            return false;
        };
        if self.state() == WorkerState::Stopped {
            return false;
        }
        self.set_state(WorkerState::Reconnecting);

        loop {
            if self.state() == WorkerState::Stopped {
                info!(bot = %self.config.name, "Worker stopped, reconnect abandoned");
                return false;
            }
            let attempt = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = self.backoff(attempt);
            warn!(
                bot = %self.config.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            if !self.pause_unless_stopped(delay) {
                info!(bot = %self.config.name, "Worker stopped, reconnect abandoned");
                return false;
            }

            self.exit(ExitOptions::for_reconnect());
            match self.start(false) {
                Ok(()) => {
                    info!(bot = %self.config.name, attempt, "Reconnected");
                    return true;
                }
                Err(err) => {
                    error!(bot = %self.config.name, attempt, error = %err, "Reconnect failed");
                }
            }
        }
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        if self.state() != WorkerState::Connected {
            return;
        }
        let worker = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("{}-reconnect", self.config.name))
            .spawn(move || {
                worker.reconnect();
            });
        if let Err(err) = spawned {
            error!(bot = %self.config.name, error = %err, "Cannot spawn reconnect thread");
        }
    }

    // ─── Loops ───────────────────────────────────────────────────────────────

    fn event_loop(self: Arc<Self>, generation: u64) {
        debug!(bot = %self.config.name, generation, "Event loop started");
        while let Some(event) = self.events.pop() {
            if !self.is_current(generation) {
                self.enqueue(event);
                break;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.process(&event))) {
                error!(
                    bot = %self.config.name,
                    token = %event.token(),
                    panic = %panic_message(panic.as_ref()),
                    "Event dispatch panicked"
                );
            }
            let benice = self.config.benice();
            if !benice.is_zero() {
                thread::sleep(benice);
            }
        }
        debug!(bot = %self.config.name, generation, "Event loop stopped");
    }

    fn output_loop(self: Arc<Self>, generation: u64) {
        debug!(bot = %self.config.name, generation, "Output loop started");
        while let Some(out) = self.output.pop() {
            if !self.is_current(generation) {
                let speed = out.event.as_ref().map_or(DEFAULT_SPEED, |e| e.speed());
                self.output.push(speed, out);
                break;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.send_output(&out))) {
                error!(
                    bot = %self.config.name,
                    panic = %panic_message(panic.as_ref()),
                    "Output panicked"
                );
            }
        }
        debug!(bot = %self.config.name, generation, "Output loop stopped");
    }

    fn send_output(self: &Arc<Self>, out: &Outgoing) {
        if let Err(err) = self.driver.send_raw(&out.text, &out.target) {
            error!(bot = %self.config.name, target = %out.target, error = %err, "Send failed");
            if let Some(event) = &out.event {
                event.ready(false);
            }
            self.spawn_reconnect();
            return;
        }
        trace!(bot = %self.config.name, target = %out.target, "Sent");

        let monitor = match &out.event {
            Some(event) => event.fork(),
            None => Event::new(EventData::default()),
        };
        monitor.update(|d| {
            d.category = EventCategory::Output;
            d.txt = out.text.clone();
            d.bot_name = self.config.name.clone();
            if d.channel.is_empty() {
                d.channel = out.target.clone();
            }
            d.ttl = 1;
            d.flags.nodispatch = true;
            d.flags.dontbind = true;
        });
        let bot: BoxedBot = Arc::clone(self) as BoxedBot;
        self.registry.view().first.check(&bot, &Arc::new(monitor));

        if let Some(event) = &out.event {
            event.ready(false);
        }
    }

    fn heartbeat_loop(self: Arc<Self>, generation: u64) {
        if !self.pause(self.config.ping_grace(), generation) {
            return;
        }
        loop {
            let alive = catch_unwind(AssertUnwindSafe(|| self.driver.ping_check()))
                .unwrap_or_else(|panic| {
                    error!(
                        bot = %self.config.name,
                        panic = %panic_message(panic.as_ref()),
                        "Ping check panicked"
                    );
                    false
                });
            if !self.is_current(generation) {
                break;
            }
            if !alive {
                warn!(bot = %self.config.name, "Ping check failed");
                self.reconnect();
                if !self.is_current(generation) {
                    break;
                }
            }
            if !self.pause(self.config.ping_interval(), generation) {
                break;
            }
        }
        debug!(bot = %self.config.name, generation, "Heartbeat loop stopped");
    }

    fn join_channels(self: Arc<Self>, generation: u64, channels: Vec<ChannelConfig>) {
        for (i, channel) in channels.into_iter().enumerate() {
            if i > 0 && !self.pause(self.config.join_delay(), generation) {
                return;
            }
            let worker = Arc::clone(&self);
            let spawned = thread::Builder::new()
                .name(format!("{}-join", self.config.name))
                .spawn(move || {
                    if let Err(err) = worker.join(&channel.name, channel.key.as_deref()) {
                        warn!(
                            bot = %worker.config.name,
                            channel = %channel.name,
                            error = %err,
                            "Join failed"
                        );
                    }
                });
            if let Err(err) = spawned {
                error!(bot = %self.config.name, error = %err, "Cannot spawn join thread");
            }
        }
        if !self.is_current(generation) {
            return;
        }

        let mut data = EventData::new(EventCategory::Start, "");
        data.bot_name = self.config.name.clone();
        data.ttl = 1;
        self.enqueue(Arc::new(Event::new(data)));
    }

    /// Sleeps up to `duration`; `false` when woken because `generation`
    /// was retired.
    fn pause(&self, duration: Duration, generation: u64) -> bool {
        self.pause_while(duration, || self.is_current(generation))
    }

    /// Sleeps up to `duration`; `false` when woken because the worker was
    /// stopped.
    pub(crate) fn pause_unless_stopped(&self, duration: Duration) -> bool {
        self.pause_while(duration, || self.state() != WorkerState::Stopped)
    }

    fn pause_while(&self, duration: Duration, keep: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.pause_lock.lock();
        while keep() {
            if self.pause_cv.wait_until(&mut guard, deadline).timed_out() {
                return keep();
            }
        }
        false
    }

    fn wake(&self) {
        let _guard = self.pause_lock.lock();
        self.pause_cv.notify_all();
    }

    // ─── Channels and state ──────────────────────────────────────────────────

    pub fn join(&self, channel: &str, key: Option<&str>) -> ChatResult<()> {
        self.driver.join(channel, key)?;
        self.joined
            .write()
            .insert(channel.to_string(), key.map(str::to_string));
        info!(bot = %self.config.name, channel = %channel, "Joined channel");
        if let Err(err) = self.save_state() {
            warn!(bot = %self.config.name, error = %err, "Cannot save worker state");
        }
        Ok(())
    }

    pub fn save_state(&self) -> ChatResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let state = SavedState {
            joined_channels: self
                .joined
                .read()
                .iter()
                .map(|(name, key)| ChannelConfig {
                    name: name.clone(),
                    key: key.clone(),
                })
                .collect(),
        };
        let document =
            serde_json::to_value(&state).map_err(|e| ChatError::persistence(e.to_string()))?;
        store.save(&self.state_key(), &document)
    }

    fn load_state(&self) -> SavedState {
        let Some(store) = &self.store else {
            return SavedState::default();
        };
        match store.load(&self.state_key()) {
            Ok(Some(document)) => serde_json::from_value(document).unwrap_or_else(|err| {
                warn!(bot = %self.config.name, error = %err, "Ignoring malformed worker state");
                SavedState::default()
            }),
            Ok(None) => SavedState::default(),
            Err(err) => {
                warn!(bot = %self.config.name, error = %err, "Cannot load worker state");
                SavedState::default()
            }
        }
    }

    /// Configured channels followed by those joined in an earlier run.
    fn channels_to_join(&self) -> Vec<ChannelConfig> {
        let mut channels = self.config.channels.clone();
        for saved in self.load_state().joined_channels {
            if !channels.iter().any(|c| c.name == saved.name) {
                channels.push(saved);
            }
        }
        channels
    }
}

impl Bot for DispatchWorker {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn nick(&self) -> String {
        self.nick.read().clone()
    }

    fn control_chars(&self, channel: &str) -> String {
        let cc = self
            .config
            .channel_cc
            .get(channel)
            .filter(|cc| !cc.is_empty())
            .unwrap_or(&self.global.cc);
        normalize_control_chars(cc)
    }

    fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    fn users(&self) -> Arc<dyn UserDirectory> {
        Arc::clone(&self.users)
    }

    fn auto_register(&self) -> bool {
        self.global.auto_register
    }

    fn is_joined(&self, channel: &str) -> bool {
        self.joined.read().contains_key(channel)
    }

    fn joined_channels(&self) -> Vec<String> {
        self.joined.read().keys().cloned().collect()
    }

    fn put(&self, event: Arc<Event>) {
        self.enqueue(event);
    }

    /// Chops, records and morphs a reply before queueing it.
    ///
    /// Replies to an ignored origin are dropped. Pipelined events only
    /// buffer for the next stage. Unless the event asks for `showall`, text
    /// longer than `output_limit` is cut and the rest cached for `more`.
    fn say(&self, target: &str, txt: &str, result: &[String], event: Option<&Arc<Event>>) {
        let recipient = match event {
            Some(event) => event.data().target().to_string(),
            None => target.to_string(),
        };
        if let Some(event) = event {
            if self.is_ignored(&recipient) {
                debug!(bot = %self.config.name, origin = %recipient, "Origin ignored, reply dropped");
                return;
            }
            if event.buffer_piped(txt, result) {
                return;
            }
        }

        let mut text = render_reply(txt, result);
        if !event.is_some_and(|e| e.flags().showall) {
            let key = OutputCache::key(&self.config.name, &recipient);
            text = self.output_cache.chop(&key, &text, self.config.output_limit);
        }
        let text = match event {
            Some(event) => event.record_rendered(text, result),
            None => Some(text),
        };
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            return;
        };
        let text = self
            .registry
            .view()
            .output_morphs
            .apply(&text, event.map(|e| e.as_ref()));
        let priority = event.map_or(DEFAULT_SPEED, |e| e.speed());
        let queued = self.output.push(
            priority,
            Outgoing {
                target: target.to_string(),
                text,
                event: event.cloned(),
            },
        );
        if !queued {
            debug!(bot = %self.config.name, target = %target, "Output queue closed, reply dropped");
            if let Some(event) = event {
                event.ready(false);
            }
        }
    }

    fn plugins(&self) -> Option<Arc<dyn PluginControl>> {
        self.plugins.read().clone()
    }

    fn aliases(&self) -> Option<Arc<AliasTable>> {
        Some(Arc::clone(&self.aliases))
    }

    fn output_cache(&self) -> Option<Arc<OutputCache>> {
        Some(Arc::clone(&self.output_cache))
    }
}

impl std::fmt::Debug for DispatchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchWorker")
            .field("name", &self.config.name)
            .field("driver", &self.driver.kind())
            .field("state", &self.state())
            .finish()
    }
}
