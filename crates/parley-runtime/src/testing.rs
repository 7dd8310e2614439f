//! Test doubles shared by the unit tests of this crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_core::{ChatError, ChatResult, Driver, WeakBot};

/// A driver that records everything the worker asks of it.
pub struct ScriptedDriver {
    alive: AtomicBool,
    connectable: AtomicBool,
    fail_sends: AtomicBool,
    connects: AtomicUsize,
    shutdowns: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
    joins: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            connectable: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            joins: Mutex::new(Vec::new()),
        })
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_connectable(&self, connectable: bool) {
        self.connectable.store(connectable, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// `(target, text)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn joins(&self) -> Vec<String> {
        self.joins.lock().clone()
    }
}

impl Driver for ScriptedDriver {
    fn kind(&self) -> &str {
        "scripted"
    }

    fn connect(&self, _bot: WeakBot) -> bool {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connectable.load(Ordering::SeqCst)
    }

    fn ping_check(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn send_raw(&self, text: &str, target: &str) -> ChatResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChatError::driver("connection reset"));
        }
        self.sent.lock().push((target.to_string(), text.to_string()));
        Ok(())
    }

    fn join(&self, channel: &str, _key: Option<&str>) -> ChatResult<()> {
        self.joins.lock().push(channel.to_string());
        Ok(())
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
