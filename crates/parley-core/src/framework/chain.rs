//! Ordered handler registries keyed by event category.
//!
//! A [`CallbackChain`] maps each [`EventCategory`] to an insertion-ordered
//! list of callbacks. Each entry remembers the plugin that owns it so a
//! plugin's handlers can be removed in one call.
//!
//! ```rust,ignore
//! chain.add(
//!     "logger",
//!     EventCategory::Message,
//!     Callback::new("log", handler(|_, event| {
//!         tracing::info!(txt = %event.txt(), "seen");
//!         Ok(Outcome::Handled)
//!     }))
//!     .when(|_, event| !event.txt().is_empty()),
//! );
//! ```
//!
//! # Concurrency
//!
//! A chain is a plain value. The shared copies live inside a
//! [`RegistryView`](super::RegistryView), which is never mutated once
//! published: the [`Registry`](super::Registry) edits a clone and swaps it
//! in, so a `check` running against one view sees none of a concurrent
//! [`unload`](CallbackChain::unload) and the next view sees all of it.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;

use tracing::{error, trace, warn};

use super::handler::{HandlerFn, Predicate, RunMode, invoke, panic_message};
use crate::foundation::{Event, EventCategory};
use crate::integration::BoxedBot;

/// A named handler with an optional precondition.
#[derive(Clone)]
pub struct Callback {
    name: String,
    handler: HandlerFn,
    predicate: Option<Predicate>,
    mode: RunMode,
}

impl Callback {
    /// Creates an inline callback without precondition.
    pub fn new(name: impl Into<String>, handler: HandlerFn) -> Self {
        Self {
            name: name.into(),
            handler,
            predicate: None,
            mode: RunMode::Inline,
        }
    }

    /// Only run when `predicate` returns `true`.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&BoxedBot, &Arc<Event>) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Run on a separate thread.
    pub fn threaded(mut self) -> Self {
        self.mode = RunMode::Threaded;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.name)
            .field("has_predicate", &self.predicate.is_some())
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Clone)]
struct Entry {
    owner: String,
    callback: Arc<Callback>,
}

/// An ordered registry of callbacks.
#[derive(Clone)]
pub struct CallbackChain {
    name: &'static str,
    entries: HashMap<EventCategory, Vec<Entry>>,
}

impl CallbackChain {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Appends `callback` to `category`.
    ///
    /// An entry with the same owner and callback name is replaced in place,
    /// keeping its position.
    pub fn add(&mut self, owner: &str, category: EventCategory, callback: Callback) {
        let entry = Entry {
            owner: owner.to_string(),
            callback: Arc::new(callback),
        };
        let list = self.entries.entry(category.clone()).or_default();
        match list
            .iter_mut()
            .find(|e| e.owner == entry.owner && e.callback.name == entry.callback.name)
        {
            Some(existing) => {
                warn!(
                    chain = self.name,
                    plugin = %owner,
                    callback = %existing.callback.name,
                    "Callback already registered, replacing"
                );
                *existing = entry;
            }
            None => {
                trace!(chain = self.name, plugin = %owner, category = %category, "Callback added");
                list.push(entry);
            }
        }
    }

    /// Removes every entry owned by `owner` from every category.
    ///
    /// Returns the number of entries removed; zero is not an error.
    pub fn unload(&mut self, owner: &str) -> usize {
        let mut removed = 0;
        for list in self.entries.values_mut() {
            let before = list.len();
            list.retain(|e| e.owner != owner);
            removed += before - list.len();
        }
        self.entries.retain(|_, list| !list.is_empty());
        removed
    }

    /// Total number of entries across all categories.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_category(&self, category: &EventCategory) -> bool {
        self.entries.contains_key(category)
    }

    /// Owners with at least one entry, sorted.
    pub fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self
            .entries
            .values()
            .flatten()
            .map(|e| e.owner.clone())
            .collect();
        owners.sort();
        owners.dedup();
        owners
    }

    /// Runs the callbacks registered for the event's category.
    ///
    /// Entries run in insertion order. A failing predicate skips its entry;
    /// a failing handler is logged and treated as declined. Iteration stops
    /// once the event is done or stopped. Returns the number of handlers
    /// started.
    pub fn check(&self, bot: &BoxedBot, event: &Arc<Event>) -> usize {
        let category = event.category();
        let Some(list) = self.entries.get(&category) else {
            return 0;
        };

        let mut started = 0;
        for entry in list {
            if event.is_done() || event.is_stopped() {
                trace!(chain = self.name, token = %event.token(), "Event finished, chain stops");
                break;
            }
            let callback = &entry.callback;
            if let Some(predicate) = &callback.predicate {
                match catch_unwind(AssertUnwindSafe(|| predicate(bot, event))) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(panic) => {
                        error!(
                            chain = self.name,
                            plugin = %entry.owner,
                            callback = %callback.name,
                            panic = %panic_message(panic.as_ref()),
                            "Predicate panicked"
                        );
                        continue;
                    }
                }
            }

            started += 1;
            match callback.mode {
                RunMode::Inline => {
                    invoke(&entry.owner, &callback.name, &callback.handler, bot, event);
                }
                RunMode::Threaded => {
                    let (bot, event) = (Arc::clone(bot), Arc::clone(event));
                    let (owner, callback) = (entry.owner.clone(), Arc::clone(callback));
                    let spawned = thread::Builder::new()
                        .name(format!("cb-{}", callback.name))
                        .spawn(move || {
                            invoke(&owner, &callback.name, &callback.handler, &bot, &event);
                        });
                    if let Err(err) = spawned {
                        error!(chain = self.name, error = %err, "Cannot spawn callback thread");
                    }
                }
            }
        }
        started
    }
}

impl std::fmt::Debug for CallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackChain")
            .field("name", &self.name)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::ChatError;
    use crate::framework::{Outcome, handler};
    use crate::testing::MockBot;

    fn counting(counter: &Arc<AtomicUsize>) -> HandlerFn {
        let counter = Arc::clone(counter);
        handler(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Outcome::Handled)
        })
    }

    fn message(txt: &str) -> Arc<Event> {
        Arc::new(Event::new(crate::foundation::EventData::new(
            EventCategory::Message,
            txt,
        )))
    }

    #[test]
    fn test_check_runs_in_insertion_order() {
        let mut chain = CallbackChain::new("main");
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            chain.add(
                "p",
                EventCategory::Message,
                Callback::new(
                    name,
                    handler(move |_, _| {
                        order.lock().push(name);
                        Ok(Outcome::Handled)
                    }),
                ),
            );
        }

        let bot: BoxedBot = MockBot::new();
        assert_eq!(chain.check(&bot, &message("hi")), 3);
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_add_replaces_same_owner_and_name() {
        let mut chain = CallbackChain::new("main");
        let counter = Arc::new(AtomicUsize::new(0));
        chain.add("p", EventCategory::Message, Callback::new("h", counting(&counter)));
        chain.add("p", EventCategory::Message, Callback::new("h", counting(&counter)));
        chain.add("q", EventCategory::Message, Callback::new("h", counting(&counter)));
        assert_eq!(chain.len(), 2);

        let bot: BoxedBot = MockBot::new();
        chain.check(&bot, &message("hi"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unload_removes_only_owner() {
        let mut chain = CallbackChain::new("first");
        let kept = Arc::new(AtomicUsize::new(0));
        let gone = Arc::new(AtomicUsize::new(0));
        chain.add("keep", EventCategory::Message, Callback::new("k", counting(&kept)));
        chain.add("drop", EventCategory::Message, Callback::new("d", counting(&gone)));
        chain.add("drop", EventCategory::Join, Callback::new("j", counting(&gone)));

        assert_eq!(chain.unload("drop"), 2);
        assert_eq!(chain.unload("drop"), 0);
        assert!(!chain.has_category(&EventCategory::Join));
        assert_eq!(chain.owners(), vec!["keep".to_string()]);

        let bot: BoxedBot = MockBot::new();
        chain.check(&bot, &message("hi"));
        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(gone.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_predicate_skips_and_failures_do_not_abort() {
        let mut chain = CallbackChain::new("main");
        let counter = Arc::new(AtomicUsize::new(0));
        chain.add(
            "p",
            EventCategory::Message,
            Callback::new("skipped", counting(&counter)).when(|_, _| false),
        );
        chain.add(
            "p",
            EventCategory::Message,
            Callback::new("fails", handler(|_, _| Err(ChatError::require("db").into()))),
        );
        chain.add(
            "p",
            EventCategory::Message,
            Callback::new("panics", handler(|_, _| panic!("bad plugin"))),
        );
        chain.add("p", EventCategory::Message, Callback::new("runs", counting(&counter)));

        let bot: BoxedBot = MockBot::new();
        assert_eq!(chain.check(&bot, &message("hi")), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_halts_category() {
        let mut chain = CallbackChain::new("main");
        let counter = Arc::new(AtomicUsize::new(0));
        chain.add(
            "p",
            EventCategory::Message,
            Callback::new(
                "stopper",
                handler(|_, event| {
                    event.set_stop();
                    Ok(Outcome::Handled)
                }),
            ),
        );
        chain.add("p", EventCategory::Message, Callback::new("after", counting(&counter)));

        let bot: BoxedBot = MockBot::new();
        chain.check(&bot, &message("hi"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_done_event_is_skipped() {
        let mut chain = CallbackChain::new("main");
        let counter = Arc::new(AtomicUsize::new(0));
        chain.add("p", EventCategory::Message, Callback::new("h", counting(&counter)));

        let event = message("hi");
        event.mark_done();
        let bot: BoxedBot = MockBot::new();
        assert_eq!(chain.check(&bot, &event), 0);
    }

    #[test]
    fn test_threaded_does_not_block_chain() {
        let mut chain = CallbackChain::new("main");
        let counter = Arc::new(AtomicUsize::new(0));
        let slow = {
            let counter = Arc::clone(&counter);
            handler(move |_, _| {
                std::thread::sleep(Duration::from_millis(100));
                counter.fetch_add(10, Ordering::SeqCst);
                Ok(Outcome::Handled)
            })
        };
        chain.add("p", EventCategory::Message, Callback::new("slow", slow).threaded());
        chain.add("p", EventCategory::Message, Callback::new("fast", counting(&counter)));

        let bot: BoxedBot = MockBot::new();
        chain.check(&bot, &message("hi"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }
}
