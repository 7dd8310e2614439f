//! The runtime-owned handler registry.
//!
//! A [`Registry`] publishes a [`RegistryView`]: the four callback chains, the
//! command table and the two morph chains. One registry is shared by every
//! worker of a runtime and handed to handlers through
//! [`Bot::registry`](crate::integration::Bot::registry).
//!
//! A published view is never mutated. [`Registry::commit`] and
//! [`Registry::unload`] edit a copy and swap it in, so an event processed
//! against one view observes a plugin entirely loaded or entirely gone.
//!
//! Plugins never touch the chains directly while loading: they stage their
//! handlers in a [`Registrations`] value which is committed in one step once
//! their `init` succeeded.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::debug;

use super::chain::{Callback, CallbackChain};
use super::command::{Command, CommandTable};
use super::morph::{Morph, MorphChain};
use crate::foundation::EventCategory;

/// The four chain instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Pre-processing.
    First,
    /// Dispatch proper.
    Main,
    /// Post-processing.
    Last,
    /// Verified remote envelopes only.
    Remote,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::First, Stage::Main, Stage::Last, Stage::Remote];
}

/// Handler counts per chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySizes {
    pub first: usize,
    pub main: usize,
    pub last: usize,
    pub remote: usize,
    pub commands: usize,
    pub morphs: usize,
}

/// One consistent generation of every handler table.
#[derive(Debug, Clone)]
pub struct RegistryView {
    pub first: CallbackChain,
    pub main: CallbackChain,
    pub last: CallbackChain,
    pub remote: CallbackChain,
    pub commands: CommandTable,
    pub input_morphs: MorphChain,
    pub output_morphs: MorphChain,
}

impl Default for RegistryView {
    fn default() -> Self {
        Self {
            first: CallbackChain::new("first"),
            main: CallbackChain::new("main"),
            last: CallbackChain::new("last"),
            remote: CallbackChain::new("remote"),
            commands: CommandTable::new(),
            input_morphs: MorphChain::new("input"),
            output_morphs: MorphChain::new("output"),
        }
    }
}

impl RegistryView {
    pub fn chain(&self, stage: Stage) -> &CallbackChain {
        match stage {
            Stage::First => &self.first,
            Stage::Main => &self.main,
            Stage::Last => &self.last,
            Stage::Remote => &self.remote,
        }
    }

    fn chain_mut(&mut self, stage: Stage) -> &mut CallbackChain {
        match stage {
            Stage::First => &mut self.first,
            Stage::Main => &mut self.main,
            Stage::Last => &mut self.last,
            Stage::Remote => &mut self.remote,
        }
    }

    pub fn sizes(&self) -> RegistrySizes {
        RegistrySizes {
            first: self.first.len(),
            main: self.main.len(),
            last: self.last.len(),
            remote: self.remote.len(),
            commands: self.commands.len(),
            morphs: self.input_morphs.len() + self.output_morphs.len(),
        }
    }

    fn unload(&mut self, owner: &str) -> usize {
        let callbacks: usize = Stage::ALL
            .into_iter()
            .map(|stage| self.chain_mut(stage).unload(owner))
            .sum();
        callbacks
            + self.commands.unload(owner)
            + self.input_morphs.unload(owner)
            + self.output_morphs.unload(owner)
    }
}

/// Handler tables shared by all workers.
#[derive(Debug, Default)]
pub struct Registry {
    current: RwLock<Arc<RegistryView>>,
    mutation: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently published view.
    pub fn view(&self) -> Arc<RegistryView> {
        Arc::clone(&self.current.read())
    }

    /// Applies `edit` to a copy of the current view and publishes the result.
    pub fn update<R>(&self, edit: impl FnOnce(&mut RegistryView) -> R) -> R {
        let _guard = self.mutation.lock();
        let mut next = RegistryView::clone(&self.view());
        let out = edit(&mut next);
        *self.current.write() = Arc::new(next);
        out
    }

    /// Removes everything `owner` registered.
    pub fn unload(&self, owner: &str) -> usize {
        let removed = self.update(|view| view.unload(owner));
        debug!(plugin = %owner, removed, "Registry entries unloaded");
        removed
    }

    /// Installs staged registrations for `owner`.
    pub fn commit(&self, owner: &str, registrations: Registrations) {
        let count = registrations.len();
        self.update(|view| {
            for (stage, category, callback) in registrations.callbacks {
                view.chain_mut(stage).add(owner, category, callback);
            }
            for command in registrations.commands {
                view.commands.add(owner, command);
            }
            for morph in registrations.input_morphs {
                view.input_morphs.add(owner, morph);
            }
            for morph in registrations.output_morphs {
                view.output_morphs.add(owner, morph);
            }
        });
        debug!(plugin = %owner, count, "Registrations committed");
    }

    pub fn sizes(&self) -> RegistrySizes {
        self.view().sizes()
    }
}

/// Handlers staged by a plugin before they become visible.
#[derive(Debug, Default)]
pub struct Registrations {
    callbacks: Vec<(Stage, EventCategory, Callback)>,
    commands: Vec<Command>,
    input_morphs: Vec<Morph>,
    output_morphs: Vec<Morph>,
}

impl Registrations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&mut self, stage: Stage, category: EventCategory, callback: Callback) -> &mut Self {
        self.callbacks.push((stage, category, callback));
        self
    }

    pub fn first(&mut self, category: EventCategory, callback: Callback) -> &mut Self {
        self.callback(Stage::First, category, callback)
    }

    pub fn main(&mut self, category: EventCategory, callback: Callback) -> &mut Self {
        self.callback(Stage::Main, category, callback)
    }

    pub fn last(&mut self, category: EventCategory, callback: Callback) -> &mut Self {
        self.callback(Stage::Last, category, callback)
    }

    pub fn remote(&mut self, category: EventCategory, callback: Callback) -> &mut Self {
        self.callback(Stage::Remote, category, callback)
    }

    pub fn command(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Rewrites incoming text before it is bound.
    pub fn input_morph(&mut self, morph: Morph) -> &mut Self {
        self.input_morphs.push(morph);
        self
    }

    /// Rewrites outgoing replies before they are queued.
    pub fn output_morph(&mut self, morph: Morph) -> &mut Self {
        self.output_morphs.push(morph);
        self
    }

    pub fn len(&self) -> usize {
        self.callbacks.len() + self.commands.len() + self.input_morphs.len() + self.output_morphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
