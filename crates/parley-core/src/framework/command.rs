//! The command table: handlers keyed by command name.
//!
//! Unlike a [`CallbackChain`](super::CallbackChain) every name maps to exactly
//! one handler, and dispatch is gated on the acting user's permissions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, warn};

use super::handler::{HandlerFn, Outcome, RunMode, invoke};
use crate::error::{ChatError, ChatResult};
use crate::foundation::{Event, EventStatus};
use crate::integration::BoxedBot;

/// A command handler with its required permissions.
#[derive(Clone)]
pub struct Command {
    name: String,
    perms: Vec<String>,
    handler: HandlerFn,
    mode: RunMode,
}

impl Command {
    /// Creates an inline command open to every user.
    pub fn new(name: impl Into<String>, handler: HandlerFn) -> Self {
        Self {
            name: name.into().to_lowercase(),
            perms: Vec::new(),
            handler,
            mode: RunMode::Inline,
        }
    }

    /// Requires any of `perms` (case-insensitive).
    pub fn perms(mut self, perms: &[&str]) -> Self {
        self.perms = perms.iter().map(|p| p.to_ascii_uppercase()).collect();
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

    pub fn required_perms(&self) -> &[String] {
        &self.perms
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("perms", &self.perms)
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Clone)]
struct Slot {
    owner: String,
    command: Arc<Command>,
}

/// Mapping of command name to handler.
#[derive(Clone, Default)]
pub struct CommandTable {
    commands: BTreeMap<String, Slot>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `command` for `owner`, replacing any command of the same name.
    pub fn add(&mut self, owner: &str, command: Command) {
        let name = command.name.clone();
        let previous = self.commands.insert(
            name.clone(),
            Slot {
                owner: owner.to_string(),
                command: Arc::new(command),
            },
        );
        if let Some(prev) = previous
            && prev.owner != owner
        {
            warn!(command = %name, old = %prev.owner, new = %owner, "Command taken over by another plugin");
        }
    }

    /// Removes a single command. Returns `true` if it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.commands.remove(&name.to_lowercase()).is_some()
    }

    /// Removes every command owned by `owner`.
    pub fn unload(&mut self, owner: &str) -> usize {
        let before = self.commands.len();
        self.commands.retain(|_, slot| slot.owner != owner);
        before - self.commands.len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.commands
            .get(&name.to_lowercase())
            .map(|slot| Arc::clone(&slot.command))
    }

    /// Plugin owning `name`.
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.commands
            .get(&name.to_lowercase())
            .map(|slot| slot.owner.clone())
    }

    /// Sorted command names.
    pub fn names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns `true` if the event names a registered command.
    pub fn would_dispatch(&self, event: &Event) -> bool {
        let data = event.data();
        !data.usercmnd.is_empty() && self.commands.contains_key(&data.usercmnd.to_lowercase())
    }

    /// Runs the command named by the event.
    ///
    /// Fails with [`ChatError::NoSuchCommand`] on a lookup miss and with
    /// [`ChatError::NoSuchUser`] / [`ChatError::PermissionDenied`] when the
    /// command requires permissions the event's user does not hold. Handler
    /// failures are contained and reported as [`Outcome::Declined`].
    pub fn dispatch(&self, bot: &BoxedBot, event: &Arc<Event>) -> ChatResult<Outcome> {
        let (usercmnd, target, user) = {
            let d = event.data();
            (d.usercmnd.to_lowercase(), d.target().to_string(), d.user.clone())
        };
        let slot = self
            .commands
            .get(&usercmnd)
            .cloned()
            .ok_or_else(|| ChatError::NoSuchCommand(usercmnd.clone()))?;

        let command = slot.command;
        if !command.perms.is_empty() {
            let user = user.ok_or_else(|| ChatError::NoSuchUser(target.clone()))?;
            if !user.permitted(&command.perms) {
                return Err(ChatError::PermissionDenied {
                    command: usercmnd,
                    user: user.name,
                });
            }
        }

        event.advance(EventStatus::Dispatching);
        debug!(command = %usercmnd, plugin = %slot.owner, bot = %bot.name(), "Dispatching command");

        match command.mode {
            RunMode::Inline => {
                let outcome = invoke(&slot.owner, &command.name, &command.handler, bot, event);
                event.ready(false);
                Ok(outcome)
            }
            RunMode::Threaded => {
                let (bot, event) = (Arc::clone(bot), Arc::clone(event));
                let owner = slot.owner;
                let spawned = thread::Builder::new()
                    .name(format!("cmd-{}", command.name))
                    .spawn(move || {
                        invoke(&owner, &command.name, &command.handler, &bot, &event);
                        event.ready(false);
                    });
                match spawned {
                    Ok(_) => Ok(Outcome::Handled),
                    Err(err) => {
                        error!(command = %usercmnd, error = %err, "Cannot spawn command thread");
                        Err(ChatError::Plugin(err.to_string()))
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.names())
            .finish()
    }
}
