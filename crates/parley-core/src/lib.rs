//! # Parley Core
//!
//! The event model and handler registries of the Parley chat-bot runtime.
//!
//! ## Architecture Layers
//!
//! Parley Core is organized into three architectural layers:
//!
//! ### Foundation Layer
//!
//! The data flowing through a worker:
//! - **Events**: payload, lifecycle status and wait primitives ([`Event`], [`EventData`])
//! - **Categories**: routing tags keying the chains ([`EventCategory`])
//! - **Pipelining**: `"!a ! b"` chains commands through hand-off queues ([`dopipe`])
//! - **Output**: long replies chopped for `more` ([`OutputCache`])
//! - **Remote envelopes**: HMAC-SHA512 signed events ([`RemoteEnvelope`])
//!
//! ### Framework Layer
//!
//! Registries handlers live in:
//! - **Handlers**: `Fn(&BoxedBot, &Arc<Event>) -> HandlerResult` ([`HandlerFn`], [`Outcome`])
//! - **Callback chains**: ordered handlers per category ([`CallbackChain`])
//! - **Command table**: permission-gated handlers per command name ([`CommandTable`])
//! - **Morphs**: text rewriters around dispatch ([`MorphChain`])
//! - **Aliases**: command word expansion ([`AliasTable`])
//! - **Registry**: copy-on-write views of all of the above ([`Registry`], [`RegistryView`])
//!
//! ### Integration Layer
//!
//! Narrow collaborator interfaces:
//! - **Bot**: what a handler sees of its worker ([`Bot`])
//! - **Driver**: protocol adapters ([`Driver`])
//! - **Persistence**: `load` / `save` / `exists` ([`Persistence`])
//! - **Users**: user directory and gatekeeper ([`UserDirectory`], [`Gatekeeper`])
//!
//! ## Flow
//!
//! ```text
//! ┌────────┐   ┌────────┐   ┌───────┐   ┌──────┐   ┌──────┐   ┌────────┐
//! │ Driver │──▶│ Worker │──▶│ first │──▶│ main │──▶│ last │──▶│ output │
//! └────────┘   └────────┘   └───────┘   └──┬───┘   └──────┘   └────────┘
//!                                          ▼
//!                                    CommandTable
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use parley_core::prelude::*;
//!
//! let registry = Registry::new();
//! let mut staged = Registrations::new();
//! staged.command(Command::new("echo", handler(|bot, event| {
//!     let rest = event.data().rest.clone();
//!     event.reply(bot, rest);
//!     Ok(Outcome::Handled)
//! })));
//! registry.commit("basic", staged);
//! ```

pub mod error;

// Architectural layers
pub mod foundation;
pub mod framework;
pub mod integration;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{BoxError, ChatError, ChatResult};

// Re-export foundation types
pub use foundation::{
    DEFAULT_CONTROL_CHARS, DEFAULT_OUTPUT_LIMIT, DEFAULT_SPEED, Event, EventCategory, EventData,
    EventFlags, EventStatus, HandOff, OutputCache, PIPE_SEPARATOR, RemoteEnvelope, command_string,
    dopipe, make_response, normalize_control_chars, split_text,
};

// Re-export framework types
pub use framework::{
    AliasTable, Callback, CallbackChain, Command, CommandTable, HandlerFn, HandlerResult, Morph,
    MorphChain, MorphFn, Outcome, Predicate, Registrations, Registry, RegistrySizes, RegistryView,
    RunMode, Stage, handler, panic_message,
};

// Re-export integration types
pub use integration::{
    Bot, BoxedBot, BoxedDriver, Driver, GUEST, Gatekeeper, OPER, OWNER, Persistence,
    PluginControl, ReloadReport, SharedStore, USER, User, UserDirectory, WeakBot, render_reply,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::{BoxError, ChatError, ChatResult};
    pub use super::foundation::{Event, EventCategory, EventData};
    pub use super::framework::{
        Callback, Command, HandlerResult, Morph, Outcome, Registrations, Registry, handler,
    };
    pub use super::integration::{Bot, BoxedBot};
}
