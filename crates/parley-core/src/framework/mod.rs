//! Framework layer - handler registries.
//!
//! This module contains the registries handlers are registered into:
//! - Handler signature, outcomes and run modes
//! - Callback chains keyed by event category
//! - The command table keyed by command name
//! - Input and output morphs
//! - The alias table
//! - The [`Registry`] publishing consistent views of all of the above

pub mod alias;
pub mod chain;
pub mod command;
pub mod handler;
pub mod morph;
pub mod registry;

pub use alias::AliasTable;
pub use chain::{Callback, CallbackChain};
pub use command::{Command, CommandTable};
pub use handler::{HandlerFn, HandlerResult, Outcome, Predicate, RunMode, handler, panic_message};
pub use morph::{Morph, MorphChain, MorphFn};
pub use registry::{Registrations, Registry, RegistrySizes, RegistryView, Stage};
