//! Plugin system for the Parley runtime.
//!
//! # Architecture
//!
//! A plugin is a [`PluginDescriptor`]: an id, declared dependencies and plain
//! `fn` hooks. Its `init` hook stages handlers in a [`PluginLoadContext`];
//! the [`PluginManager`](crate::PluginManager) commits them to the shared
//! registry only after `init` succeeded, and removes them all on unload.
//!
//! Descriptors are grouped into named [`PluginPackage`]s, which the config
//! file lists under `global.plugin_packages`.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! fn echo(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
//!     let rest = event.data().rest.clone();
//!     event.reply(bot, rest);
//!     Ok(Outcome::Handled)
//! }
//!
//! fn init(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
//!     ctx.command(Command::new("echo", handler(echo)));
//!     Ok(())
//! }
//!
//! pub const ECHO: PluginDescriptor = PluginDescriptor::new("basic.echo", init);
//!
//! plugin_package!(pub BASIC = "basic" [ECHO]);
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [plugins."basic.echo"]
//! prefix = "> "
//! ```
//!
//! is available to hooks through [`PluginEnv::get_config`].

pub mod core;
pub mod descriptor;
pub mod macros;
pub mod package;

#[cfg(feature = "builtin")]
pub mod builtin;

pub use core::{Plugin, PluginEnv, PluginLoadContext};
pub use descriptor::{HookFn, InitFn, PluginDescriptor};
pub use package::{PLUGIN_PACKAGES, PluginCatalog, PluginPackage};
