//! # Parley
//!
//! A multi-protocol chat-bot runtime: protocol drivers feed events into
//! per-connection dispatch workers, which run them through ordered handler
//! chains and a permission-gated command table populated by hot-loadable
//! plugins.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌─────────────────────────────┐   ┌──────────────────────────┐
//! │ Driver │──▶│ DispatchWorker              │──▶│ Registry                 │
//! │ (irc,  │   │  events ─▶ first/main/last  │   │  first · main · last     │
//! │ console│◀──│  output ◀─ replies          │   │  remote · commands       │
//! └────────┘   │  heartbeat ─▶ reconnect     │   └────────────▲─────────────┘
//!              └─────────────────────────────┘                │
//!                                              PluginManager ─┘ (load / reload / unload)
//! ```
//!
//! - **Runtime**: configuration, logging, plugin loading and the worker fleet
//! - **Drivers**: protocol adapters behind the [`Driver`](core::Driver) trait
//! - **Workers**: one per bot; queues ordered by event speed
//! - **Plugins**: plain `fn` hooks staging callbacks and commands
//!
//! ## Quick Start
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
//! plugin_package!(pub BASIC = "basic" [ECHO]);
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ParleyRuntime::new();
//!     runtime.register_driver("console", console_driver);
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `builtin`: operator plugins `core.plug`, `core.size`, `core.alias` and
//!   `core.more` (default)
//! - `toml-config`: `parley.toml` configuration files (default)
//! - `yaml-config`: `parley.yaml` configuration files
//! - `json-log`: JSON log output

pub use parley_core as core;
pub use parley_framework as framework;
pub use parley_runtime as runtime;

pub use parley_framework::plugin_package;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use parley_runtime::{BotConfig, ParleyConfig, ParleyRuntime};

    // Plugin system
    pub use parley_framework::{PluginDescriptor, PluginLoadContext, plugin_package};

    // Events and handlers
    pub use parley_core::{
        BoxError, Callback, Command, Event, EventCategory, EventData, HandlerResult, Outcome,
        handler,
    };

    // Bots and drivers
    pub use parley_core::{Bot, BoxedBot, BoxedDriver, ChatError, ChatResult, Driver, WeakBot};

    // Permissions
    pub use parley_core::{GUEST, OPER, OWNER, USER};
}
