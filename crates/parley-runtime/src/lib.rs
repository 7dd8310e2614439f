//! Parley Runtime - workers, configuration and orchestration.
//!
//! This crate provides:
//! - Per-connection dispatch workers ([`DispatchWorker`]) with event, output
//!   and heartbeat loops, reconnect backoff and channel state persistence
//! - The fleet of running workers ([`Fleet`])
//! - Runtime orchestration ([`ParleyRuntime`]): plugin loading, driver
//!   factories, boot retries and signal handling
//! - Layered configuration (`parley.toml`, profiles, `PARLEY_*` env vars)
//! - Logging configuration
//! - File and memory document stores, an in-memory user directory
//!
//! ```ignore
//! use parley_runtime::ParleyRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ParleyRuntime::new();
//!     runtime.register_driver("console", console_driver);
//!
//!     // Run until Ctrl+C or until every bot quit
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fleet;
pub mod logging;
pub mod queue;
pub mod runtime;
pub mod store;
pub mod users;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{
    BotConfig, ChannelConfig, ConfigError, ConfigLoader, ConfigResult, GlobalConfig, ParleyConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use fleet::Fleet;
pub use logging::{LoggingBuilder, SpanEvents};
pub use queue::PriorityQueue;
pub use runtime::{DriverFactory, ParleyRuntime, RuntimeBuilder};
pub use store::{FileStore, MemoryStore};
pub use users::{AllowList, MemoryUsers};
pub use worker::{DispatchWorker, ExitOptions, WorkerBuilder, WorkerState};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
