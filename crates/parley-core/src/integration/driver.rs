//! Protocol driver contract.

use std::sync::Arc;

use crate::error::ChatResult;

use super::bot::WeakBot;

/// A protocol adapter owned by one worker.
///
/// Drivers hand inbound text to the worker through the [`WeakBot`] given to
/// [`connect`](Driver::connect); the worker calls back into the driver from
/// its output and heartbeat loops.
pub trait Driver: Send + Sync {
    /// Short protocol name (`"irc"`, `"console"`, ...).
    fn kind(&self) -> &str;

    /// Opens the connection. Returns `false` when it could not be established.
    fn connect(&self, bot: WeakBot) -> bool;

    /// Returns `false` when the connection is considered dead.
    fn ping_check(&self) -> bool;

    /// Transmits `text` to `target`.
    fn send_raw(&self, text: &str, target: &str) -> ChatResult<()>;

    /// Joins a channel.
    fn join(&self, channel: &str, key: Option<&str>) -> ChatResult<()>;

    /// Closes the connection.
    fn shutdown(&self);
}

pub type BoxedDriver = Arc<dyn Driver>;
