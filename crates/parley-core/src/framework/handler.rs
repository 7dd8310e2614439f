//! Handler signature shared by callback chains and the command table.
//!
//! A handler is any `Fn(&BoxedBot, &Arc<Event>) -> HandlerResult`. Errors and
//! panics never leave [`invoke`]; they are logged and the handler is treated
//! as having declined the event.
//!
//! ```rust,ignore
//! use parley_core::framework::{Outcome, handler};
//!
//! let echo = handler(|bot, event| {
//!     let rest = event.data().rest.clone();
//!     event.reply(bot, rest);
//!     Ok(Outcome::Handled)
//! });
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{error, info};

use crate::error::{BoxError, ChatError};
use crate::foundation::Event;
use crate::integration::BoxedBot;

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler acted on the event.
    Handled,
    /// The handler chose not to act, or failed.
    Declined,
}

/// Where a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// On the dispatching thread, before the next entry.
    #[default]
    Inline,
    /// On a fresh thread; the dispatcher does not wait for it.
    Threaded,
}

/// Result returned by handlers.
pub type HandlerResult = Result<Outcome, BoxError>;

/// A shareable handler.
pub type HandlerFn = Arc<dyn Fn(&BoxedBot, &Arc<Event>) -> HandlerResult + Send + Sync>;

/// A shareable precondition evaluated before a callback runs.
pub type Predicate = Arc<dyn Fn(&BoxedBot, &Arc<Event>) -> bool + Send + Sync>;

/// Wraps a closure into a [`HandlerFn`].
pub fn handler<F>(f: F) -> HandlerFn
where
    F: Fn(&BoxedBot, &Arc<Event>) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Runs `handler`, containing errors and panics.
pub(crate) fn invoke(
    owner: &str,
    name: &str,
    handler: &HandlerFn,
    bot: &BoxedBot,
    event: &Arc<Event>,
) -> Outcome {
    match catch_unwind(AssertUnwindSafe(|| handler(bot, event))) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            match ChatError::from_boxed(&err) {
                Some(ChatError::Require(reason)) => {
                    info!(plugin = %owner, handler = %name, reason = %reason, "Handler requirement not met");
                }
                _ => {
                    error!(plugin = %owner, handler = %name, error = %err, "Handler failed");
                }
            }
            Outcome::Declined
        }
        Err(panic) => {
            error!(
                plugin = %owner,
                handler = %name,
                panic = %panic_message(panic.as_ref()),
                "Handler panicked"
            );
            Outcome::Declined
        }
    }
}

/// Extracts the message of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
