//! Integration layer - collaborator interfaces.
//!
//! This module contains the narrow traits the runtime consumes:
//! - The [`Bot`] facade handlers talk to
//! - Protocol drivers
//! - Persistence
//! - User directory and gatekeeper
//! - Plugin control exposed to operator commands

pub mod bot;
pub mod driver;
pub mod persistence;
pub mod plugins;
pub mod users;

pub use bot::{Bot, BoxedBot, WeakBot, render_reply};
pub use driver::{BoxedDriver, Driver};
pub use persistence::{Persistence, SharedStore};
pub use plugins::{PluginControl, ReloadReport};
pub use users::{GUEST, Gatekeeper, OPER, OWNER, USER, User, UserDirectory};
