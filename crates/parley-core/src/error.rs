//! Unified error types for the Parley core.
//!
//! [`ChatError`] is the taxonomy shared by every layer of the runtime. Handlers
//! return a [`BoxError`] so plugins are free to use their own error types; the
//! chains downcast to [`ChatError`] to decide how loudly a failure is logged.

use thiserror::Error;

/// Type-erased error returned by handlers, predicates and plugin hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the dispatch runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// An operation was invoked without a target event.
    #[error("no event provided")]
    NoEventProvided,

    /// Command lookup miss.
    #[error("no such command: {0}")]
    NoSuchCommand(String),

    /// Plugin lookup miss.
    #[error("no such plugin: {0}")]
    NoSuchPlugin(String),

    /// No user could be resolved for an origin.
    #[error("no such user: {0}")]
    NoSuchUser(String),

    /// A plugin or handler declined because a runtime precondition is unmet.
    #[error("requirement not met: {0}")]
    Require(String),

    /// Remote envelope failed HMAC verification.
    #[error("remote event digest does not match")]
    NoProperDigest,

    /// Remote envelope could not be decoded.
    #[error("invalid remote envelope: {0}")]
    InvalidEnvelope(String),

    /// Plugin packages are configured but no plugin manager is attached.
    #[error("plugins are not connected to this bot")]
    PlugsNotConnected,

    /// The bot has no owner configured.
    #[error("no owner set for bot")]
    NoOwnerSet,

    /// The bot has no name configured.
    #[error("bot name not set")]
    NameNotSet,

    /// The acting user lacks the permissions a command requires.
    #[error("{user} is not permitted to run {command}")]
    PermissionDenied {
        /// Command that was refused.
        command: String,
        /// User that attempted it.
        user: String,
    },

    /// Plugin load or unload failure.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// Driver I/O failure.
    #[error("driver error: {0}")]
    Driver(String),

    /// Persistence collaborator failure.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl ChatError {
    /// Creates a [`ChatError::Require`] error.
    pub fn require(reason: impl Into<String>) -> Self {
        Self::Require(reason.into())
    }

    /// Creates a [`ChatError::Driver`] error.
    pub fn driver(reason: impl Into<String>) -> Self {
        Self::Driver(reason.into())
    }

    /// Creates a [`ChatError::Persistence`] error.
    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence(reason.into())
    }

    /// Lookup misses and declined preconditions: reported, never fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoSuchCommand(_)
                | Self::NoSuchPlugin(_)
                | Self::NoSuchUser(_)
                | Self::Require(_)
                | Self::PermissionDenied { .. }
        )
    }

    /// Configuration invariants checked when a worker boots.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::PlugsNotConnected | Self::NoOwnerSet | Self::NameNotSet
        )
    }

    /// Returns the [`ChatError`] carried by a boxed handler error, if any.
    pub fn from_boxed(err: &BoxError) -> Option<&ChatError> {
        err.downcast_ref::<ChatError>()
    }
}

/// Result type for core operations.
pub type ChatResult<T> = Result<T, ChatError>;
