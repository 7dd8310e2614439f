//! Error types for the plugin layer.

use parley_core::{BoxError, ChatError};
use thiserror::Error;

/// Errors raised while loading or unloading plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No package provides the plugin id.
    #[error("no such plugin: {0}")]
    NoSuchPlugin(String),

    /// No package with that name is known.
    #[error("no such plugin package: {0}")]
    NoSuchPackage(String),

    /// `init` declined because a runtime precondition is unmet.
    #[error("plugin '{id}' requirement not met: {reason}")]
    Require { id: String, reason: String },

    /// `init` returned an error.
    #[error("plugin '{id}' failed to initialize: {source}")]
    Init {
        id: String,
        #[source]
        source: BoxError,
    },

    /// A hook panicked.
    #[error("plugin '{id}' panicked in {hook}: {message}")]
    Panicked {
        id: String,
        hook: &'static str,
        message: String,
    },

    /// A declared dependency failed to load.
    #[error("plugin '{id}' dependency '{dependency}' failed: {source}")]
    Dependency {
        id: String,
        dependency: String,
        #[source]
        source: Box<PluginError>,
    },

    /// Default plugins cannot be disabled.
    #[error("can't remove a default plugin: {0}")]
    Protected(String),

    /// Blacklist persistence failed.
    #[error(transparent)]
    Store(#[from] ChatError),
}

impl PluginError {
    /// Builds the error for a failed `init`, keeping requirement failures apart.
    pub fn from_init(id: &str, source: BoxError) -> Self {
        match ChatError::from_boxed(&source) {
            Some(ChatError::Require(reason)) => Self::Require {
                id: id.to_string(),
                reason: reason.clone(),
            },
            _ => Self::Init {
                id: id.to_string(),
                source,
            },
        }
    }

    /// Requirement failures are skipped quietly, also through dependencies.
    pub fn is_require(&self) -> bool {
        match self {
            Self::Require { .. } => true,
            Self::Dependency { source, .. } => source.is_require(),
            _ => false,
        }
    }
}

impl From<PluginError> for ChatError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::NoSuchPlugin(id) => ChatError::NoSuchPlugin(id),
            PluginError::Require { reason, .. } => ChatError::Require(reason),
            PluginError::Store(inner) => inner,
            other => ChatError::Plugin(other.to_string()),
        }
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
