//! Configuration for the Parley runtime.
//!
//! Layered figment loading (defaults, files, `PARLEY_*` environment) of
//! logging, global and per-bot settings, plus validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, ChannelConfig, GlobalConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    ParleyConfig, SpanEventConfig,
};
pub use validation::validate_config;
