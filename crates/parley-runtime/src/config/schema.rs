//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParleyConfig {
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Global settings that apply to all bots.
    #[serde(default)]
    pub global: GlobalConfig,

    /// Individual bot configurations.
    #[serde(default)]
    pub bots: Vec<BotConfig>,

    /// Per-plugin configuration, keyed by plugin id.
    #[serde(default)]
    pub plugins: HashMap<String, Value>,
}

impl ParleyConfig {
    /// Looks up a bot by name.
    pub fn bot(&self, name: &str) -> Option<&BotConfig> {
        self.bots.iter().find(|b| b.name == name)
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level, overridden by `RUST_LOG`.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line number.
    #[serde(default)]
    pub file_location: bool,

    /// Log file path when `output = "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Rotated log files kept; files rotate daily.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-module levels, e.g. `parley_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}

// =============================================================================
// Global
// =============================================================================

/// Global configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Control characters used where no channel-specific ones are set.
    #[serde(default = "default_cc")]
    pub cc: String,

    /// Give unknown origins a guest account when they issue a command.
    #[serde(default)]
    pub auto_register: bool,

    /// Root of the file store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Plugin packages loaded at boot, in order.
    #[serde(default = "default_plugin_packages")]
    pub plugin_packages: Vec<String>,

    /// Plugin ids never loaded.
    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Plugin ids protected from stale-plugin cleanup and `plug-disable`.
    #[serde(default = "default_plugins")]
    pub default_plugins: Vec<String>,

    /// Delay before a failed worker boot is retried.
    #[serde(default = "default_boot_retry_secs")]
    pub boot_retry_secs: u64,

    /// Owner origins shared by every bot.
    #[serde(default)]
    pub owner: Vec<String>,

    /// Budget for synchronous command waits.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            cc: default_cc(),
            auto_register: false,
            data_dir: default_data_dir(),
            plugin_packages: default_plugin_packages(),
            blacklist: Vec::new(),
            default_plugins: default_plugins(),
            boot_retry_secs: default_boot_retry_secs(),
            owner: Vec::new(),
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

impl GlobalConfig {
    pub fn boot_retry(&self) -> Duration {
        Duration::from_secs(self.boot_retry_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

fn default_cc() -> String {
    "!".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("parley"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn default_plugin_packages() -> Vec<String> {
    vec!["core".to_string()]
}

fn default_plugins() -> Vec<String> {
    vec!["core.plug".to_string()]
}

fn default_boot_retry_secs() -> u64 {
    15
}

fn default_wait_timeout_ms() -> u64 {
    1000
}

// =============================================================================
// Bots
// =============================================================================

/// A channel joined at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
        }
    }
}

/// Individual bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Unique name within the fleet.
    pub name: String,

    /// Driver kind, matched against the runtime's driver factories.
    #[serde(rename = "type")]
    pub kind: String,

    /// Nick used on the network.
    #[serde(default)]
    pub nick: String,

    /// Owner origins for this bot, in addition to the global ones.
    #[serde(default)]
    pub owner: Vec<String>,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    /// Control characters per channel.
    #[serde(default)]
    pub channel_cc: HashMap<String, String>,

    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Delay before the first ping check.
    #[serde(default = "default_ping_grace_secs")]
    pub ping_grace_secs: u64,

    /// Backoff added per reconnect attempt.
    #[serde(default = "default_reconnect_step_ms")]
    pub reconnect_step_ms: u64,

    /// Backoff cap.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Only process events from origins on the allow list.
    #[serde(default)]
    pub closed: bool,

    #[serde(default)]
    pub allow: Vec<String>,

    /// Pause after every dispatched event.
    #[serde(default = "default_benice_ms")]
    pub benice_ms: u64,

    /// Stagger between channel joins.
    #[serde(default = "default_join_delay_ms")]
    pub join_delay_ms: u64,

    /// Whether this bot is started.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Longest reply piece sent at once; the rest waits for `more`.
    #[serde(default = "default_output_limit")]
    pub output_limit: usize,

    /// Origins whose commands get no replies.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Driver-specific settings.
    #[serde(default)]
    pub settings: HashMap<String, Value>,
}

impl BotConfig {
    /// A bot with default timings.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            nick: name.clone(),
            name,
            kind: kind.into(),
            owner: Vec::new(),
            channels: Vec::new(),
            channel_cc: HashMap::new(),
            ping_interval_secs: default_ping_interval_secs(),
            ping_grace_secs: default_ping_grace_secs(),
            reconnect_step_ms: default_reconnect_step_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            closed: false,
            allow: Vec::new(),
            benice_ms: default_benice_ms(),
            join_delay_ms: default_join_delay_ms(),
            enabled: true,
            output_limit: default_output_limit(),
            ignore: Vec::new(),
            settings: HashMap::new(),
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_grace(&self) -> Duration {
        Duration::from_secs(self.ping_grace_secs)
    }

    pub fn reconnect_step(&self) -> Duration {
        Duration::from_millis(self.reconnect_step_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn benice(&self) -> Duration {
        Duration::from_millis(self.benice_ms)
    }

    pub fn join_delay(&self) -> Duration {
        Duration::from_millis(self.join_delay_ms)
    }
}

fn default_ping_interval_secs() -> u64 {
    60
}

fn default_ping_grace_secs() -> u64 {
    5
}

fn default_reconnect_step_ms() -> u64 {
    5000
}

fn default_reconnect_max_ms() -> u64 {
    302_000
}

fn default_benice_ms() -> u64 {
    5
}

fn default_join_delay_ms() -> u64 {
    3000
}

fn default_enabled() -> bool {
    true
}

fn default_output_limit() -> usize {
    parley_core::DEFAULT_OUTPUT_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_defaults_from_json() {
        let bot: BotConfig =
            serde_json::from_str(r#"{"name": "main", "type": "console", "nick": "parley"}"#)
                .unwrap();
        assert_eq!(bot.kind, "console");
        assert_eq!(bot.ping_interval(), Duration::from_secs(60));
        assert_eq!(bot.reconnect_step(), Duration::from_secs(5));
        assert_eq!(bot.reconnect_max(), Duration::from_secs(302));
        assert_eq!(bot.join_delay_ms, 3000);
        assert!(bot.enabled);
        assert!(!bot.closed);
        assert_eq!(bot.output_limit, 375);
        assert!(bot.ignore.is_empty());
    }

    #[test]
    fn test_global_defaults() {
        let global = GlobalConfig::default();
        assert_eq!(global.cc, "!");
        assert_eq!(global.boot_retry(), Duration::from_secs(15));
        assert_eq!(global.wait_timeout_ms, 1000);
        assert_eq!(global.default_plugins, vec!["core.plug"]);
    }
}
