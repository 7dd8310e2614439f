//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, GlobalConfig, ParleyConfig};
use std::collections::HashSet;

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    validate_global_config(&config.global)?;
    validate_bots_config(&config.bots)?;
    Ok(())
}

fn validate_global_config(global: &GlobalConfig) -> ConfigResult<()> {
    if global.cc.trim().is_empty() {
        return Err(ConfigError::validation(
            "Global control characters cannot be empty",
        ));
    }

    if global.boot_retry_secs == 0 {
        return Err(ConfigError::validation(
            "Boot retry delay must be greater than 0",
        ));
    }

    if global.wait_timeout_ms == 0 {
        return Err(ConfigError::validation("Wait timeout must be greater than 0"));
    }

    Ok(())
}

fn validate_bots_config(bots: &[BotConfig]) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for bot in bots {
        if !seen.insert(&bot.name) {
            return Err(ConfigError::DuplicateBotName(bot.name.clone()));
        }

        validate_bot_config(bot)?;
    }

    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.name.is_empty() {
        return Err(ConfigError::missing_field("bot.name"));
    }

    if bot.name.contains(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "Bot name cannot contain spaces: '{}'",
            bot.name
        )));
    }

    if bot.kind.is_empty() {
        return Err(ConfigError::missing_field(format!("bots.{}.type", bot.name)));
    }

    if bot.nick.is_empty() {
        return Err(ConfigError::missing_field(format!("bots.{}.nick", bot.name)));
    }

    if bot.ping_interval_secs == 0 {
        return Err(ConfigError::validation(format!(
            "Bot '{}': ping interval must be greater than 0",
            bot.name
        )));
    }

    if bot.reconnect_step_ms == 0 {
        return Err(ConfigError::validation(format!(
            "Bot '{}': reconnect step must be greater than 0",
            bot.name
        )));
    }

    if bot.reconnect_max_ms < bot.reconnect_step_ms {
        return Err(ConfigError::validation(format!(
            "Bot '{}': reconnect cap must be greater than or equal to the reconnect step",
            bot.name
        )));
    }

    if bot.output_limit == 0 {
        return Err(ConfigError::validation(format!(
            "Bot '{}': output limit must be greater than 0",
            bot.name
        )));
    }

    if let Some((channel, _)) = bot.channel_cc.iter().find(|(_, cc)| cc.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Bot '{}': control characters for {channel} cannot be empty",
            bot.name
        )));
    }

    if let Some(channel) = bot.channels.iter().find(|c| c.name.is_empty()) {
        return Err(ConfigError::validation(format!(
            "Bot '{}': channel name cannot be empty (key: {:?})",
            bot.name, channel.key
        )));
    }

    Ok(())
}
