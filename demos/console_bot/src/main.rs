//! Console Bot Example
//!
//! Runs one bot whose driver reads stdin and prints replies to stdout.
//!
//! ```text
//! !echo hello            -> [you] hello
//! !echo hi there ! upper -> [you] HI THERE
//! hello                  -> [you] hello, you!
//! !size                  -> handler and plugin counts (owner only)
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --nick parley
//! cargo run --package console-bot -- --config parley.toml --verbose
//! ```
//!
//! Settings from the config file override the defaults built here; the
//! greeting can be changed with
//!
//! ```toml
//! [plugins."demo.greeter"]
//! greeting = "ahoy"
//! ```

mod driver;
mod plugins;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use parley::core::BoxedDriver;
use parley::runtime::config::LogLevel;
use parley::runtime::{BotConfig, ParleyConfig, ParleyRuntime};
use tokio::sync::Notify;
use tracing::info;

use crate::driver::{ConsoleDriver, ORIGIN};

#[derive(Debug, Parser)]
#[command(name = "console-bot", about = "Chat with a Parley bot on the console")]
struct Cli {
    /// Configuration file; defaults to parley.toml in the current directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. "development"
    #[arg(short, long)]
    profile: Option<String>,

    /// Nick the bot answers to
    #[arg(long, default_value = "parley")]
    nick: String,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn defaults(cli: &Cli) -> ParleyConfig {
    let mut config = ParleyConfig::default();
    config.global.plugin_packages = vec!["core".into(), "demo".into()];
    config.global.auto_register = true;
    config.global.owner = vec![ORIGIN.into()];

    let mut bot = BotConfig::new("console", "console");
    bot.nick.clone_from(&cli.nick);
    config.bots.push(bot);

    if cli.verbose {
        config.logging.level = LogLevel::Debug;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = ParleyRuntime::builder().merge(defaults(&cli));
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &cli.profile {
        builder = builder.profile(profile.as_str());
    }
    let runtime = builder.build()?;

    let eof = Arc::new(Notify::new());
    let notify = Arc::clone(&eof);
    runtime.register_driver("console", move |_: &BotConfig| {
        Ok(Arc::new(ConsoleDriver::new(Arc::clone(&notify))) as BoxedDriver)
    });

    info!("Type `!echo hello`, `!echo hi ! upper` or `hello`; Ctrl+D quits");
    runtime
        .run_until(async move {
            tokio::select! {
                _ = eof.notified() => info!("Console closed, shutting down"),
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
            }
        })
        .await?;

    Ok(())
}
