//! `core.size`: registry statistics.

use std::sync::Arc;

use parley_core::{BoxError, BoxedBot, Command, Event, HandlerResult, OPER, Outcome, handler};

use crate::plugin::{PluginDescriptor, PluginLoadContext};

pub const SIZE: PluginDescriptor =
    PluginDescriptor::new("core.size", init).desc("show handler, alias and plugin counts");

fn init(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
    ctx.command(Command::new("size", handler(size)).perms(&[OPER]));
    Ok(())
}

fn size(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let sizes = bot.registry().sizes();
    let mut result = vec![
        format!("first={}", sizes.first),
        format!("main={}", sizes.main),
        format!("last={}", sizes.last),
        format!("remote={}", sizes.remote),
        format!("commands={}", sizes.commands),
        format!("morphs={}", sizes.morphs),
    ];
    if let Some(aliases) = bot.aliases() {
        result.push(format!("aliases={}", aliases.len()));
    }
    if let Some(plugins) = bot.plugins() {
        result.push(format!("plugins={}", plugins.loaded().len()));
    }
    event.reply_with(bot, "sizes: ", &result);
    Ok(Outcome::Handled)
}
