//! `core.more`: fetch the next piece of a chopped reply.

use std::sync::Arc;

use parley_core::{
    BoxError, BoxedBot, ChatError, Command, Event, HandlerResult, OutputCache, Outcome, handler,
};

use crate::plugin::{PluginDescriptor, PluginLoadContext};

pub const MORE: PluginDescriptor =
    PluginDescriptor::new("core.more", init).desc("show the next piece of a long reply");

fn init(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
    ctx.command(Command::new("more", handler(more)));
    Ok(())
}

fn more(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let cache = bot
        .output_cache()
        .ok_or_else(|| BoxError::from(ChatError::require("output cache")))?;
    let key = OutputCache::key(bot.name(), event.data().target());
    // pieces already fit, chopping them again would overwrite the cache
    event.update(|d| d.flags.showall = true);
    match cache.more(&key) {
        Some((piece, 0)) => event.reply(bot, piece),
        Some((piece, left)) => event.reply(bot, format!("{piece} - {left} more")),
        None => event.reply(bot, "no more data available"),
    }
    Ok(Outcome::Handled)
}

#[cfg(test)]
mod tests {
    use parley_core::{EventCategory, EventData, Registry};

    use super::*;
    use crate::manager::PluginManager;
    use crate::plugin::builtin::CORE_PACKAGE;
    use crate::plugin::PluginCatalog;
    use crate::testing::TestBot;

    #[test]
    fn test_more_walks_cached_pieces() {
        let mut catalog = PluginCatalog::new();
        catalog.register(CORE_PACKAGE);
        let manager = Arc::new(PluginManager::new(Arc::new(Registry::new())).with_catalog(catalog));
        manager.load_all(&["core".to_string()]);
        let bot = TestBot::new(manager);
        let boxed: BoxedBot = bot.clone();

        let key = OutputCache::key("test", "alice");
        assert_eq!(bot.cache.chop(&key, "one two three", 5), "one - 2 more");

        for _ in 0..3 {
            let event = Arc::new(Event::new(
                EventData::new(EventCategory::Command, "!more").with_origin("alice"),
            ));
            event.execute(&boxed);
            assert!(event.flags().showall);
        }
        assert_eq!(
            bot.said(),
            vec![
                "two - 1 more".to_string(),
                "three".to_string(),
                "no more data available".to_string(),
            ]
        );
    }
}
