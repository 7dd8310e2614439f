//! `core.alias`: manage the shared alias table.

use std::sync::Arc;

use parley_core::{
    AliasTable, BoxError, BoxedBot, ChatError, Command, Event, HandlerResult, OPER, Outcome,
    handler,
};
use tracing::warn;

use crate::plugin::{PluginDescriptor, PluginLoadContext};

pub const ALIAS: PluginDescriptor =
    PluginDescriptor::new("core.alias", init).desc("set, delete and list command aliases");

fn init(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
    ctx.command(Command::new("alias-set", handler(alias_set)).perms(&[OPER]))
        .command(Command::new("alias-del", handler(alias_del)).perms(&[OPER]))
        .command(Command::new("alias-list", handler(alias_list)));
    Ok(())
}

fn table(bot: &BoxedBot) -> Result<Arc<AliasTable>, BoxError> {
    bot.aliases()
        .ok_or_else(|| BoxError::from(ChatError::require("alias table")))
}

fn persist(table: &AliasTable) {
    if let Err(err) = table.save() {
        warn!(error = %err, "Cannot save aliases");
    }
}

fn alias_set(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let aliases = table(bot)?;
    let args = event.data().args.clone();
    let [from, to @ ..] = args.as_slice() else {
        event.missing(bot, "<alias> <command ...>");
        return Ok(Outcome::Handled);
    };
    if to.is_empty() {
        event.missing(bot, "<alias> <command ...>");
        return Ok(Outcome::Handled);
    }
    let to = to.join(" ");
    aliases.set(from.clone(), to.clone());
    persist(&aliases);
    event.reply(bot, format!("{from} aliased to {to}"));
    Ok(Outcome::Handled)
}

fn alias_del(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let aliases = table(bot)?;
    let first = event.data().args.first().cloned();
    let Some(from) = first else {
        event.missing(bot, "<alias>");
        return Ok(Outcome::Handled);
    };
    if aliases.remove(&from) {
        persist(&aliases);
        event.reply(bot, format!("{from} removed"));
    } else {
        event.reply(bot, format!("no alias {from}"));
    }
    Ok(Outcome::Handled)
}

fn alias_list(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let aliases = table(bot)?;
    let entries: Vec<String> = aliases
        .entries()
        .into_iter()
        .map(|(from, to)| format!("{from} = {to}"))
        .collect();
    if entries.is_empty() {
        event.reply(bot, "no aliases set");
    } else {
        event.reply_with(bot, "aliases: ", &entries);
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

    fn setup() -> (Arc<TestBot>, BoxedBot) {
        let mut catalog = PluginCatalog::new();
        catalog.register(CORE_PACKAGE);
        let manager = Arc::new(PluginManager::new(Arc::new(Registry::new())).with_catalog(catalog));
        manager.load_all(&["core".to_string()]);
        let bot = TestBot::new(manager);
        let boxed: BoxedBot = bot.clone();
        (bot, boxed)
    }

    fn run(boxed: &BoxedBot, origin: &str, txt: &str) {
        let event = Arc::new(Event::new(
            EventData::new(EventCategory::Command, txt).with_origin(origin),
        ));
        event.execute(boxed);
    }

    #[test]
    fn test_alias_set_then_used() {
        let (bot, boxed) = setup();
        run(&boxed, "oper", "!alias-set ls plug-list");
        run(&boxed, "oper", "!ls");

        let said = bot.said();
        assert_eq!(said[0], "ls aliased to plug-list");
        assert!(said[1].starts_with("loaded plugins: core.alias"));
        assert_eq!(bot.aliases.get("ls").as_deref(), Some("plug-list"));
    }

    #[test]
    fn test_alias_del_and_list() {
        let (bot, boxed) = setup();
        bot.aliases.set("a", "size");
        bot.aliases.set("b", "more");
        run(&boxed, "guest", "!alias-list");
        run(&boxed, "oper", "!alias-del a");
        run(&boxed, "oper", "!alias-del a");
        run(&boxed, "guest", "!alias-set c size");

        assert_eq!(
            bot.said(),
            vec![
                "aliases: a = size, b = more".to_string(),
                "a removed".to_string(),
                "no alias a".to_string(),
                "guest is not permitted to run alias-set".to_string(),
            ]
        );
    }

    #[test]
    fn test_alias_set_usage() {
        let (bot, boxed) = setup();
        run(&boxed, "oper", "!alias-set lonely");
        assert_eq!(bot.said(), vec!["alias-set <alias> <command ...>".to_string()]);
    }
}
