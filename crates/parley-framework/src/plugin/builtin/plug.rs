//! `core.plug`: plugin administration commands.

use std::sync::Arc;

use parley_core::{
    BoxError, BoxedBot, ChatError, Command, Event, HandlerResult, OPER, Outcome, PluginControl,
    handler,
};

use crate::plugin::{PluginDescriptor, PluginLoadContext};

pub const PLUG: PluginDescriptor = PluginDescriptor::new("core.plug", init)
    .desc("reload, enable, disable and list plugins");

fn init(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
    ctx.command(Command::new("plug-reload", handler(plug_reload)).perms(&[OPER]))
        .command(Command::new("plug-enable", handler(plug_enable)).perms(&[OPER]))
        .command(Command::new("plug-disable", handler(plug_disable)).perms(&[OPER]))
        .command(Command::new("plug-list", handler(plug_list)).perms(&[OPER]));
    Ok(())
}

fn control(bot: &BoxedBot) -> Result<Arc<dyn PluginControl>, BoxError> {
    bot.plugins()
        .ok_or_else(|| BoxError::from(ChatError::PlugsNotConnected))
}

fn plug_reload(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let plugins = control(bot)?;
    let ids = event.data().args.clone();
    if ids.is_empty() {
        event.missing(bot, "<plugin id> [<plugin id> ...]");
        return Ok(Outcome::Handled);
    }

    let report = plugins.reload(&ids);
    if !report.is_clean() {
        let errors: Vec<String> = report
            .errors
            .iter()
            .map(|(id, reason)| format!("{id} ({reason})"))
            .collect();
        event.reply_with(bot, "errors: ", &errors);
    }
    event.reply_with(bot, "reloaded: ", &report.reloaded);
    Ok(Outcome::Handled)
}

fn plug_enable(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let plugins = control(bot)?;
    let first = event.data().args.first().cloned();
    let Some(id) = first else {
        event.missing(bot, "<plugin id>");
        return Ok(Outcome::Handled);
    };
    match plugins.enable(&id) {
        Ok(()) => event.reply(bot, format!("{id} enabled")),
        Err(err) => event.reply(bot, format!("can't enable {id}: {err}")),
    }
    Ok(Outcome::Handled)
}

fn plug_disable(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let plugins = control(bot)?;
    let first = event.data().args.first().cloned();
    let Some(id) = first else {
        event.missing(bot, "<plugin id>");
        return Ok(Outcome::Handled);
    };
    if plugins.is_default(&id) {
        event.reply(bot, "can't remove a default plugin");
        return Ok(Outcome::Handled);
    }
    match plugins.disable(&id) {
        Ok(()) => event.reply(bot, format!("{id} disabled")),
        Err(err) => event.reply(bot, format!("can't disable {id}: {err}")),
    }
    Ok(Outcome::Handled)
}

fn plug_list(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let plugins = control(bot)?;
    event.reply_with(bot, "loaded plugins: ", &plugins.loaded());
    Ok(Outcome::Handled)
}

#[cfg(test)]
mod tests {
    use parley_core::{BoxedBot, EventCategory, EventData};

    use super::*;
    use crate::manager::PluginManager;
    use crate::plugin::{PluginCatalog, PluginPackage};
    use crate::plugin::builtin::SIZE;
    use crate::testing::TestBot;

    fn echo_init(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
        ctx.command(Command::new("echo", handler(|_, _| Ok(Outcome::Handled))));
        Ok(())
    }

    fn broken_init(_: &mut PluginLoadContext) -> Result<(), BoxError> {
        Err("broken on purpose".into())
    }

    static PLUGINS: [PluginDescriptor; 4] = [
        PLUG,
        SIZE,
        PluginDescriptor::new("t.echo", echo_init),
        PluginDescriptor::new("t.broken", broken_init),
    ];

    fn setup() -> (Arc<TestBot>, BoxedBot) {
        let mut catalog = PluginCatalog::new();
        catalog.register(PluginPackage {
            name: "t",
            plugins: &PLUGINS,
        });
        let manager = Arc::new(
            PluginManager::new(Arc::new(parley_core::Registry::new()))
                .with_catalog(catalog)
                .with_defaults(["core.plug", "core.size"]),
        );
        manager.load_all(&["t".to_string()]);
        let bot = TestBot::new(manager);
        let boxed: BoxedBot = bot.clone();
        (bot, boxed)
    }

    fn run(boxed: &BoxedBot, origin: &str, txt: &str) -> Arc<Event> {
        let event = Arc::new(Event::new(
            EventData::new(EventCategory::Command, txt).with_origin(origin),
        ));
        event.execute(boxed)
    }

    #[test]
    fn test_plug_reload_reports_both_lists() {
        let (bot, boxed) = setup();
        run(&boxed, "oper", "!plug-reload t.echo t.broken");

        let said = bot.said();
        assert_eq!(said.len(), 2);
        assert!(said[0].starts_with("errors: t.broken ("));
        assert_eq!(said[1], "reloaded: t.echo");
        assert!(bot.manager.is_loaded("t.echo"));
    }

    #[test]
    fn test_plug_disable_refuses_default() {
        let (bot, boxed) = setup();
        run(&boxed, "oper", "!plug-disable core.plug");
        assert_eq!(bot.said(), vec!["can't remove a default plugin".to_string()]);
        assert!(bot.manager.is_loaded("core.plug"));
    }

    #[test]
    fn test_plug_disable_and_enable() {
        let (bot, boxed) = setup();
        run(&boxed, "oper", "!plug-disable t.echo");
        assert!(!bot.manager.is_loaded("t.echo"));
        assert!(bot.manager.registry().view().commands.get("echo").is_none());

        run(&boxed, "oper", "!plug-enable t.echo");
        assert!(bot.manager.is_loaded("t.echo"));
        assert_eq!(
            bot.said(),
            vec!["t.echo disabled".to_string(), "t.echo enabled".to_string()]
        );
    }

    #[test]
    fn test_plug_commands_require_oper() {
        let (bot, boxed) = setup();
        run(&boxed, "guest", "!plug-list");
        assert_eq!(bot.said(), vec!["guest is not permitted to run plug-list".to_string()]);

        run(&boxed, "oper", "!plug-list");
        assert_eq!(
            bot.said().last().map(String::as_str),
            Some("loaded plugins: core.plug, core.size, t.echo")
        );
    }

    #[test]
    fn test_size_reports_counts() {
        let (bot, boxed) = setup();
        run(&boxed, "oper", "!size");
        assert_eq!(
            bot.said(),
            vec!["sizes: first=0, main=0, last=0, remote=0, commands=6, morphs=0, aliases=0, plugins=3".to_string()]
        );
    }
}
