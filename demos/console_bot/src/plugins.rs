//! Plugins linked into the console bot as the `demo` package.

use std::sync::Arc;

use parley::plugin_package;
use parley::prelude::*;
use serde::Deserialize;

pub const ECHO: PluginDescriptor =
    PluginDescriptor::new("demo.echo", init_echo).desc("echo and upper commands");

pub const GREETER: PluginDescriptor =
    PluginDescriptor::new("demo.greeter", init_greeter).desc("greets whoever says hello");

plugin_package!(pub DEMO = "demo" [ECHO, GREETER]);

fn init_echo(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
    ctx.command(Command::new("echo", handler(echo)))
        .command(Command::new("upper", handler(upper)));
    Ok(())
}

/// Pipeline input when there is any, the command arguments otherwise.
fn input_of(event: &Event) -> String {
    let input = event.take_input();
    if input.is_empty() {
        event.data().rest.clone()
    } else {
        input.join(" ")
    }
}

fn echo(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    let text = input_of(event);
    if text.is_empty() {
        event.missing(bot, "<text>");
    } else {
        event.reply(bot, text);
    }
    Ok(Outcome::Handled)
}

fn upper(bot: &BoxedBot, event: &Arc<Event>) -> HandlerResult {
    event.reply(bot, input_of(event).to_uppercase());
    Ok(Outcome::Handled)
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GreeterConfig {
    greeting: String,
}

impl Default for GreeterConfig {
    fn default() -> Self {
        Self {
            greeting: "hello".into(),
        }
    }
}

fn init_greeter(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
    let config: GreeterConfig = ctx.get_config()?;
    let greeting = config.greeting;
    ctx.last(
        EventCategory::Message,
        Callback::new(
            "greet",
            handler(move |bot, event| {
                let nick = event.data().nick.clone();
                event.reply(bot, format!("{greeting}, {nick}!"));
                Ok(Outcome::Handled)
            }),
        )
        .when(|_, event| {
            let data = event.data();
            !data.flags.iscommand && data.txt.to_lowercase().starts_with("hello")
        }),
    );
    Ok(())
}
