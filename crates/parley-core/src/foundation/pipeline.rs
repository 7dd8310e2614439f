//! Command pipelining: `"!cmdA ! cmdB"` feeds `cmdA`'s output into `cmdB`.

use std::sync::Arc;

use tracing::{debug, info};

use super::event::{Event, PIPE_SEPARATOR, normalize_control_chars};
use crate::error::{ChatError, ChatResult};
use crate::framework::RegistryView;
use crate::integration::BoxedBot;

/// Splits `event` into chained stages and runs them left to right.
///
/// Every non-empty segment loses one leading control character, is
/// re-prefixed with `';'`, alias-expanded, and must name a command of
/// `view`; the first segment that does not aborts the pipeline with
/// [`ChatError::NoSuchCommand`] before anything runs. Stage
/// `i` reads from stage `i - 1`'s output queue. Only the last stage is left
/// un-pipelined, so its output reaches the caller.
///
/// With `direct` set every stage executes on the calling thread; otherwise
/// each stage is put on the worker's queue.
pub fn dopipe(
    event: &Arc<Event>,
    view: &RegistryView,
    bot: &BoxedBot,
    direct: bool,
) -> ChatResult<Vec<Arc<Event>>> {
    let (txt, origin, auth, nick, channel, user) = {
        let d = event.data();
        (
            d.txt.clone(),
            d.origin.clone(),
            d.auth.clone(),
            d.nick.clone(),
            d.channel.clone(),
            d.user.clone(),
        )
    };
    info!(bot = %bot.name(), segments = txt.matches(PIPE_SEPARATOR).count() + 1, "Starting pipeline");
    event.update(|d| d.flags.pipelined = true);

    let aliases = bot.aliases();
    let cc = normalize_control_chars(&bot.control_chars(&channel));
    let mut stages: Vec<Arc<Event>> = Vec::new();
    for segment in txt.split(PIPE_SEPARATOR) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let body = segment.strip_prefix(|c: char| cc.contains(c)).unwrap_or(segment);
        let line = format!(";{body}");

        let stage = bot.make_event(&origin, &channel, &line);
        stage.update(|d| {
            d.auth.clone_from(&auth);
            d.nick.clone_from(&nick);
            d.user.clone_from(&user);
            d.flags.pipelined = true;
            d.flags.dontbind = false;
        });
        stage.prepare(bot.as_ref());
        if let Some(aliases) = &aliases {
            aliases.apply(&stage, bot.as_ref());
        }
        if !view.commands.would_dispatch(&stage) {
            return Err(ChatError::NoSuchCommand(stage.txt()));
        }
        stages.push(Arc::new(stage));
    }

    for i in 1..stages.len() {
        stages[i].set_inqueue(stages[i - 1].outqueue());
        stages[i].set_prev(Some(Arc::clone(&stages[i - 1])));
    }
    if let Some(last) = stages.last() {
        last.update(|d| d.flags.pipelined = false);
    }

    for stage in &stages {
        debug!(command = %stage.data().usercmnd, direct, "Running pipeline stage");
        if direct {
            stage.execute_with(view, bot);
        } else {
            bot.put(Arc::clone(stage));
        }
    }
    Ok(stages)
}
