//! The `Bot` facade handlers talk to.
//!
//! A [`Bot`] is what a handler sees of the worker that dispatched its event:
//! identity, control characters, the shared [`Registry`], the user directory,
//! and the ways to produce work (`put` an event, `say` or `broadcast` text).

use std::sync::{Arc, Weak};

use crate::foundation::{Event, EventCategory, EventData, OutputCache, make_response};
use crate::framework::{AliasTable, Registry};

use super::plugins::PluginControl;
use super::users::UserDirectory;

/// A running bot as seen by handlers.
pub trait Bot: Send + Sync {
    /// Configured bot name; unique within a fleet.
    fn name(&self) -> &str;

    /// Current nick on the network.
    fn nick(&self) -> String;

    /// Control characters in effect for `channel`.
    fn control_chars(&self, channel: &str) -> String;

    /// The shared handler registry.
    fn registry(&self) -> Arc<Registry>;

    /// The user directory.
    fn users(&self) -> Arc<dyn UserDirectory>;

    /// Whether unknown origins get a guest account when they issue a command.
    fn auto_register(&self) -> bool {
        false
    }

    /// Whether the bot is joined to `channel`.
    fn is_joined(&self, channel: &str) -> bool;

    /// Channels the bot is currently joined to.
    fn joined_channels(&self) -> Vec<String> {
        Vec::new()
    }

    /// Enqueues an event for the event loop.
    fn put(&self, event: Arc<Event>);

    /// Sends `txt` followed by `result` to `target`.
    ///
    /// When `event` is given the reply is recorded on it first, see
    /// [`Event::record_reply`].
    fn say(&self, target: &str, txt: &str, result: &[String], event: Option<&Arc<Event>>);

    /// Builds a command event as if `txt` arrived from `origin` on `channel`.
    fn make_event(&self, origin: &str, channel: &str, txt: &str) -> Event {
        let mut data = EventData::new(EventCategory::Command, txt)
            .with_origin(origin)
            .with_channel(channel);
        data.bot_name = self.name().to_string();
        Event::new(data)
    }

    /// Says `txt` on every joined channel.
    fn broadcast(&self, txt: &str) {
        for channel in self.joined_channels() {
            self.say(&channel, txt, &[], None);
        }
    }

    /// Plugin control, when a plugin manager is attached.
    fn plugins(&self) -> Option<Arc<dyn PluginControl>> {
        None
    }

    /// The alias table command words are expanded with.
    fn aliases(&self) -> Option<Arc<AliasTable>> {
        None
    }

    /// Where chopped replies wait for `more`.
    fn output_cache(&self) -> Option<Arc<OutputCache>> {
        None
    }
}

/// Shared handle to a bot.
pub type BoxedBot = Arc<dyn Bot>;

/// Non-owning handle given to drivers.
pub type WeakBot = Weak<dyn Bot>;

/// Renders a reply without recording it on an event.
pub fn render_reply(txt: &str, result: &[String]) -> String {
    make_response(txt, result, ", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBot;

    #[test]
    fn test_broadcast_reaches_every_joined_channel() {
        let bot = MockBot::new();
        bot.join("#a");
        bot.join("#b");
        bot.broadcast("restarting");
        assert_eq!(bot.targets(), vec!["#a".to_string(), "#b".to_string()]);
        assert_eq!(bot.said(), vec!["restarting".to_string(); 2]);
    }
}
