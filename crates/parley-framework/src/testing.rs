//! Test doubles for the plugin layer.

use std::sync::Arc;

use parking_lot::Mutex;
use parley_core::{
    AliasTable, Bot, Event, GUEST, OPER, OutputCache, PluginControl, Registry, User, UserDirectory,
    make_response,
};

use crate::manager::PluginManager;

pub struct Operators;

impl UserDirectory for Operators {
    fn get_user(&self, origin: &str) -> Option<User> {
        let perms = if origin == "oper" { OPER } else { GUEST };
        Some(User::new(origin, [perms]))
    }

    fn add_guest(&self, _origin: &str, _nick: &str) -> Option<User> {
        None
    }
}

/// A bot wired to a plugin manager, recording everything it says.
pub struct TestBot {
    pub manager: Arc<PluginManager>,
    pub aliases: Arc<AliasTable>,
    pub cache: Arc<OutputCache>,
    said: Mutex<Vec<String>>,
}

impl TestBot {
    pub fn new(manager: Arc<PluginManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            aliases: Arc::new(AliasTable::new()),
            cache: Arc::new(OutputCache::new()),
            said: Mutex::new(Vec::new()),
        })
    }

    pub fn said(&self) -> Vec<String> {
        self.said.lock().clone()
    }
}

impl Bot for TestBot {
    fn name(&self) -> &str {
        "test"
    }

    fn nick(&self) -> String {
        "parley".into()
    }

    fn control_chars(&self, _channel: &str) -> String {
        "!".into()
    }

    fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.manager.registry())
    }

    fn users(&self) -> Arc<dyn UserDirectory> {
        Arc::new(Operators)
    }

    fn is_joined(&self, _channel: &str) -> bool {
        false
    }

    fn put(&self, _event: Arc<Event>) {}

    fn say(&self, _target: &str, txt: &str, result: &[String], event: Option<&Arc<Event>>) {
        let rendered = match event {
            Some(event) => event.record_reply(txt, result, ", "),
            None => Some(make_response(txt, result, ", ")),
        };
        if let Some(rendered) = rendered {
            self.said.lock().push(rendered);
        }
    }

    fn plugins(&self) -> Option<Arc<dyn PluginControl>> {
        Some(self.manager.clone())
    }

    fn aliases(&self) -> Option<Arc<AliasTable>> {
        Some(Arc::clone(&self.aliases))
    }

    fn output_cache(&self) -> Option<Arc<OutputCache>> {
        Some(Arc::clone(&self.cache))
    }
}
