//! Command aliases shared by every bot of a runtime.
//!
//! An alias maps a command word to replacement text. When an event's first
//! command word is aliased, the word is replaced once in both `txt` and
//! `execstr` and the event is prepared again, so `"!hi there"` with
//! `hi = "echo hello"` dispatches as `"!echo hello there"`.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::foundation::Event;
use crate::integration::{Bot, SharedStore};

/// Store key of the persisted alias map.
pub const ALIAS_KEY: &str = "run/aliases";

#[derive(Default)]
pub struct AliasTable {
    entries: RwLock<BTreeMap<String, String>>,
    store: Option<SharedStore>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table persisted under [`ALIAS_KEY`] in `store`.
    pub fn with_store(store: SharedStore) -> Self {
        Self {
            entries: RwLock::default(),
            store: Some(store),
        }
    }

    pub fn set(&self, from: impl Into<String>, to: impl Into<String>) {
        let (from, to) = (from.into(), to.into());
        debug!(alias = %from, target = %to, "Alias set");
        self.entries.write().insert(from, to);
    }

    pub fn remove(&self, from: &str) -> bool {
        self.entries.write().remove(from).is_some()
    }

    pub fn get(&self, from: &str) -> Option<String> {
        self.entries.read().get(from).cloned()
    }

    /// Sorted `(alias, replacement)` pairs.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replaces the table with the persisted map. Returns the number of
    /// aliases loaded; a table without store loads nothing.
    pub fn restore(&self) -> ChatResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let Some(document) = store.load(ALIAS_KEY)? else {
            return Ok(0);
        };
        let Value::Object(map) = document else {
            return Err(ChatError::persistence(format!("{ALIAS_KEY} is not an object")));
        };
        let mut loaded = BTreeMap::new();
        for (from, to) in map {
            match to {
                Value::String(to) => {
                    loaded.insert(from, to);
                }
                other => warn!(alias = %from, value = %other, "Skipping non-text alias"),
            }
        }
        let count = loaded.len();
        *self.entries.write() = loaded;
        Ok(count)
    }

    pub fn save(&self) -> ChatResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let document = Value::Object(
            self.entries
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        );
        store.save(ALIAS_KEY, &document)
    }

    /// Expands the event's command word if it is aliased.
    ///
    /// An event is expanded at most once. Returns `true` if it was.
    pub fn apply(&self, event: &Event, bot: &dyn Bot) -> bool {
        let word = {
            let d = event.data();
            if !d.aliased.is_empty() {
                return false;
            }
            match d.execstr.split_whitespace().next() {
                Some(word) => word.to_string(),
                None => return false,
            }
        };
        let Some(alias) = self.get(&word) else {
            return false;
        };
        event.update(|d| {
            d.txt = d.txt.replacen(&word, &alias, 1);
            d.execstr = d.execstr.replacen(&word, &alias, 1);
            d.alias.clone_from(&alias);
            d.aliased.clone_from(&word);
        });
        event.prepare(bot);
        debug!(alias = %word, target = %alias, "Alias expanded");
        true
    }
}

impl std::fmt::Debug for AliasTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasTable")
            .field("entries", &self.len())
            .field("persisted", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::integration::Persistence;
    use crate::testing::MockBot;

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<String, Value>>);

    impl Persistence for MapStore {
        fn load(&self, key: &str) -> ChatResult<Option<Value>> {
            Ok(self.0.lock().get(key).cloned())
        }

        fn save(&self, key: &str, document: &Value) -> ChatResult<()> {
            self.0.lock().insert(key.to_string(), document.clone());
            Ok(())
        }

        fn exists(&self, key: &str) -> bool {
            self.0.lock().contains_key(key)
        }
    }

    #[test]
    fn test_apply_rewrites_command_word() {
        let bot = MockBot::new();
        let aliases = AliasTable::new();
        aliases.set("hi", "echo hello");

        let event = Event::command("!hi there");
        event.prepare(bot.as_ref());
        assert!(aliases.apply(&event, bot.as_ref()));

        let d = event.data();
        assert_eq!(d.txt, "!echo hello there");
        assert_eq!(d.usercmnd, "echo");
        assert_eq!(d.rest, "hello there");
        assert_eq!(d.alias, "echo hello");
        assert_eq!(d.aliased, "hi");
    }

    #[test]
    fn test_apply_only_once() {
        let bot = MockBot::new();
        let aliases = AliasTable::new();
        aliases.set("a", "b x");
        aliases.set("b", "c y");

        let event = Event::command("!a");
        event.prepare(bot.as_ref());
        assert!(aliases.apply(&event, bot.as_ref()));
        assert!(!aliases.apply(&event, bot.as_ref()));
        assert_eq!(event.data().usercmnd, "b");
    }

    #[test]
    fn test_unaliased_and_plain_text_untouched() {
        let bot = MockBot::new();
        let aliases = AliasTable::new();
        aliases.set("hi", "echo hello");

        let event = Event::command("!echo hi");
        event.prepare(bot.as_ref());
        assert!(!aliases.apply(&event, bot.as_ref()));
        assert_eq!(event.txt(), "!echo hi");

        let chatter = Event::command("hi everyone");
        chatter.prepare(bot.as_ref());
        assert!(!aliases.apply(&chatter, bot.as_ref()));
    }

    #[test]
    fn test_persisted_across_tables() {
        let store: SharedStore = Arc::new(MapStore::default());
        let first = AliasTable::with_store(Arc::clone(&store));
        first.set("hi", "echo hello");
        first.set("bye", "echo ciao");
        first.save().unwrap();

        let second = AliasTable::with_store(store);
        assert_eq!(second.restore().unwrap(), 2);
        assert_eq!(second.get("bye").as_deref(), Some("echo ciao"));
        assert!(second.remove("bye"));
        assert_eq!(second.entries(), vec![("hi".to_string(), "echo hello".to_string())]);
    }
}
