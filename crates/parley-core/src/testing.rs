//! Test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::foundation::{Event, make_response};
use crate::framework::{AliasTable, Registry};
use crate::integration::{Bot, GUEST, User, UserDirectory};

#[derive(Default)]
pub struct MockUsers {
    users: Mutex<HashMap<String, User>>,
}

impl UserDirectory for MockUsers {
    fn get_user(&self, origin: &str) -> Option<User> {
        self.users.lock().get(origin).cloned()
    }

    fn add_guest(&self, origin: &str, _nick: &str) -> Option<User> {
        let user = User::new(origin, [GUEST]);
        self.users.lock().insert(origin.to_string(), user.clone());
        Some(user)
    }
}

pub struct MockBot {
    registry: Arc<Registry>,
    aliases: Arc<AliasTable>,
    users: Arc<MockUsers>,
    joined: Mutex<Vec<String>>,
    auto_register: AtomicBool,
    said: Mutex<Vec<String>>,
    targets: Mutex<Vec<String>>,
    queued: Mutex<Vec<Arc<Event>>>,
}

impl MockBot {
    /// A bot whose directory knows `alice` as a regular user.
    pub fn new() -> Arc<Self> {
        let users = MockUsers::default();
        users
            .users
            .lock()
            .insert("alice".into(), User::new("alice", [crate::integration::USER]));
        Arc::new(Self {
            registry: Arc::new(Registry::new()),
            aliases: Arc::new(AliasTable::new()),
            users: Arc::new(users),
            joined: Mutex::new(Vec::new()),
            auto_register: AtomicBool::new(false),
            said: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
            queued: Mutex::new(Vec::new()),
        })
    }

    pub fn with_auto_register(self: Arc<Self>) -> Arc<Self> {
        self.auto_register.store(true, Ordering::SeqCst);
        self
    }

    pub fn join(&self, channel: &str) {
        self.joined.lock().push(channel.to_string());
    }

    pub fn aliases_table(&self) -> Arc<AliasTable> {
        Arc::clone(&self.aliases)
    }

    /// Targets of every transmitted reply, in order.
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().clone()
    }

    pub fn said(&self) -> Vec<String> {
        self.said.lock().clone()
    }

    pub fn queued(&self) -> Vec<Arc<Event>> {
        self.queued.lock().clone()
    }
}

impl Bot for MockBot {
    fn name(&self) -> &str {
        "mock"
    }

    fn nick(&self) -> String {
        "parley".into()
    }

    fn control_chars(&self, _channel: &str) -> String {
        "!".into()
    }

    fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    fn users(&self) -> Arc<dyn UserDirectory> {
        self.users.clone()
    }

    fn auto_register(&self) -> bool {
        self.auto_register.load(Ordering::SeqCst)
    }

    fn is_joined(&self, channel: &str) -> bool {
        self.joined.lock().iter().any(|c| c == channel)
    }

    fn joined_channels(&self) -> Vec<String> {
        self.joined.lock().clone()
    }

    fn aliases(&self) -> Option<Arc<AliasTable>> {
        Some(Arc::clone(&self.aliases))
    }

    fn put(&self, event: Arc<Event>) {
        self.queued.lock().push(event);
    }

    fn say(&self, target: &str, txt: &str, result: &[String], event: Option<&Arc<Event>>) {
        let rendered = match event {
            Some(event) => event.record_reply(txt, result, ", "),
            None => Some(make_response(txt, result, ", ")),
        };
        if let Some(rendered) = rendered {
            self.targets.lock().push(target.to_string());
            self.said.lock().push(rendered);
        }
    }
}
