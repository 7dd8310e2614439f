//! In-memory user directory and allow-list gatekeeper.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use parley_core::{GUEST, Gatekeeper, OWNER, User, UserDirectory};
use tracing::{debug, info};

/// Users keyed by origin.
///
/// Owners are resolved on every lookup, so an origin listed as owner always
/// carries [`OWNER`] even if it was registered as a guest earlier.
#[derive(Debug, Default)]
pub struct MemoryUsers {
    users: RwLock<HashMap<String, User>>,
    owners: RwLock<HashSet<String>>,
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory in which every origin of `owners` holds [`OWNER`].
    pub fn with_owners<I, S>(owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let users = Self::new();
        for owner in owners {
            users.make_owner(owner);
        }
        users
    }

    pub fn make_owner(&self, origin: impl Into<String>) {
        let origin = origin.into();
        debug!(origin = %origin, "Owner registered");
        self.owners.write().insert(origin);
    }

    pub fn is_owner(&self, origin: &str) -> bool {
        self.owners.read().contains(origin)
    }

    /// Adds or replaces the user behind `origin`.
    pub fn add(&self, origin: impl Into<String>, user: User) {
        self.users.write().insert(origin.into(), user);
    }

    pub fn remove(&self, origin: &str) -> Option<User> {
        self.users.write().remove(origin)
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl UserDirectory for MemoryUsers {
    fn get_user(&self, origin: &str) -> Option<User> {
        let user = self.users.read().get(origin).cloned();
        if !self.is_owner(origin) {
            return user;
        }
        let mut user = user.unwrap_or_else(|| User::new(origin, [OWNER]));
        if !user.has_perm(OWNER) {
            user.perms.push(OWNER.to_string());
        }
        Some(user)
    }

    fn add_guest(&self, origin: &str, nick: &str) -> Option<User> {
        let mut users = self.users.write();
        if let Some(existing) = users.get(origin) {
            return Some(existing.clone());
        }
        let name = if nick.is_empty() { origin } else { nick };
        let user = User::new(name, [GUEST]);
        info!(origin = %origin, user = %user.name, "Guest user added");
        users.insert(origin.to_string(), user.clone());
        Some(user)
    }
}

/// Allows origins listed explicitly; everything else is denied.
#[derive(Debug, Default)]
pub struct AllowList {
    allowed: RwLock<HashSet<String>>,
}

impl AllowList {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: RwLock::new(origins.into_iter().map(Into::into).collect()),
        }
    }

    pub fn allow(&self, origin: impl Into<String>) {
        self.allowed.write().insert(origin.into());
    }

    pub fn deny(&self, origin: &str) -> bool {
        self.allowed.write().remove(origin)
    }
}

impl Gatekeeper for AllowList {
    fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.read().contains(origin)
    }
}
