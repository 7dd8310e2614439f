//! User directory and gatekeeper collaborators.

use serde::{Deserialize, Serialize};

/// Permission granted to auto-registered users.
pub const GUEST: &str = "GUEST";
/// Permission granted to regular registered users.
pub const USER: &str = "USER";
/// Permission required by operator commands.
pub const OPER: &str = "OPER";
/// Permission held by bot owners; satisfies every requirement.
pub const OWNER: &str = "OWNER";

/// A resolved user as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Directory name of the user.
    pub name: String,
    /// Upper-case permission names.
    pub perms: Vec<String>,
}

impl User {
    /// Creates a user with the given permissions.
    pub fn new<I, S>(name: impl Into<String>, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            perms: perms
                .into_iter()
                .map(|p| p.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }

    /// Returns `true` if the user holds `perm`.
    pub fn has_perm(&self, perm: &str) -> bool {
        self.perms.iter().any(|p| p.eq_ignore_ascii_case(perm))
    }

    /// Returns `true` if the user may run something requiring any of `required`.
    ///
    /// An empty requirement list is open to everyone; owners pass every check.
    pub fn permitted(&self, required: &[String]) -> bool {
        required.is_empty() || self.has_perm(OWNER) || required.iter().any(|r| self.has_perm(r))
    }
}

/// Resolves origins to users.
pub trait UserDirectory: Send + Sync {
    /// Looks up the user behind `origin` (a userhost, JID, ...).
    fn get_user(&self, origin: &str) -> Option<User>;

    /// Provisions a guest account for `origin`; `None` if the directory refuses.
    fn add_guest(&self, origin: &str, nick: &str) -> Option<User>;
}

/// Allow/deny collaborator consulted for bots running in closed mode.
pub trait Gatekeeper: Send + Sync {
    /// Returns `true` if events from `origin` may be processed.
    fn is_allowed(&self, origin: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permitted() {
        let guest = User::new("bart", [GUEST]);
        assert!(guest.permitted(&[]));
        assert!(guest.permitted(&["guest".to_string()]));
        assert!(!guest.permitted(&[OPER.to_string()]));

        let owner = User::new("root", [OWNER]);
        assert!(owner.permitted(&[OPER.to_string()]));
    }
}
