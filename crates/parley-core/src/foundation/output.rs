//! Long replies are chopped into pieces; the remainder waits in an
//! [`OutputCache`] until the recipient asks for `more`.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::debug;

/// Default maximum length of a single transmitted piece, in characters.
pub const DEFAULT_OUTPUT_LIMIT: usize = 375;

/// Splits `txt` into pieces of at most `limit` characters, breaking on
/// whitespace where possible.
pub fn split_text(txt: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut pieces = Vec::new();
    let mut rest = txt.trim();
    while !rest.is_empty() {
        let Some((hard, _)) = rest.char_indices().nth(limit) else {
            pieces.push(rest.to_string());
            break;
        };
        let cut = if rest[hard..].starts_with(char::is_whitespace) {
            hard
        } else {
            match rest[..hard].rfind(char::is_whitespace) {
                Some(space) if space > 0 => space,
                _ => hard,
            }
        };
        pieces.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    pieces
}

/// Pending reply pieces keyed by `"<bot>-<recipient>"`.
#[derive(Debug, Default)]
pub struct OutputCache {
    pending: Mutex<HashMap<String, VecDeque<String>>>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(bot: &str, recipient: &str) -> String {
        format!("{bot}-{recipient}")
    }

    /// Returns the first piece of `txt`, caching the rest under `key`.
    ///
    /// When pieces remain the returned text ends with `" - N more"`. Text
    /// that fits replaces nothing already cached.
    pub fn chop(&self, key: &str, txt: &str, limit: usize) -> String {
        let mut pieces: VecDeque<String> = split_text(txt, limit).into();
        let Some(first) = pieces.pop_front() else {
            return String::new();
        };
        if pieces.is_empty() {
            return first;
        }
        let remaining = pieces.len();
        debug!(key = %key, remaining, "Reply chopped");
        self.pending.lock().insert(key.to_string(), pieces);
        format!("{first} - {remaining} more")
    }

    /// Takes the next cached piece for `key` and the number still left.
    pub fn more(&self, key: &str) -> Option<(String, usize)> {
        let mut pending = self.pending.lock();
        let queue = pending.get_mut(key)?;
        let piece = queue.pop_front()?;
        let left = queue.len();
        if left == 0 {
            pending.remove(key);
        }
        Some((piece, left))
    }

    pub fn clear(&self, key: &str) -> bool {
        self.pending.lock().remove(key).is_some()
    }
}
