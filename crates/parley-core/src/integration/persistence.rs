//! Persistence boundary.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ChatResult;

/// Document store keyed by slash-separated paths (`fleet/<bot>/state`).
pub trait Persistence: Send + Sync {
    /// Loads the document at `key`; `Ok(None)` when it does not exist.
    fn load(&self, key: &str) -> ChatResult<Option<Value>>;

    /// Replaces the document at `key`.
    fn save(&self, key: &str, document: &Value) -> ChatResult<()>;

    fn exists(&self, key: &str) -> bool;
}

pub type SharedStore = Arc<dyn Persistence>;
