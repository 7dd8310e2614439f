//! Text rewriters applied around dispatch.
//!
//! Input morphs rewrite an event's text before it is bound; output morphs
//! rewrite every reply right before it is queued for the driver. Both are
//! owned by a plugin and disappear when it is unloaded.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{error, trace, warn};

use super::handler::panic_message;
use crate::foundation::Event;

/// Signature of a text rewriter.
pub type MorphFn = Arc<dyn Fn(&str, Option<&Event>) -> String + Send + Sync>;

/// A named text rewriter.
#[derive(Clone)]
pub struct Morph {
    name: String,
    rewrite: MorphFn,
}

impl Morph {
    pub fn new<F>(name: impl Into<String>, rewrite: F) -> Self
    where
        F: Fn(&str, Option<&Event>) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            rewrite: Arc::new(rewrite),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Morph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Morph").field("name", &self.name).finish()
    }
}

#[derive(Clone)]
struct Entry {
    owner: String,
    morph: Morph,
}

/// Ordered list of morphs, applied in registration order.
#[derive(Clone)]
pub struct MorphChain {
    name: &'static str,
    entries: Vec<Entry>,
}

impl MorphChain {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    /// Appends `morph`, replacing an entry with the same owner and name.
    pub fn add(&mut self, owner: &str, morph: Morph) {
        let entry = Entry {
            owner: owner.to_string(),
            morph,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.owner == entry.owner && e.morph.name == entry.morph.name)
        {
            Some(existing) => *existing = entry,
            None => {
                trace!(chain = self.name, plugin = %owner, morph = %entry.morph.name, "Morph added");
                self.entries.push(entry);
            }
        }
    }

    pub fn unload(&mut self, owner: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.owner != owner);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Threads `txt` through every morph.
    ///
    /// A panicking morph is logged and skipped; the text it received is
    /// passed on unchanged.
    pub fn apply(&self, txt: &str, event: Option<&Event>) -> String {
        let mut current = txt.to_string();
        for entry in &self.entries {
            let rewrite = &entry.morph.rewrite;
            match catch_unwind(AssertUnwindSafe(|| rewrite(&current, event))) {
                Ok(next) => current = next,
                Err(panic) => error!(
                    chain = self.name,
                    plugin = %entry.owner,
                    morph = %entry.morph.name,
                    panic = %panic_message(panic.as_ref()),
                    "Morph panicked"
                ),
            }
        }
        if current.is_empty() && !txt.is_empty() {
            warn!(chain = self.name, "Morphs erased the text");
        }
        current
    }
}

impl std::fmt::Debug for MorphChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MorphChain")
            .field("name", &self.name)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_in_order() {
        let mut chain = MorphChain::new("output");
        chain.add("a", Morph::new("upper", |txt, _| txt.to_uppercase()));
        chain.add("b", Morph::new("bang", |txt, _| format!("{txt}!")));
        assert_eq!(chain.apply("hi", None), "HI!");
    }

    #[test]
    fn test_panicking_morph_is_skipped() {
        let mut chain = MorphChain::new("input");
        chain.add("a", Morph::new("broken", |_, _| panic!("bad morph")));
        chain.add("a", Morph::new("trim", |txt, _| txt.trim().to_string()));
        assert_eq!(chain.apply("  hi ", None), "hi");
    }

    #[test]
    fn test_unload_and_replace() {
        let mut chain = MorphChain::new("output");
        chain.add("a", Morph::new("x", |txt, _| format!("{txt}1")));
        chain.add("a", Morph::new("x", |txt, _| format!("{txt}2")));
        chain.add("b", Morph::new("y", |txt, _| format!("{txt}3")));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.apply("", None), "23");

        assert_eq!(chain.unload("a"), 1);
        assert_eq!(chain.apply("", None), "3");
        assert_eq!(chain.unload("a"), 0);
    }
}
