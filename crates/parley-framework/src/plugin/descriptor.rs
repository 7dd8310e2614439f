//! Plugin descriptor: the static, `Copy` handle to a plugin.

use std::fmt;

use parley_core::BoxError;

use super::core::{PluginEnv, PluginLoadContext};

/// Plugin `init` hook. Registers handlers into the load context.
pub type InitFn = fn(&mut PluginLoadContext) -> Result<(), BoxError>;

/// Optional `background_init` / `shutdown` hooks.
pub type HookFn = fn(&PluginEnv);

// ─── PluginDescriptor ─────────────────────────────────────────────────────────

/// A static, `Copy` descriptor of a plugin.
///
/// Descriptors are built in `const` context and collected into
/// [`PluginPackage`](super::PluginPackage)s:
///
/// ```rust,ignore
/// pub const ECHO: PluginDescriptor = PluginDescriptor::new("basic.echo", init)
///     .depends_on(&["core.plug"])
///     .desc("repeats its arguments");
///
/// fn init(ctx: &mut PluginLoadContext) -> Result<(), BoxError> {
///     ctx.command(Command::new("echo", handler(echo)));
///     Ok(())
/// }
/// ```
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    /// Unique plugin id, conventionally `package.name`.
    pub id: &'static str,

    /// Plugin ids that must be loaded first.
    pub depends_on: &'static [&'static str],

    /// One-line description.
    pub desc: &'static str,

    pub init: InitFn,

    /// Started on its own thread after a successful `init`.
    pub background_init: Option<HookFn>,

    /// Called before the plugin's handlers are removed.
    pub shutdown: Option<HookFn>,
}

impl PluginDescriptor {
    pub const fn new(id: &'static str, init: InitFn) -> Self {
        Self {
            id,
            depends_on: &[],
            desc: "",
            init,
            background_init: None,
            shutdown: None,
        }
    }

    pub const fn depends_on(mut self, deps: &'static [&'static str]) -> Self {
        self.depends_on = deps;
        self
    }

    pub const fn desc(mut self, desc: &'static str) -> Self {
        self.desc = desc;
        self
    }

    pub const fn background(mut self, hook: HookFn) -> Self {
        self.background_init = Some(hook);
        self
    }

    pub const fn on_shutdown(mut self, hook: HookFn) -> Self {
        self.shutdown = Some(hook);
        self
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("has_background_init", &self.background_init.is_some())
            .field("has_shutdown", &self.shutdown.is_some())
            .finish()
    }
}
