//! Built-in plugins shipped with the Parley framework.
//!
//! These plugins are enabled by the `builtin` feature flag (on by default) and
//! are linked as the `core` package.
//!
//! | Plugin | Commands | Description |
//! |--------|----------|-------------|
//! | [`PLUG`] | `plug-reload`, `plug-enable`, `plug-disable`, `plug-list` | Plugin administration |
//! | [`SIZE`] | `size` | Registry statistics |
//! | [`ALIAS`] | `alias-set`, `alias-del`, `alias-list` | Command aliases |
//! | [`MORE`] | `more` | Next piece of a chopped reply |
//!
//! `core.plug` should normally be listed in `global.default_plugins` so it
//! survives package garbage collection.

pub mod alias;
pub mod more;
pub mod plug;
pub mod size;

pub use alias::ALIAS;
pub use more::MORE;
pub use plug::PLUG;
pub use size::SIZE;

crate::plugin_package!(pub CORE_PACKAGE = "core" [PLUG, SIZE, ALIAS, MORE]);
