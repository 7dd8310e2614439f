/// Declares a plugin package and links it into [`PLUGIN_PACKAGES`](crate::plugin::PLUGIN_PACKAGES).
///
/// ```rust,ignore
/// plugin_package!(pub BASIC = "basic" [ECHO, PING]);
/// ```
#[macro_export]
macro_rules! plugin_package {
    ($vis:vis $ident:ident = $name:literal [ $($plugin:expr),* $(,)? ]) => {
        #[$crate::linkme::distributed_slice($crate::plugin::PLUGIN_PACKAGES)]
        #[linkme(crate = $crate::linkme)]
        $vis static $ident: $crate::plugin::PluginPackage = $crate::plugin::PluginPackage {
            name: $name,
            plugins: &[$($plugin),*],
        };
    };
}
