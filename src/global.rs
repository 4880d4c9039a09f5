//! Process-wide default configuration.
//!
//! Libraries that register their options against [`global()`] share one
//! engine without threading a handle through every call site. Programs
//! that want isolation build their own [`Config`] instead.

use lazy_static::lazy_static;

use crate::conf::Config;

lazy_static! {
    static ref GLOBAL: Config = Config::new();
}

/// The shared default configuration, created on first use.
pub fn global() -> &'static Config {
    &GLOBAL
}
