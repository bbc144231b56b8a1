//! Layered YAML configuration for the storefront binaries.
//!
//! Files are merged in order, checked for inline secrets, hashed, and then
//! read into typed [`Settings`]. Keys no setting consumes are reported.

mod guard;
mod layering;
mod settings;

pub use guard::{report_unused_keys, UnusedKeyPolicy, UnusedKeyReport};
pub use layering::{load_layered_yaml, load_layered_yaml_from_strings, LoadedConfig};
pub use settings::{
    resolve_database_url, CheckoutSettings, DaemonSettings, DatabaseSettings, DatabaseUrl,
    Settings, SETTLEMENT_MODES,
};
