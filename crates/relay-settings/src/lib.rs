//! # relay-settings
//!
//! Configuration for the streaming delivery controller.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`StreamingSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `RELAY_STREAM_*` overrides (highest priority)
//!
//! The stream-smoothing thresholds in [`FilterSettings`] are empirical and
//! exposed here so they can be tuned per deployment.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
