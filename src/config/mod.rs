//! Gauge Configuration Module
//!
//! Static, process-start configuration loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `GAUGE_CONFIG` environment variable (path to TOML file)
//! 3. `gauge_config.toml` in the current working directory
//! 4. Built-in defaults
//!
//! The loaded config is passed by value/reference into the watcher, reader
//! and controller; nothing reads it from global state.

mod gauge_config;
pub mod defaults;
pub mod validation;

pub use gauge_config::*;
