//! Configuration module for the bridge.
//!
//! Provides CLI argument parsing and the built-in VOICEVOX speaker table.

#[allow(clippy::module_inception)]
mod config;
pub mod voices;

pub use config::AppConfig;
