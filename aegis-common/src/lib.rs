//! # Aegis Common Library
//!
//! Shared code for the Aegis feedback services:
//! - Error type
//! - Bootstrap configuration (root folder, TOML file)
//! - SQLite initialization and default settings
//! - Runtime engine parameters backed by the settings table

pub mod config;
pub mod db;
pub mod error;
pub mod params;

pub use error::{Error, Result};
pub use params::EngineParams;
