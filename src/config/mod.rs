// src/config/mod.rs

//! Configuration loading and validation for http-exec.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate file-level invariants like unique paths (`validate.rs`).
//!
//! Per-command checks (empty executable, negative timeout) belong to the
//! handler's `validate()` step, not to loading.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path};
pub use model::{CommandConfig, ConfigFile, RawConfigFile, ServerSection, ServerSettings};
