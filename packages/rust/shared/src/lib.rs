//! Shared types, error model, and configuration for Filesmith.
//!
//! This crate is the foundation depended on by all other Filesmith crates.
//! It provides:
//! - [`FilesmithError`], the unified error type
//! - Domain types ([`FileRecord`], [`FileMap`], [`FileStats`], [`Concurrency`])
//! - The configuration document read by the CLI ([`ConfigDocument`])

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    CONFIG_FILE_NAME, ConfigDocument, PluginSpec, find_config, init_config, load_config_from,
};
pub use error::{BoxError, FilesmithError, Result};
pub use types::{
    Concurrency, FileMap, FileRecord, FileStats, Metadata, RESERVED_KEYS, format_mode, parse_mode,
};
