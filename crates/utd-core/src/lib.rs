//! # utd-core
//!
//! Core types for versioned statistical datasets.
//!
//! This crate defines the foundational pieces used across all other utd crates:
//! - [`naming`]: the `<name>_p<period>_v<N>.<ext>` filename grammar ([`Period`], [`VersionedPath`])
//! - [`Table`] and [`Value`]: the in-memory columnar table
//! - [`Config`]: explicit configuration, never read from global state
//! - Error hierarchy ([`UtdError`], [`PathError`], [`FormatError`], [`TableError`])

pub mod config;
pub mod error;
pub mod naming;
pub mod table;
pub mod value;

pub use config::{Config, Region};
pub use error::{FormatError, PathError, Result, TableError, UtdError};
pub use naming::{
    bump_path, parse_period, parse_reference_date, parse_version, version_or_zero, PathParts,
    Period, VersionedPath,
};
pub use table::{Categories, Column, Joined, Table};
pub use value::{Value, ValueKey};
