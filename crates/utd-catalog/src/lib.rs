//! # utd-catalog
//!
//! Versioned datasets and keyed catalogs.
//!
//! - [`Dataset`]: a table bound to a versioned path, with overwrite-safe saving
//! - [`Catalog`]: a dataset with key columns, cascading merges and format application
//! - [`codec`]: parquet (through arrow) and JSON encoding of data files
//! - [`MetadataSidecar`]: the JSON document written next to each saved dataset

pub mod catalog;
pub mod codec;
pub mod dataset;
pub mod metadata;

pub use catalog::{
    matched_tag, ApplyFormatOptions, Catalog, Merged, LEFT_ONLY, MERGE_COL, REQUIRED_COLS,
};
pub use codec::{decode_table, encode_table, DataFormat};
pub use dataset::{Approve, Confirm, Dataset, Deny, OverwriteMode, SaveOptions};
pub use metadata::{sidecar_path, MetadataSidecar};
