//! # utd-format
//!
//! Value-remapping formats.
//!
//! - [`FormatDict`]: key→label map with int/str, range, NA and `other` fallbacks
//! - [`FormatStore`]: timestamped JSON persistence that skips unchanged content
//! - [`parse_sas_script`] / [`import_sas_file`]: SAS `proc format` import

pub mod dict;
pub mod sas;
pub mod store;

pub use dict::{FormatDict, FormatKey, Range, Resolution, ResolvedBy, NA_SENTINELS, OTHER_KEY};
pub use sas::{import_sas_file, import_sas_folder, parse_sas_script};
pub use store::{content_digest, parse_stored_name, parse_timestamp, FormatStore, StoredFormat};
