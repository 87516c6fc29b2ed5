//! Timestamped persistence of formats.
//!
//! Each store writes `<dir><name>_<%Y-%m-%dT%H-%M-%S>.json`. A store whose
//! content digest equals the newest stored file for the same name is skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use utd_core::config::Config;
use utd_core::error::{FormatError, Result};
use utd_storage::Storage;

use crate::dict::FormatDict;

/// Timestamp layout used in stored file names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// One stored format file, as seen from its name alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFormat {
    pub name: String,
    pub timestamp_raw: String,
    pub timestamp: NaiveDateTime,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct FormatStore {
    storage: Arc<dyn Storage>,
    dir: String,
}

impl FormatStore {
    pub fn new(storage: Arc<dyn Storage>, dir: impl Into<String>) -> Self {
        let mut dir = dir.into();
        if !dir.is_empty() && !dir.ends_with('/') {
            dir.push('/');
        }
        Self { storage, dir }
    }

    pub fn from_config(storage: Arc<dyn Storage>, config: &Config) -> Self {
        Self::new(storage, config.formats_path.clone())
    }

    #[must_use]
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Store `format` under `name`, stamped with the current local time.
    ///
    /// Returns the written path, or `None` when the content is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::CachedStore`] for a cached format unless `force` is set.
    pub fn store(&self, name: &str, format: &FormatDict, force: bool) -> Result<Option<String>> {
        self.store_at(name, format, force, Local::now().naive_local())
    }

    /// Store with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::CachedStore`] for a cached format unless `force` is set.
    pub fn store_at(
        &self,
        name: &str,
        format: &FormatDict,
        force: bool,
        at: NaiveDateTime,
    ) -> Result<Option<String>> {
        if format.cached() && !force {
            return Err(FormatError::CachedStore {
                name: name.to_string(),
            }
            .into());
        }

        if let Some(previous) = self.path_for(name, None)? {
            let stored = self.read(&previous)?;
            if content_digest(&stored)? == content_digest(format)? {
                info!(format = name, path = %previous, "format content unchanged, not storing");
                return Ok(None);
            }
        }

        let path = format!("{}{name}_{}.json", self.dir, at.format(TIMESTAMP_FORMAT));
        self.storage.write_bytes(&path, &serde_json::to_vec(format)?)?;
        info!(format = name, path = %path, keys = format.len(), "stored format");
        Ok(Some(path))
    }

    /// Store several formats under one shared timestamp.
    ///
    /// # Errors
    ///
    /// Stops at the first format that fails to store.
    pub fn store_many(
        &self,
        formats: &IndexMap<String, FormatDict>,
        force: bool,
    ) -> Result<Vec<String>> {
        let now = Local::now().naive_local();
        let mut written = Vec::new();
        for (name, format) in formats {
            if let Some(path) = self.store_at(name, format, force, now)? {
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Stored format files, optionally for one name, sorted by name then time.
    pub fn info(&self, select_name: Option<&str>) -> Result<Vec<StoredFormat>> {
        let pattern = format!("{}*.json", self.dir);
        let mut found: Vec<StoredFormat> = self
            .storage
            .glob(&pattern)?
            .into_iter()
            .filter_map(|path| match parse_stored_name(&path) {
                Ok(stored) => Some(stored),
                Err(e) => {
                    warn!(error = %e, "skipping file in formats directory");
                    None
                }
            })
            .filter(|s| select_name.map_or(true, |name| s.name == name))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.timestamp.cmp(&b.timestamp)));
        debug!(pattern, count = found.len(), "listed stored formats");
        Ok(found)
    }

    /// Newest file for `name` stamped strictly before `at` (any time when `None`).
    pub fn path_for(&self, name: &str, at: Option<NaiveDateTime>) -> Result<Option<String>> {
        Ok(self
            .info(Some(name))?
            .into_iter()
            .rev()
            .find(|s| at.map_or(true, |at| s.timestamp < at))
            .map(|s| s.path))
    }

    /// Load the format `path_for` selects.
    pub fn load(&self, name: &str, at: Option<NaiveDateTime>) -> Result<Option<FormatDict>> {
        match self.path_for(name, at)? {
            Some(path) => {
                debug!(format = name, path = %path, "loading format");
                self.read(&path).map(Some)
            }
            None => Ok(None),
        }
    }

    fn read(&self, path: &str) -> Result<FormatDict> {
        let bytes = self.storage.read_bytes(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Split `<dir>/<name>_<timestamp>.json` into its parts.
///
/// # Errors
///
/// Returns [`FormatError::InvalidFileName`] when the name has no parseable timestamp.
pub fn parse_stored_name(path: &str) -> std::result::Result<StoredFormat, FormatError> {
    let invalid = || FormatError::InvalidFileName {
        path: path.to_string(),
    };
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let stem = file_name.strip_suffix(".json").ok_or_else(invalid)?;
    let (name, raw) = stem.rsplit_once('_').ok_or_else(invalid)?;
    let timestamp = parse_timestamp(raw).ok_or_else(invalid)?;
    Ok(StoredFormat {
        name: name.to_string(),
        timestamp_raw: raw.to_string(),
        timestamp,
        path: path.to_string(),
    })
}

/// Parse a stored timestamp, the ISO colon form, or a bare date (midnight).
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// SHA-256 of the format's entries with keys sorted, hex-encoded.
pub fn content_digest(format: &FormatDict) -> Result<String> {
    let canonical: BTreeMap<String, serde_json::Value> = format.to_json_map().into_iter().collect();
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&canonical)?);
    Ok(format!("{:x}", hasher.finalize()))
}
