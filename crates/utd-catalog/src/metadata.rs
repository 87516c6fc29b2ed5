//! JSON metadata sidecar written next to each saved data file.
//!
//! For `/kat/skolereg_p2024_v2.parquet` the sidecar is `/kat/skolereg_p2024_v2__META.json`
//! on local storage and `..._v2_META.json` on object stores.

use chrono::{Local, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use utd_core::error::Result;
use utd_core::naming::PathParts;
use utd_storage::Storage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSidecar {
    pub dataset_path: String,
    pub version: u32,
    #[serde(default)]
    pub period: Option<String>,
    pub rows: usize,
    pub columns: Vec<String>,
    /// SHA-256 of the data file bytes.
    pub content_digest: String,
    pub written_at: NaiveDateTime,
    /// Caller-supplied entries (team, key columns, ...).
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// Sidecar location for a data path.
#[must_use]
pub fn sidecar_path(data_path: &str, suffix: &str) -> String {
    let parts = PathParts::split(data_path);
    format!("{}{}{suffix}", parts.dir, parts.stem)
}

impl MetadataSidecar {
    #[must_use]
    pub fn new(
        dataset_path: &str,
        version: u32,
        period: Option<String>,
        rows: usize,
        columns: Vec<String>,
        data_bytes: &[u8],
        extra: IndexMap<String, serde_json::Value>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data_bytes);
        Self {
            dataset_path: dataset_path.to_string(),
            version,
            period,
            rows,
            columns,
            content_digest: format!("{:x}", hasher.finalize()),
            written_at: Local::now().naive_local(),
            extra,
        }
    }

    /// Write next to the data file. Returns the sidecar path.
    pub fn write(&self, storage: &dyn Storage) -> Result<String> {
        let path = sidecar_path(&self.dataset_path, storage.metadata_suffix());
        storage.write_bytes(&path, &serde_json::to_vec_pretty(self)?)?;
        debug!(path = %path, "wrote metadata sidecar");
        Ok(path)
    }

    pub fn read(storage: &dyn Storage, meta_path: &str) -> Result<Self> {
        let bytes = storage.read_bytes(meta_path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
