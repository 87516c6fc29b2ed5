//! # utd-storage
//!
//! Storage backends and versioned path resolution.
//!
//! Every file operation goes through the [`Storage`] capability. The backend is
//! chosen once from the [`Config`] region by [`storage_for`] and then passed by
//! reference; nothing downstream re-checks the region.
//!
//! - [`LocalStorage`]: local filesystem (on-prem, or a bucket mounted as a directory)
//! - [`MemoryStorage`]: shared in-memory object store
//! - [`resolve`]: newest-first listing, `latest`, and reference-date resolution

use std::io::{Read, Write};
use std::sync::Arc;

use utd_core::config::{Config, Region};
use utd_core::error::{Result, UtdError};

pub mod local;
pub mod memory;
pub mod resolve;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use resolve::{
    latest, latest_version_path, list_paths, path_periods, resolve_for_date, similar_paths,
};

/// Sidecar suffix used on the local filesystem.
pub const LOCAL_METADATA_SUFFIX: &str = "__META.json";
/// Sidecar suffix used on object stores.
pub const OBJECT_METADATA_SUFFIX: &str = "_META.json";

/// The file capability every higher layer is written against.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Paths matching a glob pattern, ascending. `*` does not cross `/`.
    fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    fn open_read(&self, path: &str) -> Result<Box<dyn Read>>;

    /// Open `path` for writing, replacing any previous content.
    fn open_write(&self, path: &str) -> Result<Box<dyn Write>>;

    fn exists(&self, path: &str) -> bool;

    /// Suffix appended to a data file's stem to name its metadata sidecar.
    fn metadata_suffix(&self) -> &'static str;

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.open_read(path)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let mut writer = self.open_write(path)?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }
}

/// Pick the backend for the configured region.
///
/// On-prem uses the local filesystem with `__META.json` sidecars. Dapla and BIP
/// buckets are reached through their filesystem mount and use `_META.json` sidecars.
#[must_use]
pub fn storage_for(config: &Config) -> Arc<dyn Storage> {
    match config.region {
        Region::OnPrem => Arc::new(LocalStorage::new()),
        Region::Dapla | Region::Bip => Arc::new(LocalStorage::mounted_bucket()),
    }
}

/// Compile a glob the way both backends interpret it.
pub(crate) fn compile_glob(pattern: &str) -> Result<globset::GlobMatcher> {
    let glob = globset::GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| UtdError::Validation(format!("invalid glob pattern {pattern}: {e}")))?;
    Ok(glob.compile_matcher())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_selects_sidecar_suffix() {
        let mut config = Config::default();
        assert_eq!(storage_for(&config).metadata_suffix(), LOCAL_METADATA_SUFFIX);
        config.region = Region::Dapla;
        assert_eq!(storage_for(&config).metadata_suffix(), OBJECT_METADATA_SUFFIX);
    }

    #[test]
    fn star_stays_within_one_directory() {
        let matcher = compile_glob("/data/*.json").unwrap();
        assert!(matcher.is_match("/data/a_p2024_v1.json"));
        assert!(!matcher.is_match("/data/sub/a_p2024_v1.json"));
    }

    #[test]
    fn bad_glob_is_a_validation_error() {
        assert!(matches!(
            compile_glob("/data/[abc.json"),
            Err(UtdError::Validation(_))
        ));
    }
}
