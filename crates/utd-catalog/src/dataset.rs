//! A loaded table bound to its versioned storage path.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{info, warn};
use utd_core::config::Config;
use utd_core::error::{PathError, Result, UtdError};
use utd_core::naming::{bump_path, parse_period, version_or_zero, PathParts, Period};
use utd_core::table::Table;
use utd_core::value::Value;
use utd_storage::{latest, latest_version_path, similar_paths, Storage};

use crate::codec::{decode_table, encode_table};
use crate::metadata::MetadataSidecar;

/// Caller-supplied answer to a "are you sure?" question.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers no to everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deny;

/// Answers yes to everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Approve;

impl Confirm for Deny {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

impl Confirm for Approve {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// What `save` does when the target already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverwriteMode {
    /// Refuse to write over an existing file.
    #[default]
    None,
    /// Replace the existing file after confirmation.
    Overwrite,
    /// Re-number to one past the newest sibling on storage.
    Filebump,
}

impl FromStr for OverwriteMode {
    type Err = UtdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "none" => Ok(Self::None),
            "overwrite" => Ok(Self::Overwrite),
            "filebump" => Ok(Self::Filebump),
            other => Err(UtdError::Validation(format!(
                "invalid overwrite mode '{other}', expected one of: \"\", \"overwrite\", \"filebump\""
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Target path; the dataset's own path when `None`.
    pub path: Option<String>,
    pub bump_version: bool,
    pub overwrite_mode: OverwriteMode,
    pub save_metadata: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            path: None,
            bump_version: true,
            overwrite_mode: OverwriteMode::None,
            save_metadata: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    storage: Arc<dyn Storage>,
    config: Config,
    path: String,
    periods: Option<Period>,
    table: Table,
    metadata: IndexMap<String, serde_json::Value>,
}

impl Dataset {
    /// Wrap an in-memory table; nothing is read.
    pub fn new(storage: Arc<dyn Storage>, config: &Config, path: &str, table: Table) -> Self {
        let periods = parse_period(path, config.default_date).ok();
        Self {
            storage,
            config: config.clone(),
            path: path.to_string(),
            periods,
            table,
            metadata: IndexMap::new(),
        }
    }

    /// Load the table at `path`. If the extension differs from the configured
    /// data extension and a file with that extension exists, that file is used.
    /// Opening an older revision than the newest sibling only logs a warning.
    pub fn open(storage: Arc<dyn Storage>, config: &Config, path: &str) -> Result<Self> {
        let path = data_path(storage.as_ref(), config, path);
        if let Some(newest) = latest_version_path(storage.as_ref(), &path)? {
            if newest != path {
                warn!(path = %path, latest = %newest, "not opening the latest version of the file");
            }
        }
        info!(path = %path, "opening data");
        let table = read_table(storage.as_ref(), &path)?;
        Ok(Self::new(storage, config, &path, table))
    }

    /// Load the newest file matching `pattern`.
    pub fn open_latest(
        storage: Arc<dyn Storage>,
        config: &Config,
        pattern: &str,
        exclude: &[&str],
    ) -> Result<Self> {
        let path = latest(storage.as_ref(), pattern, exclude)?;
        Self::open(storage, config, &path)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn periods(&self) -> Option<Period> {
        self.periods
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    pub fn set_table(&mut self, table: Table) {
        self.table = table;
    }

    #[must_use]
    pub fn into_table(self) -> Table {
        self.table
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.n_rows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.n_rows() == 0
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Entries merged into the metadata sidecar on save.
    #[must_use]
    pub fn metadata(&self) -> &IndexMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut IndexMap<String, serde_json::Value> {
        &mut self.metadata
    }

    /// Version of the current path, `0` when it has none.
    #[must_use]
    pub fn version(&self) -> u32 {
        version_or_zero(&self.path)
    }

    pub fn similar_paths(&self) -> Result<Vec<String>> {
        similar_paths(self.storage.as_ref(), &self.path)
    }

    pub fn latest_version_path(&self) -> Result<Option<String>> {
        latest_version_path(self.storage.as_ref(), &self.path)
    }

    /// Re-read the table from the current path.
    pub fn reload(&mut self) -> Result<()> {
        self.table = read_table(self.storage.as_ref(), &self.path)?;
        Ok(())
    }

    /// Write the table to a versioned path.
    ///
    /// Returns the written path, or `None` when `confirm` declined.
    ///
    /// # Errors
    ///
    /// Returns [`UtdError::AlreadyExists`] if the target exists and no overwrite mode is set,
    /// or the version error from bumping a path without a version token.
    pub fn save(&mut self, options: &SaveOptions, confirm: &dyn Confirm) -> Result<Option<String>> {
        let requested = options.path.as_deref().unwrap_or(&self.path);
        let mut target = PathParts::split(requested).with_extension(&self.config.data_extension);
        if options.bump_version {
            target = bump_path(&target, 1)?;
        }

        let exists = self.storage.exists(&target);
        match options.overwrite_mode {
            OverwriteMode::None if exists => {
                return Err(UtdError::AlreadyExists { path: target });
            }
            OverwriteMode::Overwrite if exists => {
                warn!(path = %target, "overwrite set and an existing file is about to be replaced");
                if !confirm.confirm(&format!("Overwrite existing file {target}?")) {
                    info!(path = %target, "aborting save");
                    return Ok(None);
                }
            }
            OverwriteMode::Filebump => {
                let newest = self.latest_version_path()?;
                let latest_version = newest.as_deref().map_or(0, version_or_zero);
                let current_version = self.version();
                let target_version = latest_version.checked_add(1).ok_or_else(|| {
                    PathError::VersionOverflow {
                        path: newest.clone().unwrap_or_default(),
                        by: 1,
                    }
                })?;
                if current_version != latest_version {
                    warn!(
                        target_version,
                        current_version,
                        "filebump changes the version number; an older file than the newest may have been opened"
                    );
                    if !confirm.confirm(&format!(
                        "Save as version {target_version} although version {current_version} was opened?"
                    )) {
                        info!(path = %target, "aborting save");
                        return Ok(None);
                    }
                }
                let target_path_version = version_or_zero(&target);
                if target_version > target_path_version {
                    target = bump_path(&target, target_version - target_path_version)?;
                }
            }
            _ => {}
        }

        let bytes = encode_table(&self.table, &target)?;
        self.storage.write_bytes(&target, &bytes)?;
        self.path = target;
        self.periods = parse_period(&self.path, self.config.default_date).ok();

        let meta_path = if options.save_metadata {
            let sidecar = MetadataSidecar::new(
                &self.path,
                self.version(),
                self.periods.map(|p| p.to_string()),
                self.table.n_rows(),
                self.table.column_names().iter().map(|c| c.to_string()).collect(),
                &bytes,
                self.metadata.clone(),
            );
            Some(sidecar.write(self.storage.as_ref())?)
        } else {
            None
        };
        info!(path = %self.path, metadata = ?meta_path, rows = self.table.n_rows(), "wrote dataset");
        Ok(Some(self.path.clone()))
    }
}

/// Prefer the configured data extension when such a sibling file exists.
fn data_path(storage: &dyn Storage, config: &Config, path: &str) -> String {
    let parts = PathParts::split(path);
    if parts.extension == Some(config.data_extension.as_str()) {
        return path.to_string();
    }
    let candidate = parts.with_extension(&config.data_extension);
    if storage.exists(&candidate) {
        candidate
    } else {
        info!(path, extension = %config.data_extension, "no data file with the configured extension");
        path.to_string()
    }
}

pub(crate) fn read_table(storage: &dyn Storage, path: &str) -> Result<Table> {
    decode_table(storage.read_bytes(path)?, path)
}

fn column_kind(values: &[Value]) -> &'static str {
    let mut kind = "empty";
    for value in values.iter().filter(|v| !v.is_missing()) {
        let this = match value {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Null => continue,
        };
        kind = match (kind, this) {
            ("empty", t) => t,
            (k, t) if k == t => k,
            ("int", "float") | ("float", "int") => "float",
            _ => "mixed",
        };
    }
    kind
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset content:")?;
        writeln!(f)?;
        writeln!(f, "path: {}", self.path)?;
        match &self.periods {
            Some(p) => writeln!(f, "periods: {p}")?,
            None => writeln!(f, "periods: -")?,
        }
        writeln!(f, "version: {}", self.version())?;
        for (key, value) in &self.metadata {
            writeln!(f, "{key}: {value}")?;
        }
        writeln!(f)?;
        writeln!(f, "Column-info: {} rows", self.table.n_rows())?;
        let width = self
            .table
            .column_names()
            .iter()
            .map(|n| n.len())
            .max()
            .unwrap_or(0);
        for column in self.table.columns() {
            let non_missing = column.values.iter().filter(|v| !v.is_missing()).count();
            let kind = if column.is_categorical() {
                "category"
            } else {
                column_kind(&column.values)
            };
            writeln!(
                f,
                "  {:width$}  {non_missing:>6} non-null  {kind}",
                column.name
            )?;
        }
        Ok(())
    }
}
