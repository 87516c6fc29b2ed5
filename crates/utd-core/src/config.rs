//! Explicit configuration passed to constructors.
//!
//! Loaded from defaults, the `DAPLA_*` environment variables, or a TOML file.
//! Nothing in the workspace reads configuration from global state.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UtdError};

/// Where the code is running. Decides which storage backend is selected at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Region {
    #[default]
    OnPrem,
    Dapla,
    Bip,
}

impl std::str::FromStr for Region {
    type Err = UtdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ON_PREM" => Ok(Self::OnPrem),
            "DAPLA" => Ok(Self::Dapla),
            "BIP" => Ok(Self::Bip),
            other => Err(UtdError::Validation(format!(
                "unknown region '{other}', expected ON_PREM, DAPLA or BIP"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: String,
    pub service: String,
    pub region: Region,
    /// Directory holding timestamped format JSON files.
    pub formats_path: String,
    pub skolereg_path: String,
    pub vigo_path: String,
    /// File name prefix of the vocational-school register files.
    pub vigo_file_prefix: String,
    /// Anchor filling in the missing parts of partial period dates (`2024` -> 2024-01-01).
    pub default_date: NaiveDate,
    /// Extension forced onto saved datasets; `parquet` or `json`.
    pub data_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "TEST".to_string(),
            service: "JUPYTERLAB".to_string(),
            region: Region::OnPrem,
            formats_path: "/ssb/stamme01/utd/utd-felles/formater/".to_string(),
            skolereg_path: "/ssb/stamme01/utd/kat/skolereg/".to_string(),
            vigo_path: "/ssb/stamme01/utd/katalog/vigo/".to_string(),
            vigo_file_prefix: "vigo_skole".to_string(),
            default_date: default_anchor(),
            data_extension: "parquet".to_string(),
        }
    }
}

fn default_anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

impl Config {
    /// Defaults overridden by `DAPLA_ENVIRONMENT`, `DAPLA_SERVICE` and `DAPLA_REGION`.
    ///
    /// # Errors
    ///
    /// Returns [`UtdError::Validation`] if `DAPLA_REGION` holds an unknown region.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(env) = lookup("DAPLA_ENVIRONMENT") {
            config.environment = env;
        }
        if let Some(service) = lookup("DAPLA_SERVICE") {
            config.service = service;
        }
        if let Some(region) = lookup("DAPLA_REGION") {
            config.region = region.parse()?;
        }
        Ok(config)
    }

    /// Parse a TOML document. Missing keys fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`UtdError::Parse`] if the document is not valid TOML for this struct.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| UtdError::Parse(e.to_string()))
    }

    /// Read and parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`UtdError::Io`] if the file cannot be read, [`UtdError::Parse`] if it is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
