//! Lookup of the school register and the vocational-school register catalogs.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;
use utd_catalog::Catalog;
use utd_core::config::Config;
use utd_core::error::{Result, UtdError};
use utd_storage::Storage;

/// Subcategories a school register file may carry in its name.
pub const SKOLEREG_SUBCATEGORIES: [&str; 4] = ["barnehage", "vgskoler", "test", "grunnskoler"];

/// Key columns of the school register, tried in this order.
pub const SKOLEREG_KEY_COLS: [&str; 2] = ["orgnr", "orgnrbed"];

/// Key column of the vocational-school register.
pub const VIGO_KEY_COL: &str = "SKOLENR";

/// Register vintage to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Year {
    #[default]
    Latest,
    Year(u16),
}

impl FromStr for Year {
    type Err = UtdError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(year) = s.parse() {
                return Ok(Self::Year(year));
            }
        }
        Err(UtdError::Validation(format!(
            "invalid year '{s}', expected YYYY or \"latest\""
        )))
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Year(y) => write!(f, "{y:04}"),
        }
    }
}

fn join_dir(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn year_glob(prefix: &str, year: Year, extension: &str) -> String {
    match year {
        Year::Latest => format!("{prefix}*.{extension}"),
        Year::Year(y) => format!("{prefix}*{y}*.{extension}"),
    }
}

/// Glob pattern and exclusion keywords for a school register lookup.
///
/// An empty subcategory excludes every known subcategory; a named one
/// excludes the others.
///
/// # Errors
///
/// Returns [`UtdError::Validation`] for an unknown subcategory.
pub fn skolereg_pattern(
    config: &Config,
    year: Year,
    subcategory: &str,
) -> Result<(String, Vec<&'static str>)> {
    if !subcategory.is_empty() && !SKOLEREG_SUBCATEGORIES.contains(&subcategory) {
        return Err(UtdError::Validation(format!(
            "sub-category '{subcategory}' not among {SKOLEREG_SUBCATEGORIES:?} or \"\""
        )));
    }
    let exclude = SKOLEREG_SUBCATEGORIES
        .into_iter()
        .filter(|c| *c != subcategory)
        .collect();
    let name = year_glob(
        &format!("skolereg_{subcategory}"),
        year,
        &config.data_extension,
    );
    Ok((join_dir(&config.skolereg_path, &name), exclude))
}

/// Glob pattern for a vocational-school register lookup.
#[must_use]
pub fn vigo_pattern(config: &Config, year: Year) -> String {
    let name = year_glob(&config.vigo_file_prefix, year, &config.data_extension);
    join_dir(&config.vigo_path, &name)
}

/// Load the school register keyed on `orgnr`, then `orgnrbed`.
pub fn skolereg(
    storage: Arc<dyn Storage>,
    config: &Config,
    year: Year,
    subcategory: &str,
) -> Result<Catalog> {
    let (pattern, exclude) = skolereg_pattern(config, year, subcategory)?;
    debug!(pattern = %pattern, ?exclude, %year, "resolving school register");
    Catalog::open_latest(
        storage,
        config,
        &pattern,
        &exclude,
        SKOLEREG_KEY_COLS.map(String::from).to_vec(),
    )
}

/// Load the vocational-school register keyed on `SKOLENR`.
pub fn vigo_skole(storage: Arc<dyn Storage>, config: &Config, year: Year) -> Result<Catalog> {
    let pattern = vigo_pattern(config, year);
    debug!(pattern = %pattern, %year, "resolving vocational-school register");
    Catalog::open_latest(storage, config, &pattern, &[], vec![VIGO_KEY_COL.to_string()])
}
