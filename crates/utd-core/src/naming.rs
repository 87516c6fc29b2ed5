//! Versioned filename grammar.
//!
//! Files follow `<name>[_<subcat>]_p<period>[_p<period2>]_v<N>.<ext>`:
//! ```text
//! /data/skolereg_vgskoler_p2022-10_v3.json
//! /data/two_dates_p2021-10_p2022-10_v1.json
//! ```
//! The version is the last `_` token of the stem, the closing period the
//! one before it, and an opening period (if any) the one before that.
//! Everything here is a pure string/date transform.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::PathError;

/// The calendar span a file is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    /// Effective from this date onwards.
    Single(NaiveDate),
    /// Valid on `from <= date < to`.
    Window { from: NaiveDate, to: NaiveDate },
}

impl Period {
    /// Whether `reference` falls inside the period. A single date is "effective
    /// from"; a window is half-open.
    #[must_use]
    pub fn contains(&self, reference: NaiveDate) -> bool {
        match *self {
            Self::Single(date) => date <= reference,
            Self::Window { from, to } => from <= reference && reference < to,
        }
    }

    /// Whether `reference` equals either bound of a window.
    #[must_use]
    pub fn on_boundary(&self, reference: NaiveDate) -> bool {
        match *self {
            Self::Single(_) => false,
            Self::Window { from, to } => reference == from || reference == to,
        }
    }

    /// The closing (or only) date.
    #[must_use]
    pub fn last(&self) -> NaiveDate {
        match *self {
            Self::Single(date) => date,
            Self::Window { to, .. } => to,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(date) => write!(f, "{date}"),
            Self::Window { from, to } => write!(f, "{from}..{to}"),
        }
    }
}

/// A parsed path following the naming convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPath {
    /// Directory part including the trailing separator (may be empty).
    pub dir: String,
    /// Name tokens before the period markers, joined with `_`.
    pub base: String,
    pub period: Period,
    /// `None` when the stem has no version token.
    pub version: Option<u32>,
    pub extension: Option<String>,
}

impl VersionedPath {
    /// Parse a full path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidPeriod`] if the period markers are absent or unparseable,
    /// [`PathError::InvalidVersion`] if a `v`-prefixed version token is not numeric.
    pub fn parse(path: &str, default: NaiveDate) -> Result<Self, PathError> {
        let parts = PathParts::split(path);
        let period = parse_period(path, default)?;
        let version = match parse_version(path) {
            Ok(v) => Some(v),
            Err(PathError::MissingVersion { .. }) => None,
            Err(e) => return Err(e),
        };
        let tokens: Vec<&str> = parts.stem.split('_').collect();
        let period_tokens = match period {
            Period::Single(_) => 1,
            Period::Window { .. } => 2,
        };
        let base_len = tokens.len().saturating_sub(1 + period_tokens);
        Ok(Self {
            dir: parts.dir.to_string(),
            base: tokens[..base_len].join("_"),
            period,
            version,
            extension: parts.extension.map(str::to_string),
        })
    }

    /// The last base token when it is one of the `known` subcategories.
    #[must_use]
    pub fn subcategory<'a>(&self, known: &[&'a str]) -> Option<&'a str> {
        let last = self.base.rsplit('_').next()?;
        if self.base == last {
            return None;
        }
        known.iter().copied().find(|k| !k.is_empty() && *k == last)
    }
}

/// Directory, stem and extension of a path string. The stem ends at the first `.`
/// of the file name, so `x.tar.gz` has stem `x` and extension `tar.gz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathParts<'a> {
    pub dir: &'a str,
    pub stem: &'a str,
    pub extension: Option<&'a str>,
}

impl<'a> PathParts<'a> {
    #[must_use]
    pub fn split(path: &'a str) -> Self {
        let name_start = path.rfind(['/', '\\']).map_or(0, |i| i + 1);
        let (dir, file_name) = path.split_at(name_start);
        match file_name.split_once('.') {
            Some((stem, ext)) => Self {
                dir,
                stem,
                extension: Some(ext),
            },
            None => Self {
                dir,
                stem: file_name,
                extension: None,
            },
        }
    }

    /// Reassemble with a different stem.
    #[must_use]
    pub fn with_stem(&self, stem: &str) -> String {
        match self.extension {
            Some(ext) => format!("{}{stem}.{ext}", self.dir),
            None => format!("{}{stem}", self.dir),
        }
    }

    /// Reassemble with a different extension.
    #[must_use]
    pub fn with_extension(&self, extension: &str) -> String {
        format!("{}{}.{extension}", self.dir, self.stem)
    }
}

/// Parse the version token (`v<N>`) of a path.
///
/// # Errors
///
/// Returns [`PathError::MissingVersion`] if the last token is neither `v<digits>` nor
/// digits, and [`PathError::InvalidVersion`] if it starts with `v` but is not numeric.
pub fn parse_version(path: &str) -> Result<u32, PathError> {
    let stem = PathParts::split(path).stem;
    let token = stem.rsplit('_').next().unwrap_or(stem);
    let (prefixed, digits) = match token.strip_prefix('v') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return digits.parse().map_err(|_| PathError::InvalidVersion {
            path: path.to_string(),
            token: token.to_string(),
        });
    }
    if prefixed {
        Err(PathError::InvalidVersion {
            path: path.to_string(),
            token: token.to_string(),
        })
    } else {
        Err(PathError::MissingVersion {
            path: path.to_string(),
        })
    }
}

/// Version of a path, `0` when it carries none.
#[must_use]
pub fn version_or_zero(path: &str) -> u32 {
    parse_version(path).unwrap_or(0)
}

/// Replace the version token with `v<old + n>`, keeping every other segment.
///
/// # Errors
///
/// Returns the [`parse_version`] error when the path has no usable version token,
/// and [`PathError::VersionOverflow`] when the new version does not fit a `u32`.
pub fn bump_path(path: &str, n: u32) -> Result<String, PathError> {
    let new_version = parse_version(path)?
        .checked_add(n)
        .ok_or_else(|| PathError::VersionOverflow {
            path: path.to_string(),
            by: n,
        })?;
    let parts = PathParts::split(path);
    let stem = match parts.stem.rsplit_once('_') {
        Some((head, _)) => format!("{head}_v{new_version}"),
        None => format!("v{new_version}"),
    };
    Ok(parts.with_stem(&stem))
}

/// Parse the period markers of a path.
///
/// # Errors
///
/// Returns [`PathError::InvalidPeriod`] if the second-to-last token is not `p<date>`.
pub fn parse_period(path: &str, default: NaiveDate) -> Result<Period, PathError> {
    let stem = PathParts::split(path).stem;
    let tokens: Vec<&str> = stem.split('_').collect();
    let invalid = |fragment: &str| PathError::InvalidPeriod {
        path: path.to_string(),
        fragment: fragment.to_string(),
    };

    if tokens.len() < 2 {
        return Err(invalid(stem));
    }
    let last_token = tokens[tokens.len() - 2];
    let last = last_token
        .strip_prefix('p')
        .and_then(|f| parse_date(f, default))
        .ok_or_else(|| invalid(last_token))?;

    if tokens.len() >= 3 {
        let first_token = tokens[tokens.len() - 3];
        if let Some(fragment) = first_token.strip_prefix('p') {
            if looks_numeric_date(fragment) {
                let first = parse_date(fragment, default).ok_or_else(|| invalid(first_token))?;
                return Ok(Period::Window {
                    from: first,
                    to: last,
                });
            }
        }
    }
    Ok(Period::Single(last))
}

/// Parse a reference date given as text, with the same partial-date rules as
/// filename periods.
///
/// # Errors
///
/// Returns [`PathError::InvalidDate`] if nothing matches.
pub fn parse_reference_date(input: &str, default: NaiveDate) -> Result<NaiveDate, PathError> {
    parse_date(input.trim(), default).ok_or_else(|| PathError::InvalidDate {
        input: input.to_string(),
    })
}

fn looks_numeric_date(fragment: &str) -> bool {
    let digits: String = fragment.chars().filter(|c| *c != '-').collect();
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Partial dates take their missing month/day from `default`.
/// Strings outside `YYYY[-MM[-DD]]`, `YYYYMM` and `YYYYMMDD` get a lenient
/// pass over a handful of common layouts.
fn parse_date(fragment: &str, default: NaiveDate) -> Option<NaiveDate> {
    strict_date(fragment, default).or_else(|| lenient_date(fragment))
}

fn strict_date(fragment: &str, default: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = fragment.split('-').collect();
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let num = |s: &str| s.parse::<u32>().ok();
    let (year, month, day) = match parts.as_slice() {
        [y] if y.len() == 4 => (num(y)?, None, None),
        [y] if y.len() == 6 => (num(&y[..4])?, Some(num(&y[4..])?), None),
        [y] if y.len() == 8 => (num(&y[..4])?, Some(num(&y[4..6])?), Some(num(&y[6..])?)),
        [y, m] if y.len() == 4 => (num(y)?, Some(num(m)?), None),
        [y, m, d] if y.len() == 4 => (num(y)?, Some(num(m)?), Some(num(d)?)),
        _ => return None,
    };
    let year = i32::try_from(year).ok()?;
    let month = month.unwrap_or(default.month());
    match day {
        Some(day) => NaiveDate::from_ymd_opt(year, month, day),
        None => NaiveDate::from_ymd_opt(year, month, default.day())
            .or_else(|| NaiveDate::from_ymd_opt(year, month, 1)),
    }
}

fn lenient_date(fragment: &str) -> Option<NaiveDate> {
    const DATE_LAYOUTS: &[&str] = &["%d.%m.%Y", "%Y/%m/%d", "%d/%m/%Y", "%Y.%m.%d", "%d-%m-%Y"];
    const DATETIME_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H-%M-%S", "%Y-%m-%d %H:%M:%S"];

    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(fragment, layout).ok())
        .or_else(|| {
            DATETIME_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDateTime::parse_from_str(fragment, layout).ok())
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bump_keeps_directories_and_periods() {
        let inpath = "/ssb/folder/structure/filename_p2010_p2011_v2.parquet";
        let outpath = "/ssb/folder/structure/filename_p2010_p2011_v3.parquet";
        assert_eq!(bump_path(inpath, 1).unwrap(), outpath);
    }

    #[test]
    fn bump_month_period() {
        assert_eq!(
            bump_path("data_p2024-10_v1.parquet", 1).unwrap(),
            "data_p2024-10_v2.parquet"
        );
    }

    #[test]
    fn bump_tolerates_dots_in_directories() {
        assert_eq!(
            bump_path("/home/a.b/data_p2024_v9.json", 2).unwrap(),
            "/home/a.b/data_p2024_v11.json"
        );
    }

    #[test]
    fn bump_without_version_is_an_error() {
        assert!(matches!(
            bump_path("data_p2024.json", 1),
            Err(PathError::MissingVersion { .. })
        ));
        assert!(matches!(
            bump_path("data_p2024_vx.json", 1),
            Err(PathError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn bump_past_u32_max_is_an_error() {
        assert_eq!(
            bump_path("data_p2024_v4294967295.parquet", 1),
            Err(PathError::VersionOverflow {
                path: "data_p2024_v4294967295.parquet".to_string(),
                by: 1,
            })
        );
        assert!(matches!(
            bump_path("data_p2024_v1.parquet", u32::MAX),
            Err(PathError::VersionOverflow { .. })
        ));
        assert_eq!(
            bump_path("data_p2024_v1.parquet", u32::MAX - 1).unwrap(),
            "data_p2024_v4294967295.parquet"
        );
    }

    #[test]
    fn version_parses_and_defaults_to_zero() {
        assert_eq!(parse_version("/ssb/filename_p2010_p2011_v2.parquet"), Ok(2));
        assert_eq!(version_or_zero("/ssb/filename_p2010.parquet"), 0);
    }

    #[test]
    fn single_period_with_default_day() {
        let period = parse_period("/x/test_data_p2023-10_v3.parquet", anchor()).unwrap();
        assert_eq!(period, Period::Single(ymd(2023, 10, 1)));
    }

    #[test]
    fn year_only_period_uses_anchor_month() {
        let period = parse_period("vigo_skole_p2023_v1.json", anchor()).unwrap();
        assert_eq!(period, Period::Single(ymd(2023, 1, 1)));
    }

    #[test]
    fn two_period_window() {
        let period = parse_period("two_dates_p2021-10_p2022-10_v3.parquet", anchor()).unwrap();
        assert_eq!(
            period,
            Period::Window {
                from: ymd(2021, 10, 1),
                to: ymd(2022, 10, 1)
            }
        );
    }

    #[test]
    fn missing_period_marker_is_an_error() {
        assert!(matches!(
            parse_period("data_2024_v1.json", anchor()),
            Err(PathError::InvalidPeriod { .. })
        ));
        assert!(parse_period("data.json", anchor()).is_err());
    }

    #[test]
    fn lenient_fragments_still_parse() {
        assert_eq!(parse_reference_date("15.03.2022", anchor()), Ok(ymd(2022, 3, 15)));
        assert_eq!(parse_reference_date("20220315", anchor()), Ok(ymd(2022, 3, 15)));
        assert!(parse_reference_date("soon", anchor()).is_err());
    }

    #[test]
    fn window_is_half_open_with_boundaries_flagged() {
        let period = Period::Window {
            from: ymd(2021, 10, 1),
            to: ymd(2022, 10, 1),
        };
        assert!(period.contains(ymd(2022, 9, 1)));
        assert!(!period.contains(ymd(2022, 10, 1)));
        assert!(period.on_boundary(ymd(2022, 10, 1)));
        assert!(period.on_boundary(ymd(2021, 10, 1)));
    }

    #[test]
    fn versioned_path_exposes_every_segment() {
        let vp = VersionedPath::parse("/kat/skolereg_vgskoler_p2022-10_v1.json", anchor()).unwrap();
        assert_eq!(vp.dir, "/kat/");
        assert_eq!(vp.base, "skolereg_vgskoler");
        assert_eq!(vp.version, Some(1));
        assert_eq!(vp.extension.as_deref(), Some("json"));
        assert_eq!(vp.subcategory(&["barnehage", "vgskoler"]), Some("vgskoler"));

        let plain = VersionedPath::parse("/kat/skolereg_p2022-10_v1.json", anchor()).unwrap();
        assert_eq!(plain.subcategory(&["barnehage", "vgskoler"]), None);
    }

    proptest! {
        #[test]
        fn bumping_k_times_adds_k(
            name in "[a-z]{1,8}",
            year in 1990u32..2100,
            start in 1u32..500,
            k in 0u32..20,
        ) {
            let path = format!("/data/{name}_p{year}_v{start}.json");
            let mut bumped = path.clone();
            for _ in 0..k {
                bumped = bump_path(&bumped, 1).unwrap();
            }
            prop_assert_eq!(parse_version(&bumped).unwrap(), start + k);
            let (head, _) = bumped.rsplit_once("_v").unwrap();
            let (orig_head, _) = path.rsplit_once("_v").unwrap();
            prop_assert_eq!(head, orig_head);
            prop_assert!(bumped.ends_with(".json"));
        }
    }
}
