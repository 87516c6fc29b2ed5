//! Versioned path resolution over a [`Storage`].
//!
//! Candidates are ordered newest-first with a digit-aware descending sort, so
//! `_v10` ranks above `_v9` while zero-padded periods keep their lexical order.

use std::cmp::Ordering;

use chrono::NaiveDate;
use tracing::debug;
use utd_core::error::{PathError, Result};
use utd_core::naming::{parse_period, parse_version, PathParts, Period};

use crate::{Storage, OBJECT_METADATA_SUFFIX};

/// Paths matching `pattern`, newest-first, minus metadata sidecars and any
/// whose file name contains one of `exclude`.
pub fn list_paths(storage: &dyn Storage, pattern: &str, exclude: &[&str]) -> Result<Vec<String>> {
    let mut paths: Vec<String> = storage
        .glob(pattern)?
        .into_iter()
        .filter(|path| {
            let name = file_name(path);
            !name.ends_with(OBJECT_METADATA_SUFFIX)
                && !exclude.iter().any(|k| !k.is_empty() && name.contains(k))
        })
        .collect();
    paths.sort_by(|a, b| natural_cmp(b, a));
    debug!(pattern, ?exclude, count = paths.len(), "listed candidate paths");
    Ok(paths)
}

/// The newest path matching `pattern`.
///
/// # Errors
///
/// Returns [`PathError::NoCandidates`] if nothing matches.
pub fn latest(storage: &dyn Storage, pattern: &str, exclude: &[&str]) -> Result<String> {
    list_paths(storage, pattern, exclude)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            PathError::NoCandidates {
                pattern: pattern.to_string(),
            }
            .into()
        })
}

/// Every candidate with its parsed period, newest-first.
pub fn path_periods(
    storage: &dyn Storage,
    pattern: &str,
    exclude: &[&str],
    default: NaiveDate,
) -> Result<Vec<(String, Period)>> {
    list_paths(storage, pattern, exclude)?
        .into_iter()
        .map(|path| {
            let period = parse_period(&path, default)?;
            Ok((path, period))
        })
        .collect()
}

/// The newest candidate whose period contains `reference`.
///
/// Single-date files are effective from their date; windows are half-open.
///
/// # Errors
///
/// Returns [`PathError::AmbiguousBoundary`] when `reference` equals a window bound of a
/// candidate visited before a match, and [`PathError::NoMatchingPeriod`] when nothing qualifies.
pub fn resolve_for_date(
    storage: &dyn Storage,
    reference: NaiveDate,
    pattern: &str,
    exclude: &[&str],
    default: NaiveDate,
) -> Result<String> {
    for (path, period) in path_periods(storage, pattern, exclude, default)? {
        if let Period::Window { from, to } = period {
            if period.on_boundary(reference) {
                return Err(PathError::AmbiguousBoundary {
                    path,
                    reference: reference.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                }
                .into());
            }
        }
        if period.contains(reference) {
            debug!(%reference, path = %path, %period, "resolved path for reference date");
            return Ok(path);
        }
    }
    Err(PathError::NoMatchingPeriod {
        reference: reference.to_string(),
        pattern: pattern.to_string(),
    }
    .into())
}

/// Sibling revisions of `path`: same directory, stem with its trailing digits
/// stripped, same extension. Paths without a version token, such as metadata
/// sidecars, are skipped. Ascending, so the newest is last.
pub fn similar_paths(storage: &dyn Storage, path: &str) -> Result<Vec<String>> {
    let parts = PathParts::split(path);
    let prefix = parts.stem.trim_end_matches(|c: char| c.is_ascii_digit());
    let pattern = parts.with_stem(&format!("{prefix}*"));
    let mut paths: Vec<String> = storage
        .glob(&pattern)?
        .into_iter()
        .filter(|p| parse_version(p).is_ok())
        .collect();
    paths.sort_by(|a, b| natural_cmp(a, b));
    Ok(paths)
}

/// The newest sibling revision of `path`, or `None` when no sibling exists yet.
pub fn latest_version_path(storage: &dyn Storage, path: &str) -> Result<Option<String>> {
    Ok(similar_paths(storage, path)?.pop())
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Compare strings treating runs of ASCII digits as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.as_bytes(), b.as_bytes());
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (da, ra) = split_digits(a);
                let (db, rb) = split_digits(b);
                let ta = trim_zeros(da);
                let tb = trim_zeros(db);
                let ord = ta
                    .len()
                    .cmp(&tb.len())
                    .then_with(|| ta.cmp(tb))
                    .then_with(|| da.len().cmp(&db.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
                a = ra;
                b = rb;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s.iter().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn trim_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|c| *c != b'0').unwrap_or(s.len());
    &s[start..]
}
