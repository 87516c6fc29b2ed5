//! The `FormatDict` remapping engine.
//!
//! A format is an ordered key→label map with side tables derived from its keys:
//! numeric ranges (`"10-20"`, `"low-5"`, `"90-high"`), the label bound to the
//! first NA-like key, and the canonical lowercase `"other"` fallback. The side
//! tables are rebuilt after every mutation.
//!
//! Lookups resolve in a fixed order: exact key, int/str confusion, range, NA,
//! `other`. In cached mode every fallback hit is written back as a literal entry.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utd_core::error::FormatError;
use utd_core::value::Value;

/// Literal strings recognised as missing, compared case-insensitively.
pub const NA_SENTINELS: &[&str] = &[".", "none", "", "na", "<na>", "<nan>"];

/// The catch-all key.
pub const OTHER_KEY: &str = "other";

/// A format key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormatKey {
    Str(String),
    Int(i64),
    /// Non-integral float, stored by bit pattern.
    Float(u64),
    /// A missing value (null or NaN).
    Missing,
}

impl FormatKey {
    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Whether the key is an NA sentinel.
    #[must_use]
    pub fn is_na(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Str(s) => {
                let lower = s.trim().to_lowercase();
                NA_SENTINELS.contains(&lower.as_str())
            }
            _ => false,
        }
    }

    /// Finite numeric view; `"inf"` and `"NaN"` are not numbers here.
    fn as_f64(&self) -> Option<f64> {
        let x = match self {
            Self::Int(i) => *i as f64,
            Self::Float(bits) => f64::from_bits(*bits),
            Self::Str(s) => s.trim().parse::<f64>().ok()?,
            Self::Missing => return None,
        };
        x.is_finite().then_some(x)
    }

    /// The keys this one may have been confused with: `"10"` ↔ `10`.
    fn confusions(&self) -> Vec<FormatKey> {
        match self {
            Self::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| vec![Self::Int(i)])
                .unwrap_or_default(),
            Self::Int(i) => vec![Self::Str(i.to_string())],
            Self::Float(_) | Self::Missing => Vec::new(),
        }
    }

    /// Text form used when the format is persisted as a JSON object.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(bits) => f64::from_bits(*bits).to_string(),
            Self::Missing => ".".to_string(),
        }
    }
}

impl fmt::Display for FormatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "<missing>"),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

impl From<&str> for FormatKey {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for FormatKey {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for FormatKey {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for FormatKey {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for FormatKey {
    fn from(f: f64) -> Self {
        if f.is_nan() {
            Self::Missing
        } else if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            Self::Int(f as i64)
        } else {
            Self::Float(f.to_bits())
        }
    }
}

impl From<&Value> for FormatKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Bool(b) => Self::Str(b.to_string()),
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => Self::from(*f),
            Value::Str(s) => Self::Str(s.clone()),
        }
    }
}

/// Which resolution step produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Exact,
    IntStrConfusion,
    Range,
    Na,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub value: String,
    pub via: ResolvedBy,
}

/// An inclusive numeric range parsed from a key such as `"10-20"` or `"low-5"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub low: f64,
    pub high: f64,
    pub value: String,
}

impl Range {
    fn parse(key: &str, value: &str) -> Option<Self> {
        if key.matches('-').count() != 1 {
            return None;
        }
        let (bottom, top) = key.split_once('-')?;
        let low = parse_bound(bottom, "low", f64::NEG_INFINITY)?;
        let high = parse_bound(top, "high", f64::INFINITY)?;
        Some(Self {
            low,
            high,
            value: value.to_string(),
        })
    }

    #[must_use]
    pub fn contains(&self, x: f64) -> bool {
        self.low <= x && x <= self.high
    }
}

fn hit(value: &str, via: ResolvedBy) -> Resolution {
    Resolution {
        value: value.to_string(),
        via,
    }
}

fn parse_bound(text: &str, open_word: &str, open_value: f64) -> Option<f64> {
    let text = text.trim();
    if text.eq_ignore_ascii_case(open_word) {
        return Some(open_value);
    }
    let numeric = !text.is_empty()
        && text.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && text.bytes().any(|b| b.is_ascii_digit());
    if numeric {
        text.parse().ok()
    } else {
        None
    }
}

/// A value-remapping format.
#[derive(Debug, Clone)]
pub struct FormatDict {
    entries: IndexMap<FormatKey, String>,
    ranges: Vec<Range>,
    na_value: Option<String>,
    cached: bool,
}

impl Default for FormatDict {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            ranges: Vec::new(),
            na_value: None,
            cached: true,
        }
    }
}

impl PartialEq for FormatDict {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl FormatDict {
    /// An empty format in cached mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<FormatKey>,
        V: Into<String>,
    {
        let mut dict = Self::new();
        for (k, v) in pairs {
            dict.entries.insert(k.into(), v.into());
        }
        dict.refresh();
        dict
    }

    #[must_use]
    pub fn cached(&self) -> bool {
        self.cached
    }

    pub fn set_cached(&mut self, cached: bool) {
        self.cached = cached;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact entry, no fallbacks.
    #[must_use]
    pub fn get(&self, key: &FormatKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FormatKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    #[must_use]
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    #[must_use]
    pub fn na_value(&self) -> Option<&str> {
        self.na_value.as_deref()
    }

    #[must_use]
    pub fn other_value(&self) -> Option<&str> {
        self.get(&FormatKey::str(OTHER_KEY))
    }

    /// Insert or replace an entry. Returns the previous label.
    pub fn insert(&mut self, key: impl Into<FormatKey>, value: impl Into<String>) -> Option<String> {
        let previous = self.entries.insert(key.into(), value.into());
        self.refresh();
        previous
    }

    pub fn remove(&mut self, key: &FormatKey) -> Option<String> {
        let removed = self.entries.shift_remove(key);
        self.refresh();
        removed
    }

    pub fn extend<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<FormatKey>,
        V: Into<String>,
    {
        for (k, v) in pairs {
            self.entries.insert(k.into(), v.into());
        }
        self.refresh();
    }

    /// Resolve `key` without touching the map.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::KeyNotFound`] when no step applies.
    pub fn resolve(&self, key: &FormatKey) -> Result<Resolution, FormatError> {
        if let Some(value) = self.entries.get(key) {
            return Ok(hit(value, ResolvedBy::Exact));
        }
        if let Some(value) = key.confusions().iter().find_map(|k| self.entries.get(k)) {
            return Ok(hit(value, ResolvedBy::IntStrConfusion));
        }
        if let Some(x) = key.as_f64() {
            if let Some(range) = self.ranges.iter().find(|r| r.contains(x)) {
                return Ok(hit(&range.value, ResolvedBy::Range));
            }
        }
        if key.is_na() {
            if let Some(value) = &self.na_value {
                return Ok(hit(value, ResolvedBy::Na));
            }
        }
        if let Some(value) = self.other_value() {
            return Ok(hit(value, ResolvedBy::Other));
        }
        Err(FormatError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// Resolve `key`, memoising fallback hits when caching is on.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::KeyNotFound`] when no step applies.
    pub fn lookup(&mut self, key: impl Into<FormatKey>) -> Result<String, FormatError> {
        let key = key.into();
        let Resolution { value, via } = self.resolve(&key)?;
        if self.cached && via != ResolvedBy::Exact {
            self.insert(key, value.clone());
        }
        Ok(value)
    }

    /// Map every cell through the format; misses become `Null`.
    pub fn map_values(&mut self, values: &[Value]) -> Vec<Value> {
        values
            .iter()
            .map(|v| {
                self.lookup(FormatKey::from(v))
                    .map_or(Value::Null, Value::Str)
            })
            .collect()
    }

    /// Unique labels in first-seen order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        let seen: IndexSet<&String> = self.entries.values().collect();
        seen.into_iter().cloned().collect()
    }

    /// Rebuild ranges, the NA label and the lowercase `other` key.
    fn refresh(&mut self) {
        let other_variant = self.entries.keys().find_map(|k| match k {
            FormatKey::Str(s) if s != OTHER_KEY && s.eq_ignore_ascii_case(OTHER_KEY) => {
                Some(k.clone())
            }
            _ => None,
        });
        if let Some(variant) = other_variant {
            if let Some(value) = self.entries.shift_remove(&variant) {
                self.entries.insert(FormatKey::str(OTHER_KEY), value);
            }
        }

        self.ranges = self
            .entries
            .iter()
            .filter_map(|(k, v)| match k {
                FormatKey::Str(s) => Range::parse(s, v),
                _ => None,
            })
            .collect();

        self.na_value = self
            .entries
            .iter()
            .find(|(k, _)| k.is_na())
            .map(|(_, v)| v.clone());
    }

    /// The persisted JSON object: text keys, string labels, insertion order.
    #[must_use]
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_text(), serde_json::Value::String(v.clone())))
            .collect()
    }

    /// Rebuild from a persisted JSON object. Non-string labels keep their JSON text.
    #[must_use]
    pub fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::from_pairs(map.into_iter().map(|(k, v)| {
            let label = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, label)
        }))
    }
}

impl Serialize for FormatDict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FormatDict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::deserialize(deserializer)?;
        Ok(Self::from_json_map(map))
    }
}
