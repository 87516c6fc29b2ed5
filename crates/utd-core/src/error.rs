//! Error types for versioned datasets, catalogs and formats.

use thiserror::Error;

/// Top-level result type for utd operations.
pub type Result<T> = std::result::Result<T, UtdError>;

/// Top-level error type for utd.
#[derive(Debug, Error)]
pub enum UtdError {
    #[error("path error: {0}")]
    Path(#[from] PathError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// Caller misuse: conflicting arguments, missing columns, bad mode strings.
    #[error("validation error: {0}")]
    Validation(String),

    /// A write was refused because the target already exists.
    #[error(
        "file already exists at {path}; choose the \"overwrite\" or \"filebump\" mode to write anyway"
    )]
    AlreadyExists { path: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for UtdError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors from the versioned filename grammar and path resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("no version token in {path}; expected a trailing _v<N> before the extension")]
    MissingVersion { path: String },

    #[error("version token '{token}' in {path} is not numeric")]
    InvalidVersion { path: String, token: String },

    #[error("raising the version of {path} by {by} overflows")]
    VersionOverflow { path: String, by: u32 },

    #[error("could not parse '{fragment}' in {path} as a period date")]
    InvalidPeriod { path: String, fragment: String },

    #[error("could not parse '{input}' as a date")]
    InvalidDate { input: String },

    #[error("no paths match glob pattern {pattern}")]
    NoCandidates { pattern: String },

    #[error(
        "{reference} lies on a boundary of the period {from} to {to} in {path}; pick a date strictly between the two periods"
    )]
    AmbiguousBoundary {
        path: String,
        reference: String,
        from: String,
        to: String,
    },

    #[error("no valid version for {reference} among paths matching {pattern}")]
    NoMatchingPeriod { reference: String, pattern: String },
}

/// Errors from format lookups and format persistence.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("{key} not in format, and no other-key is specified")]
    KeyNotFound { key: String },

    #[error(
        "refusing to store cached format '{name}': cached lookups may have added many keys; disable caching or pass force"
    )]
    CachedStore { name: String },

    #[error("invalid stored format file name {path}")]
    InvalidFileName { path: String },
}

/// Errors from table manipulation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("column '{column}' has {actual} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("categories must be unique, '{0}' appears more than once")]
    DuplicateCategory(String),

    #[error("categories cannot contain missing values")]
    NullCategory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_human_readable_messages() {
        let err = PathError::MissingVersion {
            path: "data_p2024.json".to_string(),
        };
        assert!(err.to_string().contains("data_p2024.json"));

        let err = FormatError::KeyNotFound {
            key: "42".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("other"));

        let err = UtdError::AlreadyExists {
            path: "/tmp/x_v2.json".to_string(),
        };
        assert!(err.to_string().contains("/tmp/x_v2.json"));
    }

    #[test]
    fn sub_errors_convert_into_top_level() {
        let err: UtdError = TableError::MissingColumn("orgnr".to_string()).into();
        assert!(matches!(err, UtdError::Table(TableError::MissingColumn(_))));
    }
}
