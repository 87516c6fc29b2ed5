//! Keyed catalogs: reference tables joined onto primary data.
//!
//! A [`Catalog`] is a [`Dataset`] plus the names of its key columns. Its two
//! core operations are the cascading reconciliation merge ([`Catalog::merge_on`])
//! and format-style application of one catalog column ([`Catalog::apply_format`]).

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{info, warn};
use utd_core::config::Config;
use utd_core::error::{Result, UtdError};
use utd_core::table::{Column, Table};
use utd_core::value::{Value, ValueKey};
use utd_storage::Storage;

use crate::dataset::{Confirm, Dataset, SaveOptions};
use crate::metadata::MetadataSidecar;

/// Bookkeeping columns every new catalog starts with.
pub const REQUIRED_COLS: [&str; 4] = ["username", "edited_time", "expiry_date", "validity"];

/// Indicator column added by [`Catalog::merge_on`].
pub const MERGE_COL: &str = "_merge";

/// Indicator value of rows no key column matched.
pub const LEFT_ONLY: &str = "left_only";

/// Metadata entry recording the key columns.
const KEY_COLS_ENTRY: &str = "key_cols";

/// Indicator value of rows matched through `key_col`.
#[must_use]
pub fn matched_tag(key_col: &str) -> String {
    format!("{key_col}_both")
}

/// Output of [`Catalog::merge_on`].
#[derive(Debug, Clone)]
pub struct Merged {
    pub table: Table,
    /// Rows per `_merge` value, most frequent first.
    pub counts: Vec<(String, usize)>,
    /// Rows beyond the input row count, produced by duplicate catalog keys.
    pub added_rows: usize,
}

/// Column choices for [`Catalog::apply_format`]. Unset names fall back as
/// documented on each field.
#[derive(Debug, Clone, Default)]
pub struct ApplyFormatOptions {
    /// Catalog column supplying the labels; the catalog's second column.
    pub catalog_col: Option<String>,
    /// Data column holding the keys; `catalog_key_col`, else the first key column.
    pub data_key_col: Option<String>,
    /// Catalog column holding the keys; the data key column name.
    pub catalog_key_col: Option<String>,
    /// Name of the new data column; the catalog column name.
    pub new_col: Option<String>,
    /// Key length for hierarchical codes; `0` uses whole keys.
    pub level: usize,
    pub ordered: bool,
    pub remove_unused: bool,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    dataset: Dataset,
    key_cols: Vec<String>,
}

impl Catalog {
    /// # Errors
    ///
    /// Returns [`UtdError::Validation`] if `key_cols` is empty or holds an empty name.
    pub fn new(dataset: Dataset, key_cols: Vec<String>) -> Result<Self> {
        if key_cols.is_empty() || key_cols.iter().any(String::is_empty) {
            return Err(UtdError::Validation(
                "a catalog needs at least one non-empty key column".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(repeated) = key_cols.iter().find(|k| !seen.insert(k.as_str())) {
            return Err(UtdError::Validation(format!(
                "key column '{repeated}' is listed more than once"
            )));
        }
        Ok(Self { dataset, key_cols })
    }

    pub fn open(
        storage: Arc<dyn Storage>,
        config: &Config,
        path: &str,
        key_cols: Vec<String>,
    ) -> Result<Self> {
        Self::new(Dataset::open(storage, config, path)?, key_cols)
    }

    pub fn open_latest(
        storage: Arc<dyn Storage>,
        config: &Config,
        pattern: &str,
        exclude: &[&str],
        key_cols: Vec<String>,
    ) -> Result<Self> {
        Self::new(Dataset::open_latest(storage, config, pattern, exclude)?, key_cols)
    }

    /// An empty catalog with columns `[key_col, extra_cols.., REQUIRED_COLS..]`.
    pub fn new_empty(
        storage: Arc<dyn Storage>,
        config: &Config,
        path: &str,
        key_col: &str,
        extra_cols: &[&str],
        metadata: IndexMap<String, serde_json::Value>,
    ) -> Result<Self> {
        let mut names = vec![key_col];
        names.extend_from_slice(extra_cols);
        names.extend_from_slice(&REQUIRED_COLS);
        let mut dataset = Dataset::new(storage, config, path, Table::with_columns(names.as_slice()));
        dataset.metadata_mut().extend(metadata);
        info!(path, "created empty catalog; add metadata before saving if needed");
        Self::new(dataset, vec![key_col.to_string()])
    }

    /// Reopen the catalog a metadata sidecar describes.
    ///
    /// # Errors
    ///
    /// Returns [`UtdError::Validation`] if the sidecar records no key columns.
    pub fn open_from_metadata(
        storage: Arc<dyn Storage>,
        config: &Config,
        meta_path: &str,
    ) -> Result<Self> {
        let mut sidecar = MetadataSidecar::read(storage.as_ref(), meta_path)?;
        let key_cols: Vec<String> = sidecar
            .extra
            .shift_remove(KEY_COLS_ENTRY)
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| {
                UtdError::Validation(format!("metadata {meta_path} records no key columns"))
            })?;
        let mut dataset = Dataset::open(storage, config, &sidecar.dataset_path)?;
        dataset.metadata_mut().extend(sidecar.extra);
        Self::new(dataset, key_cols)
    }

    #[must_use]
    pub fn key_cols(&self) -> &[String] {
        &self.key_cols
    }

    /// The same data keyed on other columns.
    pub fn rekeyed(&self, key_cols: Vec<String>) -> Result<Self> {
        Self::new(self.dataset.clone(), key_cols)
    }

    #[must_use]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.dataset
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        self.dataset.table()
    }

    pub fn table_mut(&mut self) -> &mut Table {
        self.dataset.table_mut()
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.dataset.path()
    }

    /// Save through [`Dataset::save`], recording the key columns in the sidecar.
    pub fn save(&mut self, options: &SaveOptions, confirm: &dyn Confirm) -> Result<Option<String>> {
        let key_cols = serde_json::to_value(&self.key_cols)?;
        self.dataset
            .metadata_mut()
            .insert(KEY_COLS_ENTRY.to_string(), key_cols);
        self.dataset.save(options, confirm)
    }

    /// Cascading left join of `data` against each key column in turn.
    ///
    /// Rows matched by a key column are tagged `<key>_both` and removed from
    /// the remainder; the remainder is tried against the next key column.
    /// Rows left at the end are tagged `left_only`. `keep_cols` defaults to
    /// every catalog column except the key columns.
    ///
    /// # Errors
    ///
    /// Returns `TableError::MissingColumn` if `key_col_in_data`, a key column
    /// or a kept column does not exist.
    pub fn merge_on(
        &self,
        data: &Table,
        key_col_in_data: &str,
        keep_cols: Option<&[&str]>,
    ) -> Result<Merged> {
        let catalog = self.table();
        data.values(key_col_in_data)?;
        let keep: Vec<&str> = match keep_cols {
            Some(cols) => cols.to_vec(),
            None => catalog
                .column_names()
                .into_iter()
                .filter(|c| !self.key_cols.iter().any(|k| k == c))
                .collect(),
        };

        let mut parts = Vec::with_capacity(self.key_cols.len() + 1);
        let mut rest = data.clone();
        for col in &self.key_cols {
            if catalog.has_duplicates(col)? {
                warn!(column = %col, "looks like duplicate entries in the catalog key column");
            }
            let mut selection = vec![col.as_str()];
            selection.extend(keep.iter().copied().filter(|k| *k != col.as_str()));
            let right = catalog.select(&selection)?;

            let joined = rest.left_join(&right, key_col_in_data, col)?;
            let mut matched = joined.table.filter(&joined.matched);
            matched.fill_column(MERGE_COL, Value::Str(matched_tag(col)));
            parts.push(matched);

            let catalog_keys: HashSet<ValueKey> =
                catalog.values(col)?.iter().filter_map(Value::key).collect();
            let unmatched: Vec<bool> = rest
                .values(key_col_in_data)?
                .iter()
                .map(|v| v.key().map_or(true, |k| !catalog_keys.contains(&k)))
                .collect();
            rest = rest.filter(&unmatched);
        }
        rest.fill_column(MERGE_COL, Value::str(LEFT_ONLY));
        parts.push(rest);

        let mut table = Table::concat(&parts);
        let mut levels: Vec<Value> = self
            .key_cols
            .iter()
            .map(|c| Value::Str(matched_tag(c)))
            .collect();
        levels.push(Value::str(LEFT_ONLY));
        if let Some(indicator) = table.drop_column(MERGE_COL) {
            table.put_column(indicator.into_categorical(levels, false)?)?;
        }

        let counts: Vec<(String, usize)> = table
            .value_counts(MERGE_COL)?
            .into_iter()
            .map(|(v, n)| (v.to_text(), n))
            .collect();
        for (tag, n) in &counts {
            info!(merge = %tag, rows = n, "merge result");
        }
        let added_rows = table.n_rows().saturating_sub(data.n_rows());
        if added_rows > 0 {
            warn!(
                added_rows,
                "merge resulted in additional rows; duplicates may need to be handled"
            );
        }
        Ok(Merged {
            table,
            counts,
            added_rows,
        })
    }

    /// Key→value mapping between two catalog columns.
    ///
    /// `col` defaults to the second catalog column and `key_col` to the first
    /// key column. With `level > 0` only keys whose text is exactly `level`
    /// characters long are kept, and keys are compared as text.
    ///
    /// # Errors
    ///
    /// Returns `TableError::MissingColumn` for unknown columns and
    /// [`UtdError::Validation`] if the catalog has no second column to default to.
    pub fn to_dict(
        &self,
        col: Option<&str>,
        level: usize,
        key_col: Option<&str>,
    ) -> Result<IndexMap<ValueKey, Value>> {
        let table = self.table();
        let key_col = key_col.unwrap_or(&self.key_cols[0]);
        let col = match col {
            Some(c) => c,
            None => self.second_column()?,
        };
        let keys = table.values(key_col)?;
        let values = table.values(col)?;

        let mut mapping = IndexMap::new();
        for (key, value) in keys.iter().zip(values) {
            let entry = if level > 0 {
                let text = key.to_text();
                let fits = !key.is_missing() && text.chars().count() == level;
                fits.then_some(ValueKey::Str(text))
            } else {
                key.key()
            };
            if let Some(k) = entry {
                mapping.insert(k, value.clone());
            }
        }
        Ok(mapping)
    }

    /// Map a data column through a catalog column into a new categorical column.
    ///
    /// Unmapped keys become missing. A failed categorical conversion is logged
    /// and leaves the plain mapped column in place.
    ///
    /// # Errors
    ///
    /// Returns `TableError::MissingColumn` for unknown columns.
    pub fn apply_format(&self, data: &mut Table, options: &ApplyFormatOptions) -> Result<()> {
        let data_key_col = options
            .data_key_col
            .as_deref()
            .or(options.catalog_key_col.as_deref())
            .unwrap_or(&self.key_cols[0])
            .to_string();
        let catalog_key_col = options
            .catalog_key_col
            .clone()
            .unwrap_or_else(|| data_key_col.clone());
        let catalog_col = match &options.catalog_col {
            Some(c) => c.clone(),
            None => self.second_column()?.to_string(),
        };
        let new_col = options.new_col.clone().unwrap_or_else(|| catalog_col.clone());
        info!(
            new_col = %new_col,
            data_key_col = %data_key_col,
            catalog_col = %catalog_col,
            catalog_key_col = %catalog_key_col,
            "applying catalog format"
        );

        let mapping = self.to_dict(Some(&catalog_col), options.level, Some(&catalog_key_col))?;
        let mut distinct: IndexMap<Option<ValueKey>, &Value> = IndexMap::new();
        for value in mapping.values() {
            distinct.entry(value.key()).or_insert(value);
        }
        let levels: Vec<Value> = distinct.into_values().cloned().collect();

        let mapped: Vec<Value> = data
            .values(&data_key_col)?
            .iter()
            .map(|v| {
                let key = if options.level > 0 {
                    (!v.is_missing())
                        .then(|| ValueKey::Str(v.to_text().chars().take(options.level).collect()))
                } else {
                    v.key()
                };
                key.and_then(|k| mapping.get(&k).cloned())
                    .unwrap_or(Value::Null)
            })
            .collect();

        let column = Column::new(new_col.as_str(), mapped.clone());
        match column.into_categorical(levels, options.ordered) {
            Ok(mut categorical) => {
                if options.remove_unused {
                    categorical.remove_unused_categories();
                }
                data.put_column(categorical)?;
            }
            Err(e) => {
                warn!(column = %new_col, error = %e, "could not convert column to categorical");
                data.set_column(&new_col, mapped)?;
            }
        }
        Ok(())
    }

    fn second_column(&self) -> Result<&str> {
        self.table()
            .column_names()
            .get(1)
            .copied()
            .ok_or_else(|| {
                UtdError::Validation(format!(
                    "catalog {} has no second column to use as values",
                    self.path()
                ))
            })
    }
}

impl std::fmt::Display for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "key columns: {}", self.key_cols.join(", "))?;
        write!(f, "{}", self.dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utd_core::error::TableError;
    use utd_storage::MemoryStorage;

    fn catalog(table: Table, key_cols: &[&str]) -> Catalog {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let dataset = Dataset::new(storage, &Config::default(), "kat/k_p2024_v1.parquet", table);
        Catalog::new(dataset, key_cols.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn strs(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| Value::from(*s)).collect()
    }

    #[test]
    fn empty_key_cols_are_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let dataset = Dataset::new(storage, &Config::default(), "k_p2024_v1.parquet", Table::new());
        assert!(matches!(
            Catalog::new(dataset, Vec::new()),
            Err(UtdError::Validation(_))
        ));
    }

    #[test]
    fn repeated_key_cols_are_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let dataset = Dataset::new(storage, &Config::default(), "k_p2024_v1.parquet", Table::new());
        let err = Catalog::new(
            dataset,
            vec!["orgnr".to_string(), "orgnrbed".to_string(), "orgnr".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, UtdError::Validation(ref m) if m.contains("'orgnr'")));
    }

    #[test]
    fn cascade_tags_each_key_column() {
        let cat = catalog(
            Table::from_columns([
                ("orgnr", strs(&["1", "2", "3"])),
                ("orgnrbed", strs(&["11", "12", "13"])),
                ("navn", strs(&["A", "B", "C"])),
            ])
            .unwrap(),
            &["orgnr", "orgnrbed"],
        );
        let data = Table::from_columns([("id", strs(&["1", "12", "99"]))]).unwrap();
        let merged = cat.merge_on(&data, "id", None).unwrap();

        assert_eq!(merged.table.n_rows(), 3);
        assert_eq!(merged.added_rows, 0);
        let tags: Vec<String> = merged
            .table
            .values(MERGE_COL)
            .unwrap()
            .iter()
            .map(Value::to_text)
            .collect();
        assert_eq!(tags, vec!["orgnr_both", "orgnrbed_both", "left_only"]);
        assert_eq!(
            merged.table.values("navn").unwrap(),
            &[Value::from("A"), Value::from("B"), Value::Null]
        );
        assert!(merged.table.column(MERGE_COL).unwrap().is_categorical());
    }

    #[test]
    fn duplicate_catalog_keys_add_rows() {
        let cat = catalog(
            Table::from_columns([("orgnr", strs(&["1", "1"])), ("navn", strs(&["A", "B"]))]).unwrap(),
            &["orgnr"],
        );
        let data = Table::from_columns([("orgnr", strs(&["1", "2"]))]).unwrap();
        let merged = cat.merge_on(&data, "orgnr", None).unwrap();
        assert_eq!(merged.table.n_rows(), 3);
        assert_eq!(merged.added_rows, 1);
        assert_eq!(merged.counts[0], ("orgnr_both".to_string(), 2));
    }

    #[test]
    fn explicit_keep_cols_limit_the_catalog_side() {
        let cat = catalog(
            Table::from_columns([
                ("orgnr", strs(&["1"])),
                ("navn", strs(&["A"])),
                ("kommune", strs(&["0301"])),
            ])
            .unwrap(),
            &["orgnr"],
        );
        let data = Table::from_columns([("orgnr", strs(&["1"]))]).unwrap();
        let merged = cat.merge_on(&data, "orgnr", Some(&["kommune"][..])).unwrap();
        assert!(merged.table.has_column("kommune"));
        assert!(!merged.table.has_column("navn"));
        assert!(matches!(
            cat.merge_on(&data, "orgnr", Some(&["nope"][..])),
            Err(UtdError::Table(TableError::MissingColumn(_)))
        ));
    }

    #[test]
    fn to_dict_filters_by_level() {
        let cat = catalog(
            Table::from_columns([
                ("nus", strs(&["1", "12", "123", "13"])),
                ("tekst", strs(&["a", "b", "c", "d"])),
            ])
            .unwrap(),
            &["nus"],
        );
        let all = cat.to_dict(None, 0, None).unwrap();
        assert_eq!(all.len(), 4);
        let two = cat.to_dict(Some("tekst"), 2, None).unwrap();
        let keys: Vec<&ValueKey> = two.keys().collect();
        assert_eq!(
            keys,
            vec![&ValueKey::Str("12".to_string()), &ValueKey::Str("13".to_string())]
        );
        assert_eq!(two[&ValueKey::Str("13".to_string())], Value::from("d"));
    }

    #[test]
    fn apply_format_builds_a_categorical_column() {
        let cat = catalog(
            Table::from_columns([
                ("nus", strs(&["12", "13", "14"])),
                ("tekst", strs(&["b", "d", "b"])),
            ])
            .unwrap(),
            &["nus"],
        );
        let mut data = Table::from_columns([("nus", strs(&["1234", "1399", "99"]))]).unwrap();
        let options = ApplyFormatOptions {
            level: 2,
            new_col: Some("niva2".to_string()),
            ..ApplyFormatOptions::default()
        };
        cat.apply_format(&mut data, &options).unwrap();
        let column = data.column("niva2").unwrap();
        assert_eq!(column.values, vec![Value::from("b"), Value::from("d"), Value::Null]);
        let levels = &column.categories.as_ref().unwrap().levels;
        assert_eq!(levels, &vec![Value::from("b"), Value::from("d")]);
    }

    #[test]
    fn apply_format_levels_merge_equal_numbers() {
        let cat = catalog(
            Table::from_columns([
                ("kode", strs(&["a", "b", "c"])),
                ("poeng", vec![Value::Int(1), Value::Float(1.0), Value::Int(2)]),
            ])
            .unwrap(),
            &["kode"],
        );
        let mut data = Table::from_columns([("kode", strs(&["c", "a", "b"]))]).unwrap();
        cat.apply_format(&mut data, &ApplyFormatOptions::default()).unwrap();
        let column = data.column("poeng").unwrap();
        assert_eq!(
            column.categories.as_ref().unwrap().levels,
            vec![Value::Int(1), Value::Int(2)]
        );
        assert_eq!(column.values[0], Value::Int(2));
    }

    #[test]
    fn apply_format_keeps_plain_column_when_categories_are_invalid() {
        let cat = catalog(
            Table::from_columns([
                ("nus", strs(&["1", "2"])),
                ("tekst", vec![Value::from("a"), Value::Null]),
            ])
            .unwrap(),
            &["nus"],
        );
        let mut data = Table::from_columns([("nus", strs(&["1", "2"]))]).unwrap();
        cat.apply_format(&mut data, &ApplyFormatOptions::default()).unwrap();
        let column = data.column("tekst").unwrap();
        assert!(!column.is_categorical());
        assert_eq!(column.values, vec![Value::from("a"), Value::Null]);
    }

    #[test]
    fn new_empty_has_required_columns() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let mut meta = IndexMap::new();
        meta.insert("team".to_string(), serde_json::json!("utd"));
        let cat = Catalog::new_empty(
            storage,
            &Config::default(),
            "kat/ny_p2024_v0.parquet",
            "orgnr",
            &["navn"],
            meta,
        )
        .unwrap();
        assert_eq!(
            cat.table().column_names(),
            vec!["orgnr", "navn", "username", "edited_time", "expiry_date", "validity"]
        );
        assert_eq!(cat.dataset().metadata()["team"], "utd");
    }
}
