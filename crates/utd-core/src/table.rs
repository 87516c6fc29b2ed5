//! In-memory column-oriented table.
//!
//! Just enough of a data frame for versioned datasets and catalogs:
//! column selection, row filtering, concatenation, left joins with a
//! match indicator, value counts, and categorical columns.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TableError;
use crate::value::{Value, ValueKey};

/// Allowed levels of a categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categories {
    pub levels: Vec<Value>,
    #[serde(default)]
    pub ordered: bool,
}

/// A named column of cells, optionally categorical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Categories>,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
            categories: None,
        }
    }

    #[must_use]
    pub fn is_categorical(&self) -> bool {
        self.categories.is_some()
    }

    /// Convert into a categorical column with the given levels.
    ///
    /// Values outside the levels become missing.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NullCategory`] if a level is missing and
    /// [`TableError::DuplicateCategory`] if a level repeats.
    pub fn into_categorical(self, levels: Vec<Value>, ordered: bool) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        for level in &levels {
            let key = level.key().ok_or(TableError::NullCategory)?;
            if !seen.insert(key) {
                return Err(TableError::DuplicateCategory(level.to_string()));
            }
        }
        let values = self
            .values
            .into_iter()
            .map(|v| match v.key() {
                Some(k) if seen.contains(&k) => v,
                _ => Value::Null,
            })
            .collect();
        Ok(Self {
            name: self.name,
            values,
            categories: Some(Categories { levels, ordered }),
        })
    }

    /// Drop levels that no value uses.
    pub fn remove_unused_categories(&mut self) {
        if let Some(categories) = self.categories.as_mut() {
            let used: HashSet<ValueKey> = self.values.iter().filter_map(Value::key).collect();
            categories
                .levels
                .retain(|level| level.key().is_some_and(|k| used.contains(&k)));
        }
    }
}

/// Column-oriented table. All columns have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

/// Result of [`Table::left_join`]: joined rows plus, per row, whether the right side matched.
#[derive(Debug, Clone)]
pub struct Joined {
    pub table: Table,
    pub matched: Vec<bool>,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table with the given column names.
    #[must_use]
    pub fn with_columns<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            columns: names
                .iter()
                .map(|n| Column::new(n.as_ref(), Vec::new()))
                .collect(),
        }
    }

    /// Build a table from `(name, values)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::LengthMismatch`] or [`TableError::DuplicateColumn`].
    pub fn from_columns<I, S>(columns: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        let table = Self {
            columns: columns
                .into_iter()
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        };
        table.validate()?;
        Ok(table)
    }

    /// Check column-name uniqueness and equal column lengths.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), TableError> {
        let mut names = HashSet::new();
        let expected = self.n_rows();
        for column in &self.columns {
            if !names.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if column.values.len() != expected {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected,
                    actual: column.values.len(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Values of a column.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingColumn`] if the column does not exist.
    pub fn values(&self, name: &str) -> Result<&[Value], TableError> {
        self.column(name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// Insert or replace a plain (non-categorical) column.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::LengthMismatch`] if the length differs from the table's row count.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), TableError> {
        self.put_column(Column::new(name, values))
    }

    /// Insert or replace a column, keeping its categories.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::LengthMismatch`] if the length differs from the table's row count.
    pub fn put_column(&mut self, column: Column) -> Result<(), TableError> {
        let others_len = self
            .columns
            .iter()
            .find(|c| c.name != column.name)
            .map(|c| c.values.len());
        if let Some(expected) = others_len {
            if expected != column.values.len() {
                return Err(TableError::LengthMismatch {
                    column: column.name,
                    expected,
                    actual: column.values.len(),
                });
            }
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Set every row of `name` to `value`.
    pub fn fill_column(&mut self, name: &str, value: Value) {
        let values = vec![value; self.n_rows()];
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = Column::new(name, values),
            None => self.columns.push(Column::new(name, values)),
        }
    }

    /// Remove a column, returning it if it existed.
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Append one row given as `(column, value)` pairs; unspecified columns get `Null`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingColumn`] for a pair naming an unknown column.
    pub fn push_row<S: AsRef<str>>(&mut self, row: Vec<(S, Value)>) -> Result<(), TableError> {
        for (name, _) in &row {
            if !self.has_column(name.as_ref()) {
                return Err(TableError::MissingColumn(name.as_ref().to_string()));
            }
        }
        let mut cells: HashMap<String, Value> = row
            .into_iter()
            .map(|(n, v)| (n.as_ref().to_string(), v))
            .collect();
        for column in &mut self.columns {
            column
                .values
                .push(cells.remove(&column.name).unwrap_or_default());
        }
        Ok(())
    }

    /// New table with only the named columns, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingColumn`] for an unknown name.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, TableError> {
        let columns = names
            .iter()
            .map(|n| {
                self.column(n.as_ref())
                    .cloned()
                    .ok_or_else(|| TableError::MissingColumn(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns })
    }

    /// New table with the rows at `indices`, in that order.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: indices.iter().map(|&i| c.values[i].clone()).collect(),
                    categories: c.categories.clone(),
                })
                .collect(),
        }
    }

    /// New table with the rows where `mask` is true.
    #[must_use]
    pub fn filter(&self, mask: &[bool]) -> Self {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        self.take(&indices)
    }

    /// Stack tables vertically. Columns are the union in first-seen order;
    /// cells a part does not have become `Null`. Categories survive only when
    /// every part carries the column with identical categories.
    #[must_use]
    pub fn concat(parts: &[Self]) -> Self {
        let mut order: Vec<String> = Vec::new();
        for part in parts {
            for column in &part.columns {
                if !order.contains(&column.name) {
                    order.push(column.name.clone());
                }
            }
        }
        let columns = order
            .into_iter()
            .map(|name| {
                let mut values = Vec::new();
                let mut categories: Option<Option<Categories>> = None;
                for part in parts {
                    match part.column(&name) {
                        Some(c) => {
                            values.extend(c.values.iter().cloned());
                            categories = match categories {
                                None => Some(c.categories.clone()),
                                Some(prev) if prev == c.categories => Some(prev),
                                Some(_) => Some(None),
                            };
                        }
                        None => {
                            values.extend(std::iter::repeat(Value::Null).take(part.n_rows()));
                            categories = Some(None);
                        }
                    }
                }
                Column {
                    name,
                    values,
                    categories: categories.flatten(),
                }
            })
            .collect();
        Self { columns }
    }

    /// Count occurrences of each value (missing values included), most frequent first.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingColumn`] if the column does not exist.
    pub fn value_counts(&self, name: &str) -> Result<Vec<(Value, usize)>, TableError> {
        let mut counts: Vec<(Value, usize)> = Vec::new();
        let mut positions: HashMap<Option<ValueKey>, usize> = HashMap::new();
        for value in self.values(name)? {
            let key = value.key();
            match positions.get(&key) {
                Some(&pos) => counts[pos].1 += 1,
                None => {
                    positions.insert(key, counts.len());
                    let shown = if value.is_missing() {
                        Value::Null
                    } else {
                        value.clone()
                    };
                    counts.push((shown, 1));
                }
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(counts)
    }

    /// Whether a non-missing value occurs more than once in the column.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingColumn`] if the column does not exist.
    pub fn has_duplicates(&self, name: &str) -> Result<bool, TableError> {
        let mut seen = HashSet::new();
        Ok(self
            .values(name)?
            .iter()
            .filter_map(Value::key)
            .any(|k| !seen.insert(k)))
    }

    /// Left outer join on `self[left_on] == right[right_on]`.
    ///
    /// Every left row appears at least once; a left row matching several right
    /// rows is repeated. Missing keys never match. When both key columns share
    /// a name only the left one is kept. Other overlapping names get `_x`
    /// (left) and `_y` (right) suffixes.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingColumn`] if either key column is missing.
    pub fn left_join(&self, right: &Self, left_on: &str, right_on: &str) -> Result<Joined, TableError> {
        let left_keys = self.values(left_on)?;
        let right_keys = right.values(right_on)?;

        let mut index: HashMap<ValueKey, Vec<usize>> = HashMap::new();
        for (j, value) in right_keys.iter().enumerate() {
            if let Some(key) = value.key() {
                index.entry(key).or_default().push(j);
            }
        }

        let mut pairs: Vec<(usize, Option<usize>)> = Vec::with_capacity(left_keys.len());
        for (i, value) in left_keys.iter().enumerate() {
            match value.key().and_then(|k| index.get(&k)) {
                Some(rows) => pairs.extend(rows.iter().map(|&j| (i, Some(j)))),
                None => pairs.push((i, None)),
            }
        }

        let right_columns: Vec<&Column> = right
            .columns
            .iter()
            .filter(|c| !(c.name == right_on && right_on == left_on))
            .collect();
        let overlap: HashSet<&str> = right_columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|n| self.has_column(n))
            .collect();

        let mut columns = Vec::with_capacity(self.n_cols() + right_columns.len());
        for column in &self.columns {
            let name = if overlap.contains(column.name.as_str()) {
                format!("{}_x", column.name)
            } else {
                column.name.clone()
            };
            columns.push(Column {
                name,
                values: pairs.iter().map(|&(i, _)| column.values[i].clone()).collect(),
                categories: column.categories.clone(),
            });
        }
        for column in right_columns {
            let name = if overlap.contains(column.name.as_str()) {
                format!("{}_y", column.name)
            } else {
                column.name.clone()
            };
            columns.push(Column {
                name,
                values: pairs
                    .iter()
                    .map(|&(_, j)| j.map_or(Value::Null, |j| column.values[j].clone()))
                    .collect(),
                categories: column.categories.clone(),
            });
        }

        Ok(Joined {
            table: Self { columns },
            matched: pairs.iter().map(|(_, j)| j.is_some()).collect(),
        })
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "(empty table)");
        }

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.name.len()).collect();
        for (i, column) in self.columns.iter().enumerate() {
            for value in &column.values {
                widths[i] = widths[i].max(value.to_string().len());
            }
        }

        let header: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:width$}", c.name, width = widths[i]))
            .collect();
        writeln!(f, "{}", header.join(" | "))?;

        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", sep.join("-+-"))?;

        for row in 0..self.n_rows() {
            let cells: Vec<String> = self
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{:width$}", c.values[row].to_string(), width = widths[i]))
                .collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}
