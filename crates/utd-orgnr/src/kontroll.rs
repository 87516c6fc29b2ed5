//! Organization-number control.
//!
//! Input rows are matched against the school register on `orgnr`, the
//! unmatched remainder on `orgnrbed`, and what is still unmatched against the
//! vocational-school register on the school number. Each row of the result
//! records in `_merge` which input column resolved it, or missing if none did.

use std::sync::Arc;

use tracing::{info, warn};
use utd_catalog::{matched_tag, Catalog, Dataset, Merged, MERGE_COL};
use utd_core::config::Config;
use utd_core::error::{Result, UtdError};
use utd_core::table::Table;
use utd_core::value::Value;
use utd_storage::Storage;

use crate::registers::{skolereg, vigo_skole, Year};

/// School register columns left out of the default keep-columns.
const SKOLEREG_ID_COLS: [&str; 3] = ["orgnr", "orgnrbed", "orgnrforetak"];

#[derive(Debug, Clone)]
pub struct OrgnrOptions {
    /// School register columns to carry over; all but the id columns by default.
    pub skolereg_keep_cols: Option<Vec<String>>,
    /// Vocational register columns to carry over; all but its key by default.
    pub vigo_keep_cols: Option<Vec<String>>,
    pub orgnr_col: String,
    pub orgnrbed_col: String,
    pub fskolenr_col: String,
    /// Register vintage, used when the registers are looked up.
    pub year: Year,
    pub skolereg_subcategory: String,
}

impl Default for OrgnrOptions {
    fn default() -> Self {
        Self {
            skolereg_keep_cols: None,
            vigo_keep_cols: None,
            orgnr_col: "orgnr".to_string(),
            orgnrbed_col: "orgnrbed".to_string(),
            fskolenr_col: "fskolenr".to_string(),
            year: Year::Latest,
            skolereg_subcategory: String::new(),
        }
    }
}

impl OrgnrOptions {
    fn validate(&self, data: &Table) -> Result<()> {
        if self.orgnr_col == self.orgnrbed_col {
            return Err(UtdError::Validation(format!(
                "orgnr columns must differ, got '{}' twice (e.g. orgnr, orgnrbed)",
                self.orgnr_col
            )));
        }
        if !data.has_column(&self.orgnr_col) || !data.has_column(&self.orgnrbed_col) {
            return Err(UtdError::Validation(format!(
                "input data does not contain both '{}' and '{}'",
                self.orgnr_col, self.orgnrbed_col
            )));
        }
        if !data.has_column(&self.fskolenr_col) {
            return Err(UtdError::Validation(format!(
                "input data does not contain '{}'",
                self.fskolenr_col
            )));
        }
        Ok(())
    }
}

/// Split merge output into the rows tagged `tag` and the rest, the rest cut
/// back to `data_cols`.
fn split_matched(merged: Table, tag: &str, data_cols: &[String]) -> Result<(Table, Table)> {
    let tag = Value::str(tag);
    let matched: Vec<bool> = merged.values(MERGE_COL)?.iter().map(|v| *v == tag).collect();
    let unmatched: Vec<bool> = matched.iter().map(|m| !m).collect();
    let rest = merged.filter(&unmatched).select(data_cols)?;
    Ok((merged.filter(&matched), rest))
}

/// Run the cascade against already loaded registers.
///
/// The school register is re-keyed for each stage, so its own key columns do
/// not matter. The vocational register is matched on its first key column.
///
/// # Errors
///
/// Returns [`UtdError::Validation`] if the orgnr column names coincide or an
/// input column is missing, and the table error for unknown keep-columns.
pub fn orgnrkontroll(
    data: &Table,
    skolereg: &Catalog,
    vigo: &Catalog,
    options: &OrgnrOptions,
) -> Result<Merged> {
    options.validate(data)?;
    let data_cols: Vec<String> = data.column_names().iter().map(|c| c.to_string()).collect();

    let skolereg_keep: Vec<&str> = match &options.skolereg_keep_cols {
        Some(cols) => cols.iter().map(String::as_str).collect(),
        None => skolereg
            .table()
            .column_names()
            .into_iter()
            .filter(|c| !SKOLEREG_ID_COLS.contains(c))
            .collect(),
    };
    let vigo_keep: Option<Vec<&str>> = options
        .vigo_keep_cols
        .as_ref()
        .map(|cols| cols.iter().map(String::as_str).collect());

    info!(column = %options.orgnr_col, "merging school register on dataset");
    let by_orgnr = skolereg.rekeyed(vec!["orgnr".to_string()])?;
    let keep = Some(skolereg_keep.as_slice());
    let merged = by_orgnr.merge_on(data, &options.orgnr_col, keep)?;
    let (mut orgnr_matched, rest) =
        split_matched(merged.table, &matched_tag("orgnr"), &data_cols)?;

    info!(column = %options.orgnrbed_col, "merging school register on dataset");
    let by_orgnrbed = skolereg.rekeyed(vec!["orgnrbed".to_string()])?;
    let merged = by_orgnrbed.merge_on(&rest, &options.orgnrbed_col, keep)?;
    let (mut orgnrbed_matched, rest) =
        split_matched(merged.table, &matched_tag("orgnrbed"), &data_cols)?;

    info!(column = %options.fskolenr_col, "merging vocational-school register on dataset");
    let vigo_key = vigo.key_cols()[0].as_str();
    let merged = vigo.merge_on(&rest, &options.fskolenr_col, vigo_keep.as_deref())?;
    let vigo_tag = Value::str(matched_tag(vigo_key));
    let vigo_mask: Vec<bool> = merged
        .table
        .values(MERGE_COL)?
        .iter()
        .map(|v| *v == vigo_tag)
        .collect();
    let unmatched_mask: Vec<bool> = vigo_mask.iter().map(|m| !m).collect();
    let mut fskolenr_matched = merged.table.filter(&vigo_mask);
    let mut unmatched = merged.table.filter(&unmatched_mask);

    orgnr_matched.fill_column(MERGE_COL, Value::str(options.orgnr_col.as_str()));
    orgnrbed_matched.fill_column(MERGE_COL, Value::str(options.orgnrbed_col.as_str()));
    fskolenr_matched.fill_column(MERGE_COL, Value::str(options.fskolenr_col.as_str()));
    unmatched.fill_column(MERGE_COL, Value::Null);
    let table = Table::concat(&[orgnr_matched, orgnrbed_matched, fskolenr_matched, unmatched]);

    info!("final merge report");
    let counts: Vec<(String, usize)> = table
        .value_counts(MERGE_COL)?
        .into_iter()
        .map(|(v, n)| (v.to_string(), n))
        .collect();
    for (by, n) in &counts {
        info!(merged_on = %by, rows = n, "orgnr control result");
    }
    let added_rows = table.n_rows().saturating_sub(data.n_rows());
    if added_rows > 0 {
        warn!(added_rows, "duplicates were found");
    } else {
        info!("no duplicate rows detected");
    }
    Ok(Merged {
        table,
        counts,
        added_rows,
    })
}

/// Look up the registers for `options.year` and run [`orgnrkontroll`].
pub fn orgnrkontroll_with_registers(
    storage: Arc<dyn Storage>,
    config: &Config,
    data: &Table,
    options: &OrgnrOptions,
) -> Result<Merged> {
    options.validate(data)?;
    let skolereg = skolereg(
        Arc::clone(&storage),
        config,
        options.year,
        &options.skolereg_subcategory,
    )?;
    let vigo = vigo_skole(storage, config, options.year)?;
    orgnrkontroll(data, &skolereg, &vigo, options)
}

/// [`orgnrkontroll`] on a dataset; the result keeps the input's path.
pub fn orgnrkontroll_dataset(
    data: &Dataset,
    skolereg: &Catalog,
    vigo: &Catalog,
    options: &OrgnrOptions,
) -> Result<Dataset> {
    let merged = orgnrkontroll(data.table(), skolereg, vigo, options)?;
    let mut result = Dataset::new(
        Arc::clone(data.storage()),
        data.config(),
        data.path(),
        merged.table,
    );
    result.metadata_mut().extend(data.metadata().clone());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::VIGO_KEY_COL;
    use utd_storage::MemoryStorage;

    fn strs(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| Value::from(*s)).collect()
    }

    fn catalog(table: Table, key: &str) -> Catalog {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let dataset = Dataset::new(storage, &Config::default(), "kat/k_p2024_v1.parquet", table);
        Catalog::new(dataset, vec![key.to_string()]).unwrap()
    }

    fn registers() -> (Catalog, Catalog) {
        let skolereg = catalog(
            Table::from_columns([
                ("orgnr", strs(&["100", "200"])),
                ("orgnrbed", strs(&["101", "201"])),
                ("orgnrforetak", strs(&["900", "900"])),
                ("skolenavn", strs(&["Nord", "Sør"])),
            ])
            .unwrap(),
            "orgnr",
        );
        let vigo = catalog(
            Table::from_columns([
                ("SKOLENR", strs(&["55"])),
                ("fylke", strs(&["03"])),
            ])
            .unwrap(),
            VIGO_KEY_COL,
        );
        (skolereg, vigo)
    }

    fn input() -> Table {
        Table::from_columns([
            ("orgnr", strs(&["100", "x", "y", "z"])),
            ("orgnrbed", strs(&["a", "201", "b", "c"])),
            ("fskolenr", strs(&["1", "2", "55", "9"])),
        ])
        .unwrap()
    }

    #[test]
    fn each_stage_sees_only_the_remainder() {
        let (skolereg, vigo) = registers();
        let result = orgnrkontroll(&input(), &skolereg, &vigo, &OrgnrOptions::default()).unwrap();

        assert_eq!(result.table.n_rows(), 4);
        assert_eq!(result.added_rows, 0);
        assert_eq!(
            result.table.values(MERGE_COL).unwrap(),
            &[
                Value::from("orgnr"),
                Value::from("orgnrbed"),
                Value::from("fskolenr"),
                Value::Null
            ]
        );
        assert_eq!(
            result.table.values("skolenavn").unwrap(),
            &[Value::from("Nord"), Value::from("Sør"), Value::Null, Value::Null]
        );
        assert_eq!(result.table.values("fylke").unwrap()[2], Value::from("03"));
        assert!(!result.table.has_column("orgnrforetak"));
    }

    #[test]
    fn equal_orgnr_columns_are_rejected() {
        let (skolereg, vigo) = registers();
        let options = OrgnrOptions {
            orgnrbed_col: "orgnr".to_string(),
            ..OrgnrOptions::default()
        };
        assert!(matches!(
            orgnrkontroll(&input(), &skolereg, &vigo, &options),
            Err(UtdError::Validation(_))
        ));
    }

    #[test]
    fn missing_school_number_column_is_rejected() {
        let (skolereg, vigo) = registers();
        let options = OrgnrOptions {
            fskolenr_col: "skolenr".to_string(),
            ..OrgnrOptions::default()
        };
        let err = orgnrkontroll(&input(), &skolereg, &vigo, &options).unwrap_err();
        assert!(err.to_string().contains("skolenr"));
    }

    #[test]
    fn explicit_keep_cols_are_honored() {
        let (skolereg, vigo) = registers();
        let options = OrgnrOptions {
            skolereg_keep_cols: Some(vec!["orgnrforetak".to_string()]),
            vigo_keep_cols: Some(Vec::new()),
            ..OrgnrOptions::default()
        };
        let result = orgnrkontroll(&input(), &skolereg, &vigo, &options).unwrap();
        assert!(result.table.has_column("orgnrforetak"));
        assert!(!result.table.has_column("skolenavn"));
        assert!(!result.table.has_column("fylke"));
    }

    #[test]
    fn dataset_result_keeps_the_input_path() {
        let (skolereg, vigo) = registers();
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let data = Dataset::new(storage, &Config::default(), "utd/elever_p2024_v3.parquet", input());
        let result =
            orgnrkontroll_dataset(&data, &skolereg, &vigo, &OrgnrOptions::default()).unwrap();
        assert_eq!(result.path(), "utd/elever_p2024_v3.parquet");
        assert_eq!(result.len(), 4);
    }
}
