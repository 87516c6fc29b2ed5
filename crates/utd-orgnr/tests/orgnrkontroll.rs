//! Organization-number control against registers stored on disk.

use std::path::Path;
use std::sync::Arc;

use utd_catalog::{Dataset, Deny, SaveOptions, MERGE_COL};
use utd_core::table::Table;
use utd_core::value::Value;
use utd_core::Config;
use utd_orgnr::{orgnrkontroll_with_registers, skolereg, OrgnrOptions, Year};
use utd_storage::{LocalStorage, Storage};

fn strs(values: &[&str]) -> Vec<Value> {
    values.iter().map(|s| Value::from(*s)).collect()
}

fn write(storage: &Arc<dyn Storage>, config: &Config, path: String, table: Table) {
    let mut dataset = Dataset::new(Arc::clone(storage), config, &path, table);
    let options = SaveOptions {
        bump_version: false,
        ..SaveOptions::default()
    };
    dataset.save(&options, &Deny).unwrap();
}

fn config_for(dir: &Path) -> Config {
    Config {
        skolereg_path: dir.join("skolereg").to_string_lossy().into_owned(),
        vigo_path: dir.join("vigo").to_string_lossy().into_owned(),
        ..Config::default()
    }
}

fn skolereg_table(navn: &str) -> Table {
    Table::from_columns([
        ("orgnr", strs(&["100", "200"])),
        ("orgnrbed", strs(&["101", "201"])),
        ("skolenavn", strs(&[navn, navn])),
    ])
    .unwrap()
}

fn seed(dir: &Path) -> (Arc<dyn Storage>, Config) {
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new());
    let config = config_for(dir);
    let skolereg_dir = Path::new(&config.skolereg_path);
    let vigo_dir = Path::new(&config.vigo_path);
    let at = |d: &Path, name: &str| d.join(name).to_string_lossy().into_owned();

    write(&storage, &config, at(skolereg_dir, "skolereg_p2023_v1.parquet"), skolereg_table("gammel"));
    write(&storage, &config, at(skolereg_dir, "skolereg_p2024_v1.parquet"), skolereg_table("ny"));
    write(
        &storage,
        &config,
        at(skolereg_dir, "skolereg_vgskoler_p2025_v1.parquet"),
        skolereg_table("vgs"),
    );
    write(
        &storage,
        &config,
        at(vigo_dir, "vigo_skole_p2024_v1.parquet"),
        Table::from_columns([("SKOLENR", strs(&["55"])), ("fylke", strs(&["03"]))]).unwrap(),
    );
    (storage, config)
}

#[test]
fn latest_register_skips_subcategories() {
    let dir = tempfile::tempdir().unwrap();
    let (storage, config) = seed(dir.path());

    let latest = skolereg(Arc::clone(&storage), &config, Year::Latest, "").unwrap();
    assert!(latest.path().ends_with("skolereg_p2024_v1.parquet"));

    let older = skolereg(Arc::clone(&storage), &config, Year::Year(2023), "").unwrap();
    assert_eq!(older.table().values("skolenavn").unwrap()[0], Value::from("gammel"));

    let vgs = skolereg(storage, &config, Year::Latest, "vgskoler").unwrap();
    assert!(vgs.path().ends_with("skolereg_vgskoler_p2025_v1.parquet"));
}

#[test]
fn cascade_runs_against_looked_up_registers() {
    let dir = tempfile::tempdir().unwrap();
    let (storage, config) = seed(dir.path());
    let data = Table::from_columns([
        ("orgnr", strs(&["100", "x", "y"])),
        ("orgnrbed", strs(&["a", "201", "b"])),
        ("fskolenr", strs(&["1", "2", "55"])),
    ])
    .unwrap();

    let result =
        orgnrkontroll_with_registers(storage, &config, &data, &OrgnrOptions::default()).unwrap();
    assert_eq!(
        result.table.values(MERGE_COL).unwrap(),
        &[Value::from("orgnr"), Value::from("orgnrbed"), Value::from("fskolenr")]
    );
    assert_eq!(
        result.table.values("skolenavn").unwrap(),
        &[Value::from("ny"), Value::from("ny"), Value::Null]
    );
}

#[test]
fn missing_register_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new());
    let config = config_for(dir.path());
    assert!(skolereg(storage, &config, Year::Latest, "").is_err());
}

#[test]
fn duplicate_register_keys_are_reported_as_added_rows() {
    let dir = tempfile::tempdir().unwrap();
    let (storage, config) = seed(dir.path());
    let newest = Path::new(&config.skolereg_path).join("skolereg_p2025_v1.parquet");
    write(
        &storage,
        &config,
        newest.to_string_lossy().into_owned(),
        Table::from_columns([
            ("orgnr", strs(&["100", "100"])),
            ("orgnrbed", strs(&["101", "102"])),
            ("skolenavn", strs(&["avdeling a", "avdeling b"])),
        ])
        .unwrap(),
    );
    let data = Table::from_columns([
        ("orgnr", strs(&["100", "x"])),
        ("orgnrbed", strs(&["a", "b"])),
        ("fskolenr", strs(&["1", "2"])),
    ])
    .unwrap();

    let result =
        orgnrkontroll_with_registers(storage, &config, &data, &OrgnrOptions::default()).unwrap();
    assert_eq!(result.table.n_rows(), 3);
    assert_eq!(result.added_rows, 1);
    assert_eq!(
        result.counts,
        vec![("orgnr".to_string(), 2), ("null".to_string(), 1)]
    );
    assert_eq!(
        result.table.values("skolenavn").unwrap(),
        &[Value::from("avdeling a"), Value::from("avdeling b"), Value::Null]
    );
}
