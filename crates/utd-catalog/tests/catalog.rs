//! Catalog persistence and merging against files on disk.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use utd_catalog::{
    sidecar_path, Approve, Catalog, Dataset, Deny, MetadataSidecar, OverwriteMode, SaveOptions,
    LEFT_ONLY, MERGE_COL,
};
use utd_core::error::UtdError;
use utd_core::table::Table;
use utd_core::value::Value;
use utd_core::Config;
use utd_storage::{LocalStorage, Storage, LOCAL_METADATA_SUFFIX};

fn storage() -> Arc<dyn Storage> {
    Arc::new(LocalStorage::new())
}

fn path_in(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

fn orgnr_catalog() -> Table {
    Table::from_columns([
        (
            "orgnr",
            vec![Value::from("1"), Value::from("2"), Value::from("3")],
        ),
        (
            "navn",
            vec![Value::from("Skole A"), Value::from("Skole B"), Value::from("Skole C")],
        ),
    ])
    .unwrap()
}

#[test]
fn merge_tags_matched_and_unmatched_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default();
    let dataset = Dataset::new(
        storage(),
        &config,
        &path_in(dir.path(), "skoler_p2024_v1.parquet"),
        orgnr_catalog(),
    );
    let catalog = Catalog::new(dataset, vec!["orgnr".to_string()]).unwrap();

    let data = Table::from_columns([(
        "orgnr",
        vec![Value::from("1"), Value::from("2"), Value::from("4")],
    )])
    .unwrap();
    let merged = catalog.merge_on(&data, "orgnr", None).unwrap();

    assert_eq!(merged.table.n_rows(), 3);
    assert_eq!(
        merged.counts,
        vec![("orgnr_both".to_string(), 2), (LEFT_ONLY.to_string(), 1)]
    );
    assert_eq!(
        merged.table.values(MERGE_COL).unwrap()[2],
        Value::from(LEFT_ONLY)
    );
    assert_eq!(merged.table.values("navn").unwrap()[2], Value::Null);
}

#[test]
fn saved_catalog_is_found_as_latest() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default();
    let path = path_in(dir.path(), "skoler_p2024_v1.parquet");
    let dataset = Dataset::new(storage(), &config, &path, orgnr_catalog());
    let mut catalog = Catalog::new(dataset, vec!["orgnr".to_string()]).unwrap();

    let written = catalog
        .save(&SaveOptions::default(), &Deny)
        .unwrap()
        .unwrap();
    assert_eq!(written, path_in(dir.path(), "skoler_p2024_v2.parquet"));
    assert!(Path::new(&sidecar_path(&written, LOCAL_METADATA_SUFFIX)).exists());

    let pattern = format!("{}/skoler_*.parquet", dir.path().display());
    let reopened =
        Catalog::open_latest(storage(), &config, &pattern, &["META"], vec!["orgnr".to_string()])
            .unwrap();
    assert_eq!(reopened.path(), written);
    assert_eq!(reopened.table(), catalog.table());
}

#[test]
fn saving_twice_without_bump_needs_an_overwrite_mode() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default();
    let path = path_in(dir.path(), "skoler_p2024_v1.parquet");
    let mut dataset = Dataset::new(storage(), &config, &path, orgnr_catalog());
    let no_bump = SaveOptions {
        bump_version: false,
        ..SaveOptions::default()
    };
    dataset.save(&no_bump, &Deny).unwrap();

    let err = dataset.save(&no_bump, &Deny).unwrap_err();
    assert!(matches!(err, UtdError::AlreadyExists { .. }));

    let overwrite = SaveOptions {
        overwrite_mode: OverwriteMode::Overwrite,
        ..no_bump.clone()
    };
    assert_eq!(dataset.save(&overwrite, &Deny).unwrap(), None);
    assert_eq!(dataset.save(&overwrite, &Approve).unwrap(), Some(path));
}

#[test]
fn catalog_reopens_from_its_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default();
    let mut meta = IndexMap::new();
    meta.insert("eier".to_string(), serde_json::json!("utd"));
    let mut catalog = Catalog::new_empty(
        storage(),
        &config,
        &path_in(dir.path(), "ny_p2024_v0.parquet"),
        "orgnr",
        &["navn"],
        meta,
    )
    .unwrap();
    catalog
        .table_mut()
        .push_row(vec![("orgnr", Value::from("9")), ("navn", Value::from("Ny"))])
        .unwrap();

    let written = catalog
        .save(&SaveOptions::default(), &Deny)
        .unwrap()
        .unwrap();
    let meta_path = sidecar_path(&written, LOCAL_METADATA_SUFFIX);

    let sidecar = MetadataSidecar::read(storage().as_ref(), &meta_path).unwrap();
    assert_eq!(sidecar.version, 1);
    assert_eq!(sidecar.rows, 1);
    assert_eq!(sidecar.extra["eier"], "utd");

    let reopened = Catalog::open_from_metadata(storage(), &config, &meta_path).unwrap();
    assert_eq!(reopened.key_cols(), ["orgnr".to_string()]);
    assert_eq!(reopened.path(), written);
    assert_eq!(reopened.dataset().metadata()["eier"], "utd");
    assert_eq!(reopened.table().values("navn").unwrap(), &[Value::from("Ny")]);
}
