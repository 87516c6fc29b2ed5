//! Format lookups and persistence through a real directory.

use std::sync::Arc;

use utd_format::{import_sas_file, import_sas_folder, FormatDict, FormatKey, FormatStore};
use utd_storage::{LocalStorage, Storage};

#[test]
fn teens_range_hit() {
    let mut f = FormatDict::from_pairs([("10-20", "teens")]);
    assert_eq!(f.lookup(12).unwrap(), "teens");
}

#[test]
fn int_str_confusion_in_both_directions() {
    let mut by_str = FormatDict::from_pairs([("10", "x")]);
    assert_eq!(by_str.lookup(10).unwrap(), "x");
    let mut by_int = FormatDict::from_pairs([(10, "x")]);
    assert_eq!(by_int.lookup("10").unwrap(), "x");
}

#[test]
fn other_under_any_casing_catches_unknown_keys() {
    for casing in ["other", "Other", "OTHER", "oThEr"] {
        let mut f = FormatDict::from_pairs([("1", "one"), (casing, "rest")]);
        assert_eq!(f.lookup("unknown").unwrap(), "rest");
        assert_eq!(f.get(&FormatKey::str("other")), Some("rest"));
    }
}

#[test]
fn sas_import_writes_one_file_per_format_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let sas_dir = dir.path().join("sas");
    let formats_dir = dir.path().join("formater");
    std::fs::create_dir_all(&sas_dir).unwrap();
    std::fs::create_dir_all(&formats_dir).unwrap();

    // Latin-1 encoded label
    let mut script = b"proc format;\n value $kjonn '1' = 'Mann' '2' = 'Kvinne';\n value $sted '1' = 'Troms".to_vec();
    script.push(0xF8);
    script.extend_from_slice(b"';\nrun;\n");
    let sas_path = sas_dir.join("formater.sas");
    std::fs::write(&sas_path, script).unwrap();

    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new());
    let store = FormatStore::new(Arc::clone(&storage), formats_dir.to_string_lossy());
    let sas_path = sas_path.to_string_lossy().into_owned();

    let written = import_sas_file(&store, storage.as_ref(), &sas_path).unwrap();
    assert_eq!(written.len(), 2);

    let sted = store.load("sted", None).unwrap().unwrap();
    assert_eq!(sted.get(&FormatKey::str("1")), Some("Tromsø"));

    let again = import_sas_folder(&store, storage.as_ref(), &sas_dir.to_string_lossy()).unwrap();
    assert!(again.is_empty());
    assert_eq!(store.info(None).unwrap().len(), 2);
}

#[test]
fn sas_import_rejects_other_extensions() {
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new());
    let store = FormatStore::new(Arc::clone(&storage), "/tmp/unused/");
    assert!(matches!(
        import_sas_file(&store, storage.as_ref(), "/tmp/formats.txt"),
        Err(utd_core::UtdError::Validation(_))
    ));
}
