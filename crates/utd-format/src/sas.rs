//! Import of SAS `proc format` definitions.
//!
//! ```text
//! proc format;
//!   value $kjonn
//!     '1' = 'Mann'
//!     '2' = 'Kvinne'
//!     other = 'Ukjent';
//!   value alder
//!     low-15 = 'Barn'
//!     16-66  = 'Voksen';
//! run;
//! ```
//! Ranges become `"low-15"` style keys, so the range fallback of
//! [`FormatDict`] picks them up. SAS exclusive markers (`<`) are dropped.

use indexmap::IndexMap;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use tracing::{debug, info};
use utd_core::error::{Result, UtdError};
use utd_storage::Storage;

use crate::dict::FormatDict;
use crate::store::FormatStore;

#[derive(Parser)]
#[grammar = "sas.pest"]
struct SasParser;

/// Every `value` statement of every `proc format` block, by format name.
/// A leading `$` is stripped from character format names.
///
/// # Errors
///
/// Returns [`UtdError::Parse`] if the script cannot be tokenised.
pub fn parse_sas_script(content: &str) -> Result<IndexMap<String, FormatDict>> {
    let script = SasParser::parse(Rule::script, content)
        .map_err(|e| UtdError::Parse(format!("SAS script: {e}")))?
        .next()
        .ok_or_else(|| UtdError::Parse("SAS script: empty parse tree".to_string()))?;

    let mut formats = IndexMap::new();
    for block in script
        .into_inner()
        .filter(|p| p.as_rule() == Rule::proc_format)
    {
        for stmt in block
            .into_inner()
            .filter(|p| p.as_rule() == Rule::value_stmt)
        {
            let (name, format) = value_statement(stmt);
            debug!(format = %name, keys = format.len(), "parsed SAS value statement");
            formats.insert(name, format);
        }
    }
    Ok(formats)
}

fn value_statement(stmt: Pair<'_, Rule>) -> (String, FormatDict) {
    let mut name = String::new();
    let mut entries: Vec<(String, String)> = Vec::new();
    for part in stmt.into_inner() {
        match part.as_rule() {
            Rule::format_name => name = part.as_str().trim_start_matches('$').to_string(),
            Rule::mapping => {
                let mut inner = part.into_inner();
                let keys = inner.next().map(key_list).unwrap_or_default();
                let label = inner.next().map(text_of).unwrap_or_default();
                entries.extend(keys.into_iter().map(|k| (k, label.clone())));
            }
            _ => {}
        }
    }
    (name, FormatDict::from_pairs(entries))
}

fn key_list(list: Pair<'_, Rule>) -> Vec<String> {
    list.into_inner()
        .filter_map(|item| item.into_inner().next())
        .map(|key| match key.as_rule() {
            Rule::range => key.into_inner().map(text_of).collect::<Vec<_>>().join("-"),
            _ => text_of(key),
        })
        .collect()
}

fn text_of(pair: Pair<'_, Rule>) -> String {
    match pair.as_rule() {
        Rule::bound | Rule::single | Rule::label => {
            pair.into_inner().next().map(text_of).unwrap_or_default()
        }
        Rule::quoted => match pair.into_inner().next() {
            Some(inner) if inner.as_rule() == Rule::sq_inner => inner.as_str().replace("''", "'"),
            Some(inner) => inner.as_str().replace("\"\"", "\""),
            None => String::new(),
        },
        _ => pair.as_str().trim().to_string(),
    }
}

/// Parse one `.sas` file (Latin-1) and store every format in it, uncached.
/// Returns the paths written; unchanged formats are skipped.
///
/// # Errors
///
/// Returns [`UtdError::Validation`] if `path` does not end in `.sas`.
pub fn import_sas_file(store: &FormatStore, storage: &dyn Storage, path: &str) -> Result<Vec<String>> {
    if !path.ends_with(".sas") {
        return Err(UtdError::Validation(format!(
            "expected a .sas file, got {path}"
        )));
    }
    let content: String = storage.read_bytes(path)?.into_iter().map(char::from).collect();
    let mut written = Vec::new();
    for (name, mut format) in parse_sas_script(&content)? {
        format.set_cached(false);
        if let Some(stored) = store.store(&name, &format, false)? {
            written.push(stored);
        }
    }
    info!(path, stored = written.len(), "imported SAS formats");
    Ok(written)
}

/// Import every `*.sas` file directly inside `dir`.
pub fn import_sas_folder(store: &FormatStore, storage: &dyn Storage, dir: &str) -> Result<Vec<String>> {
    let pattern = format!("{}/*.sas", dir.trim_end_matches('/'));
    let mut written = Vec::new();
    for file in storage.glob(&pattern)? {
        info!(path = %file, "processing SAS file");
        written.extend(import_sas_file(store, storage, &file)?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::{FormatKey, ResolvedBy};

    const SCRIPT: &str = r#"
libname x '/ssb/whatever';
data a; set b; run;

proc format;
  /* kjønn */
  value $kjonn
    '1' = 'Mann'
    '2' = 'Kvinne'
    OTHER = 'Ukjent';
  value alder (default=10)
    low-15 = 'Barn'
    16 - 66 = "Voksen"
    67-high = 'Eldre'
    . = 'Mangler';
run;

PROC FORMAT library=work;
  value $fylke '03','3' = 'Oslo' '11' = 'Rogaland';
run;
"#;

    #[test]
    fn parses_every_value_statement() {
        let formats = parse_sas_script(SCRIPT).unwrap();
        let names: Vec<&str> = formats.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["kjonn", "alder", "fylke"]);

        let kjonn = &formats["kjonn"];
        assert_eq!(kjonn.get(&FormatKey::str("1")), Some("Mann"));
        assert_eq!(kjonn.other_value(), Some("Ukjent"));
    }

    #[test]
    fn ranges_and_missing_keys_resolve() {
        let formats = parse_sas_script(SCRIPT).unwrap();
        let alder = &formats["alder"];
        assert_eq!(alder.ranges().len(), 3);
        let r = alder.resolve(&FormatKey::Int(40)).unwrap();
        assert_eq!((r.value.as_str(), r.via), ("Voksen", ResolvedBy::Range));
        assert_eq!(alder.resolve(&FormatKey::Int(3)).unwrap().value, "Barn");
        assert_eq!(alder.na_value(), Some("Mangler"));
    }

    #[test]
    fn key_lists_share_a_label() {
        let formats = parse_sas_script(SCRIPT).unwrap();
        let fylke = &formats["fylke"];
        assert_eq!(fylke.get(&FormatKey::str("03")), Some("Oslo"));
        assert_eq!(fylke.get(&FormatKey::str("3")), Some("Oslo"));
        assert_eq!(fylke.get(&FormatKey::str("11")), Some("Rogaland"));
    }

    #[test]
    fn unquoted_labels_stop_at_the_next_mapping() {
        let formats = parse_sas_script(
            "proc format;\n  value kjonn 1=Mann 2=Kvinne 3 = Ikke oppgitt;\n  value alder low-15=Barn 16 - 66=Voksen;\nrun;",
        )
        .unwrap();
        let kjonn = &formats["kjonn"];
        assert_eq!(kjonn.len(), 3);
        assert_eq!(kjonn.get(&FormatKey::str("1")), Some("Mann"));
        assert_eq!(kjonn.get(&FormatKey::str("2")), Some("Kvinne"));
        assert_eq!(kjonn.get(&FormatKey::str("3")), Some("Ikke oppgitt"));

        let alder = &formats["alder"];
        assert_eq!(alder.get(&FormatKey::str("low-15")), Some("Barn"));
        assert_eq!(alder.get(&FormatKey::str("16-66")), Some("Voksen"));
    }

    #[test]
    fn doubled_quotes_unescape() {
        let formats = parse_sas_script("proc format; value $q 'a' = 'It''s'; run;").unwrap();
        assert_eq!(formats["q"].get(&FormatKey::str("a")), Some("It's"));
    }

    #[test]
    fn script_without_proc_format_is_empty() {
        assert!(parse_sas_script("data a; x = 1; run;").unwrap().is_empty());
    }
}
