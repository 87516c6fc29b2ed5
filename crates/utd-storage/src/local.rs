//! Local filesystem backend.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;
use utd_core::error::Result;
use walkdir::WalkDir;

use crate::{compile_glob, Storage, LOCAL_METADATA_SUFFIX, OBJECT_METADATA_SUFFIX};

const GLOB_META: &[char] = &['*', '?', '[', '{'];

#[derive(Debug, Clone)]
pub struct LocalStorage {
    metadata_suffix: &'static str,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata_suffix: LOCAL_METADATA_SUFFIX,
        }
    }

    /// A bucket exposed as a directory; sidecars follow the object-store naming.
    #[must_use]
    pub fn mounted_bucket() -> Self {
        Self {
            metadata_suffix: OBJECT_METADATA_SUFFIX,
        }
    }
}

/// Directory part of the pattern before its first glob metacharacter.
fn literal_root(pattern: &str) -> &str {
    let literal = match pattern.find(GLOB_META) {
        Some(i) => &pattern[..i],
        None => pattern,
    };
    match literal.rfind('/') {
        Some(0) => "/",
        Some(i) => &pattern[..i],
        None => "",
    }
}

impl Storage for LocalStorage {
    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        if !pattern.contains(GLOB_META) {
            return Ok(if Path::new(pattern).is_file() {
                vec![pattern.to_string()]
            } else {
                Vec::new()
            });
        }

        let matcher = compile_glob(pattern)?;
        let root = literal_root(pattern);
        let walk_root = if root.is_empty() { "." } else { root };
        if !Path::new(walk_root).is_dir() {
            debug!(pattern, root = walk_root, "glob root does not exist");
            return Ok(Vec::new());
        }

        let mut paths: Vec<String> = WalkDir::new(walk_root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let path = e.path().to_string_lossy().into_owned();
                if root.is_empty() {
                    path.strip_prefix("./").map(str::to_string)
                } else {
                    Some(path)
                }
            })
            .filter(|p| matcher.is_match(p))
            .collect();
        paths.sort();
        debug!(pattern, count = paths.len(), "globbed local paths");
        Ok(paths)
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write>> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }

    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn metadata_suffix(&self) -> &'static str {
        self.metadata_suffix
    }
}
