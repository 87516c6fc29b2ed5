//! Shared in-memory object store.
//!
//! Clones share the same objects. A writer buffers its bytes and publishes them
//! when flushed or dropped, so readers never observe a half-written object.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock};

use utd_core::error::{Result, UtdError};

use crate::{compile_glob, Storage, OBJECT_METADATA_SUFFIX};

type Objects = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    objects: Objects,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All object paths, ascending.
    pub fn paths(&self) -> Result<Vec<String>> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects.keys().cloned().collect())
    }

    pub fn remove(&self, path: &str) -> Result<bool> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        Ok(objects.remove(path).is_some())
    }
}

fn poisoned() -> UtdError {
    UtdError::Storage("memory store lock poisoned".to_string())
}

struct MemoryWriter {
    objects: Objects,
    path: String,
    buf: Vec<u8>,
}

impl MemoryWriter {
    fn commit(&mut self) -> io::Result<()> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| io::Error::other("memory store lock poisoned"))?;
        objects.insert(self.path.clone(), self.buf.clone());
        Ok(())
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit()
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let _ = self.commit();
    }
}

impl Storage for MemoryStorage {
    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = compile_glob(pattern)?;
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects
            .keys()
            .filter(|p| matcher.is_match(p.as_str()))
            .cloned()
            .collect())
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read>> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        let bytes = objects.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no object at {path}"))
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write>> {
        Ok(Box::new(MemoryWriter {
            objects: Arc::clone(&self.objects),
            path: path.to_string(),
            buf: Vec::new(),
        }))
    }

    fn exists(&self, path: &str) -> bool {
        self.objects
            .read()
            .map(|objects| objects.contains_key(path))
            .unwrap_or(false)
    }

    fn metadata_suffix(&self) -> &'static str {
        OBJECT_METADATA_SUFFIX
    }
}
