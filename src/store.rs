//! A JSON document on disk guarded by a process-local mutex.
//!
//! Both the installation ledger and the local artifact catalog are small
//! documents that are read, changed and written back as a whole. Writes go to
//! a sibling `.tmp` file first and are renamed into place.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::runtime::Runtime;

pub struct JsonDocument<'a, R: Runtime, T> {
    runtime: &'a R,
    path: PathBuf,
    lock: Mutex<()>,
    _document: PhantomData<fn() -> T>,
}

impl<'a, R, T> JsonDocument<'a, R, T>
where
    R: Runtime,
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(runtime: &'a R, path: PathBuf) -> Self {
        Self {
            runtime,
            path,
            lock: Mutex::new(()),
            _document: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents, or the default document when the file does not exist yet.
    pub fn read(&self) -> Result<T> {
        let _guard = self.lock()?;
        self.read_unlocked()
    }

    /// Read, modify and write back the document while holding the lock.
    ///
    /// Nothing is written when `f` fails.
    pub fn update<V>(&self, f: impl FnOnce(&mut T) -> Result<V>) -> Result<V> {
        let _guard = self.lock()?;
        let mut document = self.read_unlocked()?;
        let value = f(&mut document)?;
        self.write_unlocked(&document)?;
        Ok(value)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow!("Lock on {:?} was poisoned", self.path))
    }

    fn read_unlocked(&self) -> Result<T> {
        if !self.runtime.exists(&self.path) {
            return Ok(T::default());
        }
        let content = self.runtime.read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON document {:?}", self.path))
    }

    fn write_unlocked(&self, document: &T) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(document)?;
        let tmp_path = self.path.with_extension("json.tmp");
        self.runtime
            .write(&tmp_path, content.as_bytes())
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        self.runtime
            .rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))
    }
}
