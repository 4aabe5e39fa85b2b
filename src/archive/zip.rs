use anyhow::{Context, Result};
use log::debug;
use std::io::Read;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zip::ZipArchive;

use crate::runtime::Runtime;

/// Extractor for `.umb` package archives.
pub struct UmbExtractor;

impl UmbExtractor {
    /// Unpack `archive` into a fresh directory under `data_dir` and delete the archive.
    ///
    /// The directory is named after the archive's file stem when that is a
    /// GUID, otherwise after a new random one. An existing directory of that
    /// name is removed first. Any error aborts the unpack and leaves whatever
    /// was already extracted in place.
    #[tracing::instrument(skip(self, runtime))]
    pub fn unpack<R: Runtime>(&self, runtime: &R, archive: &Path, data_dir: &Path) -> Result<PathBuf> {
        let temp_dir = data_dir.join(temp_dir_name(archive));

        let file = runtime
            .open(archive)
            .with_context(|| format!("Failed to open package {:?}", archive))?;

        // zip needs Read + Seek, Runtime::open only gives Read
        let mut buffer = Vec::new();
        let mut reader = file;
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read package {:?}", archive))?;
        let mut zip = ZipArchive::new(std::io::Cursor::new(buffer))
            .with_context(|| format!("{:?} is not a valid package archive", archive))?;

        if runtime.exists(&temp_dir) {
            runtime.remove_dir_all(&temp_dir)?;
        }
        runtime.create_dir_all(&temp_dir)?;
        debug!("Unpacking {:?} to {:?}", archive, temp_dir);

        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .with_context(|| format!("Failed to read entry {} of {:?}", i, archive))?;

            let Some(file_name) = flat_name(entry.name()) else {
                continue;
            };

            let dest = temp_dir.join(file_name);
            let mut out = runtime.create_file(&dest)?;
            std::io::copy(&mut entry, &mut out)
                .with_context(|| format!("Failed to extract {:?}", dest))?;
        }

        runtime
            .remove_file(archive)
            .with_context(|| format!("Failed to delete package {:?}", archive))?;

        Ok(temp_dir)
    }
}

/// The archive's stem if it is a GUID, a new GUID otherwise.
fn temp_dir_name(archive: &Path) -> String {
    archive
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| Uuid::parse_str(s).is_ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Last path segment of an entry name; `None` for directories and unsafe names.
pub(crate) fn flat_name(entry_name: &str) -> Option<&str> {
    let name = entry_name.rsplit(['/', '\\']).next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}
