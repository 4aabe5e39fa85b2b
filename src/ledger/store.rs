use anyhow::Result;
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;
use crate::store::JsonDocument;

use super::{InstalledPackage, LedgerStore};

/// File name of the ledger inside the data directory.
pub const LEDGER_FILE: &str = "installedPackages.json";

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    next_id: i64,
    packages: Vec<InstalledPackage>,
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self {
            next_id: 1,
            packages: Vec::new(),
        }
    }
}

/// Ledger entries kept in `<data_dir>/installedPackages.json`.
///
/// Id allocation and writes are serialized by the document lock.
pub struct JsonLedgerStore<'a, R: Runtime> {
    document: JsonDocument<'a, R, LedgerFile>,
}

impl<'a, R: Runtime> JsonLedgerStore<'a, R> {
    pub fn new(runtime: &'a R, data_dir: &Path) -> Self {
        Self {
            document: JsonDocument::new(runtime, data_dir.join(LEDGER_FILE)),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.document.path().to_path_buf()
    }
}

impl<R: Runtime> LedgerStore for JsonLedgerStore<'_, R> {
    #[tracing::instrument(skip(self))]
    fn make_new(&self, name: &str) -> Result<InstalledPackage> {
        self.document.update(|ledger| {
            let package = InstalledPackage {
                id: ledger.next_id,
                name: name.to_string(),
                install_date: Some(Utc::now()),
                ..Default::default()
            };
            ledger.next_id += 1;
            ledger.packages.push(package.clone());
            debug!("Created ledger entry {} for {}", package.id, name);
            Ok(package)
        })
    }

    #[tracing::instrument(skip(self, package), fields(id = package.id))]
    fn save(&self, package: &InstalledPackage) -> Result<()> {
        self.document.update(|ledger| {
            match ledger.packages.iter_mut().find(|p| p.id == package.id) {
                Some(existing) => *existing = package.clone(),
                None => {
                    ledger.packages.push(package.clone());
                    if package.id >= ledger.next_id {
                        ledger.next_id = package.id + 1;
                    }
                }
            }
            Ok(())
        })
    }

    fn get_by_id(&self, id: i64) -> Result<Option<InstalledPackage>> {
        Ok(self
            .document
            .read()?
            .packages
            .into_iter()
            .find(|p| p.id == id))
    }

    fn list(&self) -> Result<Vec<InstalledPackage>> {
        Ok(self.document.read()?.packages)
    }
}
