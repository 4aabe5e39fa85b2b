//! The installation ledger: what one package install created.
//!
//! An [`InstalledPackage`] is created at the start of an install, filled in
//! step by step and saved after every phase. Identifier lists only ever grow
//! during an install; a failure leaves whatever was already recorded.

mod store;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::{JsonLedgerStore, LEDGER_FILE};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstalledPackage {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub author_url: String,
    pub version: String,
    pub url: String,
    pub readme: String,
    pub license: String,
    pub license_url: String,
    pub package_guid: String,
    pub repository_guid: String,
    pub enable_skins: bool,
    pub skin_repository_guid: String,

    pub data_types: Vec<String>,
    pub languages: Vec<String>,
    pub dictionary_items: Vec<String>,
    pub macros: Vec<String>,
    pub templates: Vec<String>,
    pub document_types: Vec<String>,
    pub stylesheets: Vec<String>,
    pub content_node_id: String,
    pub files: Vec<String>,
    /// Outer XML of every undoable action, concatenated.
    pub actions: String,

    pub uninstalled: bool,
    pub upgrade_id: i64,
    pub install_date: Option<DateTime<Utc>>,
    pub user_id: i64,
    pub version_major: u32,
    pub version_minor: u32,
    pub version_patch: u32,
}

impl InstalledPackage {
    /// Set the version string and the numeric triple parsed from it.
    ///
    /// Missing or non-numeric parts of the triple become `0`.
    pub fn set_version(&mut self, version: &str) {
        self.version = version.to_string();
        let mut parts = version
            .trim()
            .trim_start_matches(['v', 'V'])
            .split('.')
            .map(|p| {
                p.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse::<u32>()
                    .unwrap_or(0)
            });
        self.version_major = parts.next().unwrap_or(0);
        self.version_minor = parts.next().unwrap_or(0);
        self.version_patch = parts.next().unwrap_or(0);
    }
}

/// Persistence port for ledger entries.
#[cfg_attr(test, mockall::automock)]
pub trait LedgerStore: Send + Sync {
    /// Allocate an id and persist an empty entry for `name`.
    fn make_new(&self, name: &str) -> Result<InstalledPackage>;

    /// Insert or replace the entry with `package.id`.
    fn save(&self, package: &InstalledPackage) -> Result<()>;

    fn get_by_id(&self, id: i64) -> Result<Option<InstalledPackage>>;

    fn list(&self) -> Result<Vec<InstalledPackage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_version_triple() {
        let mut package = InstalledPackage::default();
        package.set_version("1.2.3");
        assert_eq!(package.version, "1.2.3");
        assert_eq!(
            (package.version_major, package.version_minor, package.version_patch),
            (1, 2, 3)
        );
    }

    #[test]
    fn test_set_version_lenient() {
        let mut package = InstalledPackage::default();
        package.set_version("v2.0-beta");
        assert_eq!(
            (package.version_major, package.version_minor, package.version_patch),
            (2, 0, 0)
        );

        package.set_version("latest");
        assert_eq!(
            (package.version_major, package.version_minor, package.version_patch),
            (0, 0, 0)
        );
        assert_eq!(package.version, "latest");
    }

    #[test]
    fn test_deserialize_partial_entry() {
        let package: InstalledPackage =
            serde_json::from_str(r#"{"id": 7, "name": "Blog", "files": ["/media/a.txt"]}"#)
                .unwrap();
        assert_eq!(package.id, 7);
        assert_eq!(package.files, vec!["/media/a.txt"]);
        assert!(package.macros.is_empty());
        assert!(package.install_date.is_none());
    }
}
