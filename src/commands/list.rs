use anyhow::Result;
use log::debug;

use crate::{
    ledger::{JsonLedgerStore, LedgerStore},
    runtime::Runtime,
};

use super::config::Config;

/// List the packages recorded in the ledger
#[tracing::instrument(skip(config))]
pub fn list<R: Runtime>(config: &Config<R>, show_all: bool) -> Result<()> {
    let store = JsonLedgerStore::new(&config.runtime, &config.installer.data_dir);
    debug!("Listing packages from {:?}", store.path());

    let packages: Vec<_> = store
        .list()?
        .into_iter()
        .filter(|p| show_all || !p.uninstalled)
        .collect();

    if packages.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    for package in packages {
        let version = if package.version.is_empty() {
            "(unknown)"
        } else {
            package.version.as_str()
        };
        let installed = package
            .install_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let marker = if package.uninstalled { " (uninstalled)" } else { "" };
        println!(
            "#{} {} {} {}{}",
            package.id, package.name, version, installed, marker
        );
    }

    Ok(())
}
