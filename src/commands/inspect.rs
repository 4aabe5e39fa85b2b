use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::{
    actions::ActionRegistry,
    conflicts::ConflictReport,
    install::PackageInstaller,
    ledger::JsonLedgerStore,
    manifest::PackageManifest,
    runtime::Runtime,
    services::{LocalCatalog, Services},
};

use super::{config::Config, resolve_path};

/// Unpack a package (or read an extracted one) and print what installing it would do.
///
/// The extraction directory is kept so that it can be installed or discarded afterwards.
#[tracing::instrument(skip(config))]
pub fn inspect<R: Runtime>(config: &Config<R>, package: &Path) -> Result<()> {
    let runtime = &config.runtime;
    let path = resolve_path(runtime, package)?;
    let store = JsonLedgerStore::new(runtime, &config.installer.data_dir);
    let catalog = LocalCatalog::new(runtime, &config.installer.data_dir);
    let actions = ActionRegistry::with_standard_actions();
    let mut installer = PackageInstaller::new(
        runtime,
        &config.installer,
        &store,
        Services::uniform(&catalog),
        &actions,
    );

    let temp_dir = if runtime.is_dir(&path) {
        installer.load_manifest(&path)?;
        path
    } else {
        installer.import(&path)?
    };
    debug!("Package extracted to {:?}", temp_dir);

    if let Some(manifest) = installer.manifest() {
        print_manifest(manifest, &actions);
    }
    println!();
    print_conflicts(installer.conflicts());

    println!("\nExtracted to: {}", temp_dir.display());
    println!(
        "Run `umbpack install {0}` to install it, or `umbpack cleanup {0}` to discard it.",
        temp_dir.display()
    );
    Ok(())
}

pub(crate) fn print_manifest(manifest: &PackageManifest, actions: &ActionRegistry) {
    println!("Package: {} {}", manifest.name, manifest.version);
    if !manifest.author.is_empty() {
        println!("Author: {}", manifest.author);
    }
    if !manifest.url.is_empty() {
        println!("URL: {}", manifest.url);
    }
    if !manifest.license.is_empty() {
        println!("License: {}", manifest.license);
    }
    let req = manifest.requirements;
    println!("Requires: {}.{}.{}", req.major, req.minor, req.patch);

    println!("\nFiles: {}", manifest.files.len());
    for file in &manifest.files {
        println!("  {}", file.ledger_path());
    }
    if !manifest.macros.is_empty() {
        println!("Macros: {}", manifest.macros.len());
        for m in &manifest.macros {
            println!("  {} ({})", m.alias, m.name);
        }
    }
    if !manifest.templates.is_empty() {
        println!("Templates: {}", manifest.templates.len());
        for t in &manifest.templates {
            println!("  {} ({})", t.alias, t.name);
        }
    }
    if !manifest.stylesheets.is_empty() {
        println!("Stylesheets: {}", manifest.stylesheets.len());
        for s in &manifest.stylesheets {
            println!("  {}", s.name);
        }
    }
    if !manifest.actions.is_empty() {
        println!("Actions: {}", manifest.actions.len());
        for a in &manifest.actions {
            let known = if actions.get(&a.alias).is_some() {
                ""
            } else {
                " [unknown]"
            };
            println!("  {}{}", a.alias, known);
        }
    }
}

pub(crate) fn print_conflicts(conflicts: &ConflictReport) {
    if conflicts.is_empty() {
        println!("No conflicts.");
        return;
    }

    println!("Conflicts:");
    for (existing, alias) in &conflicts.conflicting_macros {
        println!("  macro '{}' already exists as '{}'", alias, existing);
    }
    for (existing, alias) in &conflicts.conflicting_templates {
        println!("  template '{}' already exists as '{}'", alias, existing);
    }
    for (existing, name) in &conflicts.conflicting_stylesheets {
        println!("  stylesheet '{}' already exists as '{}'", name, existing);
    }
    for file in &conflicts.unsecure_files {
        println!("  unsecure file: {}", file);
    }
    for error in &conflicts.binary_file_errors {
        println!("  binary check failed: {}", error);
    }
}
