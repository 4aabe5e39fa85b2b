use anyhow::Result;
use log::debug;
use std::path::Path;
use std::sync::Arc;

use crate::{
    actions::{ActionRegistry, ActionStatus},
    cleanup::new_shared,
    install::{InstallReport, PackageInstaller},
    ledger::JsonLedgerStore,
    runtime::{RealRuntime, Runtime},
    services::{LocalCatalog, Services},
};

use super::{config::Config, inspect::print_conflicts, resolve_path};

/// Install a package archive, or a directory previously extracted by `inspect`.
#[tracing::instrument(skip(config))]
pub async fn install<R: Runtime>(
    config: &Config<R>,
    package: &Path,
    package_guid: Option<&str>,
    repository_guid: Option<&str>,
) -> Result<()> {
    let runtime = &config.runtime;
    let path = resolve_path(runtime, package)?;
    let store = JsonLedgerStore::new(runtime, &config.installer.data_dir);
    let catalog = LocalCatalog::new(runtime, &config.installer.data_dir);
    let actions = ActionRegistry::with_standard_actions();

    let cleanup_ctx = new_shared();
    let cleanup_ctx_clone = Arc::clone(&cleanup_ctx);
    let ctrl_c_handler = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cleaning up...");
            if let Ok(ctx) = cleanup_ctx_clone.lock() {
                ctx.cleanup(&RealRuntime);
            }
            std::process::exit(130);
        }
    });

    let mut installer = PackageInstaller::new(
        runtime,
        &config.installer,
        &store,
        Services::uniform(&catalog),
        &actions,
    )
    .with_cleanup(Arc::clone(&cleanup_ctx));

    let result = if runtime.is_dir(&path) {
        debug!("Installing extracted package from {:?}", path);
        installer.install_extracted(&path, package_guid, repository_guid)
    } else {
        installer.install(&path, package_guid, repository_guid)
    };

    ctrl_c_handler.abort();

    let report = result?;
    print_report(&report);
    if !report.is_complete() {
        anyhow::bail!(
            "Package {} was installed with errors (ledger entry #{}): {} file(s) and {} action(s) failed",
            report.package_name,
            report.ledger_id,
            report.file_failures.len(),
            report.failed_actions().count()
        );
    }
    Ok(())
}

fn print_report(report: &InstallReport) {
    println!(
        "Installed {} as #{}",
        report.package_name, report.ledger_id
    );
    if !report.conflicts.is_empty() {
        print_conflicts(&report.conflicts);
    }

    println!("Files installed: {}", report.installed_files.len());
    for file in &report.installed_files {
        println!("  {}", file);
    }
    if !report.file_failures.is_empty() {
        println!("Files not installed: {}", report.file_failures.len());
        for failure in &report.file_failures {
            println!("  {}", failure);
        }
    }

    for outcome in &report.actions {
        match &outcome.status {
            ActionStatus::Succeeded => println!("Action {}: done", outcome.alias),
            ActionStatus::Declined => println!("Action {}: nothing to do", outcome.alias),
            ActionStatus::Failed(reason) => {
                println!("Action {}: failed: {}", outcome.alias, reason)
            }
        }
    }
}
