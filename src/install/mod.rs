//! The package installer.
//!
//! An install walks through fixed stages:
//!
//! ```text
//! Uploaded -> Extracted -> ManifestLoaded -> ConflictsDetected -> LedgerCreated
//!          -> FilesInstalled -> ArtifactsImported -> ActionsRun -> CleanedUp
//! ```
//!
//! There is no rollback. A failure after the ledger entry exists leaves that
//! entry saved with whatever it had recorded, along with the files and
//! artifacts already created.

pub mod config;
mod files;
mod importer;
mod report;

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::actions::{ActionContext, ActionOutcome, ActionRegistry, run_actions};
use crate::archive::{UmbExtractor, is_package_file};
use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::conflicts::ConflictReport;
use crate::ledger::{InstalledPackage, LedgerStore};
use crate::manifest::PackageManifest;
use crate::runtime::{Runtime, normalize_path};
use crate::services::Services;

pub use config::{InstallerConfig, SystemDirectories};
pub use files::install_files;
pub use importer::import_artifacts;
pub use report::{FileFailure, InstallReport};

/// Errors that stop an install before anything is written to the application.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("package file {0:?} does not exist")]
    NotFound(PathBuf),

    #[error("{0:?} is not a .umb package")]
    WrongExtension(PathBuf),

    #[error("failed to unpack package {path:?}")]
    Unpack {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Uploaded,
    Extracted,
    ManifestLoaded,
    ConflictsDetected,
    LedgerCreated,
    FilesInstalled,
    ArtifactsImported,
    ActionsRun,
    CleanedUp,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStage::Uploaded => "uploaded",
            InstallStage::Extracted => "extracted",
            InstallStage::ManifestLoaded => "manifest loaded",
            InstallStage::ConflictsDetected => "conflicts detected",
            InstallStage::LedgerCreated => "ledger created",
            InstallStage::FilesInstalled => "files installed",
            InstallStage::ArtifactsImported => "artifacts imported",
            InstallStage::ActionsRun => "actions run",
            InstallStage::CleanedUp => "cleaned up",
        };
        f.write_str(name)
    }
}

/// Recursively delete an extraction directory. Does nothing if it is already gone.
pub fn install_cleanup<R: Runtime>(runtime: &R, temp_dir: &Path) -> Result<()> {
    if runtime.exists(temp_dir) {
        runtime
            .remove_dir_all(temp_dir)
            .with_context(|| format!("Failed to remove {:?}", temp_dir))?;
        debug!("Removed {:?}", temp_dir);
    }
    Ok(())
}

/// Whether `dir` sits directly inside the data directory, where packages are extracted.
pub fn is_extraction_dir(config: &InstallerConfig, dir: &Path) -> bool {
    let data_dir = normalize_path(&config.data_dir);
    normalize_path(dir).parent() == Some(data_dir.as_path())
}

/// Installs one package. Create a new installer for every package.
pub struct PackageInstaller<'a, R: Runtime> {
    runtime: &'a R,
    config: &'a InstallerConfig,
    store: &'a dyn LedgerStore,
    services: Services<'a>,
    actions: &'a ActionRegistry,
    cleanup_ctx: Option<SharedCleanupContext>,
    cleanup_guard: Option<CleanupGuard>,
    stage: InstallStage,
    temp_dir: Option<PathBuf>,
    unpacked_here: bool,
    manifest: Option<PackageManifest>,
    conflicts: ConflictReport,
}

impl<'a, R: Runtime> PackageInstaller<'a, R> {
    pub fn new(
        runtime: &'a R,
        config: &'a InstallerConfig,
        store: &'a dyn LedgerStore,
        services: Services<'a>,
        actions: &'a ActionRegistry,
    ) -> Self {
        Self {
            runtime,
            config,
            store,
            services,
            actions,
            cleanup_ctx: None,
            cleanup_guard: None,
            stage: InstallStage::Uploaded,
            temp_dir: None,
            unpacked_here: false,
            manifest: None,
            conflicts: ConflictReport::default(),
        }
    }

    /// Register the extraction directory with `ctx` so an interrupted install can remove it.
    pub fn with_cleanup(mut self, ctx: SharedCleanupContext) -> Self {
        self.cleanup_ctx = Some(ctx);
        self
    }

    pub fn stage(&self) -> InstallStage {
        self.stage
    }

    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    pub fn manifest(&self) -> Option<&PackageManifest> {
        self.manifest.as_ref()
    }

    pub fn conflicts(&self) -> &ConflictReport {
        &self.conflicts
    }

    /// Validate and unpack a package archive, then load its manifest.
    ///
    /// Relative paths are resolved against the data directory. Returns the
    /// extraction directory.
    #[tracing::instrument(skip(self))]
    pub fn import(&mut self, file: &Path) -> Result<PathBuf> {
        let path = if file.is_relative() {
            self.config.data_dir.join(file)
        } else {
            file.to_path_buf()
        };

        if !self.runtime.exists(&path) {
            return Err(InstallError::NotFound(path).into());
        }
        if !is_package_file(&path) {
            return Err(InstallError::WrongExtension(path).into());
        }

        let temp_dir = UmbExtractor
            .unpack(self.runtime, &path, &self.config.data_dir)
            .map_err(|source| InstallError::Unpack {
                path: path.clone(),
                source,
            })?;
        self.temp_dir = Some(temp_dir.clone());
        self.unpacked_here = true;
        self.track(temp_dir.clone());
        self.advance(InstallStage::Extracted);

        if let Err(source) = self.load_manifest(&temp_dir) {
            return Err(InstallError::Unpack { path, source }.into());
        }
        Ok(temp_dir)
    }

    /// Read the manifest from an extracted package and check it for conflicts.
    #[tracing::instrument(skip(self))]
    pub fn load_manifest(&mut self, temp_dir: &Path) -> Result<()> {
        let manifest = PackageManifest::load(self.runtime, temp_dir)?;
        self.temp_dir = Some(temp_dir.to_path_buf());
        self.advance(InstallStage::ManifestLoaded);

        self.conflicts = ConflictReport::detect(
            self.runtime,
            &manifest,
            self.services,
            self.config,
            temp_dir,
        );
        if !self.conflicts.is_empty() {
            warn!(
                "{}: {} macro, {} template, {} stylesheet conflict(s), {} unsecure file(s)",
                manifest.name,
                self.conflicts.conflicting_macros.len(),
                self.conflicts.conflicting_templates.len(),
                self.conflicts.conflicting_stylesheets.len(),
                self.conflicts.unsecure_files.len()
            );
        }
        self.manifest = Some(manifest);
        self.advance(InstallStage::ConflictsDetected);
        Ok(())
    }

    /// Create and save the ledger entry describing this package. Returns its id.
    ///
    /// `package_guid` defaults to the extraction directory name.
    #[tracing::instrument(skip(self))]
    pub fn create_ledger(
        &mut self,
        package_guid: Option<&str>,
        repository_guid: Option<&str>,
    ) -> Result<i64> {
        let manifest = self.manifest.as_ref().ok_or_else(not_loaded)?;
        let package_guid = match package_guid {
            Some(guid) => guid.to_string(),
            None => self
                .temp_dir
                .as_deref()
                .and_then(|d| d.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let mut ledger = self.store.make_new(&manifest.name)?;
        ledger.author = manifest.author.clone();
        ledger.author_url = manifest.author_url.clone();
        ledger.set_version(&manifest.version);
        ledger.url = manifest.url.clone();
        ledger.readme = manifest.readme.clone().unwrap_or_default();
        ledger.license = manifest.license.clone();
        ledger.license_url = manifest.license_url.clone();
        ledger.package_guid = package_guid;
        ledger.repository_guid = repository_guid.unwrap_or_default().to_string();
        ledger.enable_skins = manifest.enable_skins;
        ledger.skin_repository_guid = manifest.skin_repository.clone().unwrap_or_default();
        ledger.user_id = self.config.user_id;
        self.store.save(&ledger)?;

        info!("Installing {} {} as #{}", ledger.name, ledger.version, ledger.id);
        self.advance(InstallStage::LedgerCreated);
        Ok(ledger.id)
    }

    /// Move the payload files into place. Per-file failures are returned, not raised.
    #[tracing::instrument(skip(self))]
    pub fn install_files(&mut self, ledger_id: i64) -> Result<Vec<FileFailure>> {
        let manifest = self.manifest.as_ref().ok_or_else(not_loaded)?;
        let temp_dir = self.temp_dir.as_deref().ok_or_else(not_loaded)?;
        let mut ledger = self.load_ledger(ledger_id)?;

        let failures = install_files(
            self.runtime,
            self.config,
            temp_dir,
            &manifest.files,
            &mut ledger,
        );
        self.store.save(&ledger)?;

        self.advance(InstallStage::FilesInstalled);
        Ok(failures)
    }

    /// Import the manifest's artifacts, then run its install-time actions.
    #[tracing::instrument(skip(self))]
    pub fn install_business_logic(&mut self, ledger_id: i64) -> Result<Vec<ActionOutcome>> {
        let manifest = self.manifest.as_ref().ok_or_else(not_loaded)?;
        let mut ledger = self.load_ledger(ledger_id)?;

        import_artifacts(
            manifest,
            self.services,
            self.store,
            self.config.user_id,
            &mut ledger,
        )?;
        self.stage = InstallStage::ArtifactsImported;

        let ctx = ActionContext {
            package_name: &manifest.name,
            services: self.services,
        };
        let outcomes = run_actions(self.actions, &ctx, &manifest.actions, &mut ledger);
        self.store.save(&ledger)?;

        self.advance(InstallStage::ActionsRun);
        Ok(outcomes)
    }

    /// Remove the extraction directory. Safe to call more than once.
    ///
    /// Only a directory this installer unpacked, or one directly inside the
    /// data directory, is removed; anything else is left in place.
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(temp_dir) = &self.temp_dir {
            if self.unpacked_here || is_extraction_dir(self.config, temp_dir) {
                install_cleanup(self.runtime, temp_dir)?;
            } else {
                debug!("Leaving {:?}; it is not an extraction directory", temp_dir);
            }
        }
        if let Some(guard) = self.cleanup_guard.take() {
            guard.success();
        }
        self.advance(InstallStage::CleanedUp);
        Ok(())
    }

    /// Install a package archive from start to finish.
    ///
    /// The extraction directory is removed whether or not the install succeeds.
    pub fn install(
        &mut self,
        file: &Path,
        package_guid: Option<&str>,
        repository_guid: Option<&str>,
    ) -> Result<InstallReport> {
        let result = self
            .import(file)
            .and_then(|_| self.install_imported(package_guid, repository_guid));
        self.finish(result)
    }

    /// Install a package that has already been extracted to `temp_dir`.
    ///
    /// The directory is removed afterwards only when it sits directly inside
    /// the data directory and its manifest loaded.
    pub fn install_extracted(
        &mut self,
        temp_dir: &Path,
        package_guid: Option<&str>,
        repository_guid: Option<&str>,
    ) -> Result<InstallReport> {
        self.advance(InstallStage::Extracted);
        let result = self
            .load_manifest(temp_dir)
            .and_then(|_| self.install_imported(package_guid, repository_guid));
        self.finish(result)
    }

    fn install_imported(
        &mut self,
        package_guid: Option<&str>,
        repository_guid: Option<&str>,
    ) -> Result<InstallReport> {
        let ledger_id = self.create_ledger(package_guid, repository_guid)?;
        let file_failures = self.install_files(ledger_id)?;
        let actions = self.install_business_logic(ledger_id)?;
        let ledger = self.load_ledger(ledger_id)?;

        Ok(InstallReport {
            ledger_id,
            package_name: ledger.name,
            conflicts: self.conflicts.clone(),
            installed_files: ledger.files,
            file_failures,
            actions,
        })
    }

    fn finish(&mut self, result: Result<InstallReport>) -> Result<InstallReport> {
        let cleaned = self.cleanup();
        match (result, cleaned) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                warn!("Cleanup after failed install also failed: {:#}", cleanup_err);
                Err(e)
            }
        }
    }

    fn load_ledger(&self, id: i64) -> Result<InstalledPackage> {
        self.store
            .get_by_id(id)?
            .ok_or_else(|| anyhow!("No ledger entry with id {}", id))
    }

    fn track(&mut self, temp_dir: PathBuf) {
        if let Some(ctx) = &self.cleanup_ctx {
            self.cleanup_guard = Some(CleanupGuard::new(Arc::clone(ctx), temp_dir));
        }
    }

    fn advance(&mut self, stage: InstallStage) {
        debug!("Install stage: {}", stage);
        self.stage = stage;
    }
}

fn not_loaded() -> anyhow::Error {
    anyhow!("No package manifest loaded; import or load a package first")
}
