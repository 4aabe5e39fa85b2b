//! Advisory checks run after the manifest is loaded.
//!
//! Nothing in here blocks an install. The report tells the caller which
//! macros, templates and stylesheets would collide with existing ones and
//! which payload files land in code or binary folders.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::install::config::InstallerConfig;
use crate::manifest::{FileDescriptor, PackageManifest};
use crate::runtime::Runtime;
use crate::services::Services;

const CODE_DIRS: [&str; 2] = ["app_code", "bin"];
const NATIVE_EXTENSIONS: [&str; 4] = ["dll", "exe", "so", "dylib"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictReport {
    /// Existing macro name -> alias in the package
    pub conflicting_macros: BTreeMap<String, String>,
    /// Existing template name -> alias in the package
    pub conflicting_templates: BTreeMap<String, String>,
    /// Existing stylesheet name -> name in the package
    pub conflicting_stylesheets: BTreeMap<String, String>,
    pub unsecure_files: Vec<String>,
    /// Flagged binaries that could not be inspected, as `name: reason`
    pub binary_file_errors: Vec<String>,
}

impl ConflictReport {
    #[tracing::instrument(skip_all, fields(package = %manifest.name))]
    pub fn detect<R: Runtime>(
        runtime: &R,
        manifest: &PackageManifest,
        services: Services<'_>,
        config: &InstallerConfig,
        temp_dir: &Path,
    ) -> Self {
        let mut report = Self::default();

        let flagged: Vec<&FileDescriptor> = manifest
            .files
            .iter()
            .filter(|f| is_unsecure(config, f))
            .collect();
        report.unsecure_files = flagged.iter().map(|f| f.org_name.clone()).collect();

        for file in flagged.iter().filter(|f| has_native_extension(&f.org_name)) {
            let source = temp_dir.join(&file.guid);
            if !runtime.exists(&source) {
                continue;
            }
            if let Err(e) = inspect_binary(runtime, &source) {
                debug!("Binary check failed for {}: {:#}", file.org_name, e);
                report
                    .binary_file_errors
                    .push(format!("{}: {:#}", file.org_name, e));
            }
        }

        for m in manifest.macros.iter().filter(|m| !m.alias.is_empty()) {
            match services.macros.get_by_alias(&m.alias) {
                Ok(Some(existing)) => {
                    report
                        .conflicting_macros
                        .entry(existing.name)
                        .or_insert_with(|| m.alias.clone());
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to look up macro '{}': {:#}", m.alias, e),
            }
        }

        for t in manifest.templates.iter().filter(|t| !t.alias.is_empty()) {
            match services.templates.get_by_alias(&t.alias) {
                Ok(Some(existing)) => {
                    report
                        .conflicting_templates
                        .entry(existing.name)
                        .or_insert_with(|| t.alias.clone());
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to look up template '{}': {:#}", t.alias, e),
            }
        }

        for s in manifest.stylesheets.iter().filter(|s| !s.name.is_empty()) {
            match services.stylesheets.get_by_name(&s.name) {
                Ok(Some(existing)) => {
                    report
                        .conflicting_stylesheets
                        .entry(existing.name)
                        .or_insert_with(|| s.name.clone());
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to look up stylesheet '{}': {:#}", s.name, e),
            }
        }

        report
    }

    pub fn contains_macro_conflict(&self) -> bool {
        !self.conflicting_macros.is_empty()
    }

    pub fn contains_template_conflicts(&self) -> bool {
        !self.conflicting_templates.is_empty()
    }

    pub fn contains_stylesheet_conflicts(&self) -> bool {
        !self.conflicting_stylesheets.is_empty()
    }

    pub fn contains_unsecure_files(&self) -> bool {
        !self.unsecure_files.is_empty()
    }

    pub fn contains_binary_file_errors(&self) -> bool {
        !self.binary_file_errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !(self.contains_macro_conflict()
            || self.contains_template_conflicts()
            || self.contains_stylesheet_conflicts()
            || self.contains_unsecure_files()
            || self.contains_binary_file_errors())
    }
}

/// Files going into a code folder, or native binaries anywhere.
fn is_unsecure(config: &InstallerConfig, file: &FileDescriptor) -> bool {
    let expanded = config.system_dirs.expand(&file.org_path).to_lowercase();
    let in_code_dir = expanded
        .split(['/', '\\'])
        .any(|segment| CODE_DIRS.contains(&segment));
    in_code_dir || has_native_extension(&file.org_name)
}

fn has_native_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| NATIVE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Parse the file header; anything goblin cannot recognise is an error.
fn inspect_binary<R: Runtime>(runtime: &R, path: &Path) -> Result<()> {
    let mut bytes = Vec::new();
    runtime
        .open(path)?
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read {:?}", path))?;

    match goblin::Object::parse(&bytes).context("not a valid binary")? {
        goblin::Object::Unknown(magic) => {
            anyhow::bail!("unrecognised binary format (magic {:#x})", magic)
        }
        _ => Ok(()),
    }
}
