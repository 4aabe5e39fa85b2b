use anyhow::{Context, Result, bail};
use log::{debug, warn};
use std::path::Path;

use crate::archive::flat_name;
use crate::ledger::InstalledPackage;
use crate::manifest::FileDescriptor;
use crate::runtime::{Runtime, is_path_under};

use super::config::InstallerConfig;
use super::report::FileFailure;

/// Move every payload file from `temp_dir` into the application root.
///
/// Files are handled one at a time; a failure is logged and returned, and
/// the remaining files are still installed. Each installed file is appended
/// to the ledger as `orgPath/orgName`.
#[tracing::instrument(skip_all, fields(count = files.len()))]
pub fn install_files<R: Runtime>(
    runtime: &R,
    config: &InstallerConfig,
    temp_dir: &Path,
    files: &[FileDescriptor],
    ledger: &mut InstalledPackage,
) -> Vec<FileFailure> {
    let mut failures = Vec::new();

    for file in files {
        match install_file(runtime, config, temp_dir, file) {
            Ok(()) => ledger.files.push(file.ledger_path()),
            Err(e) => {
                warn!("Failed to install {}: {:#}", file.ledger_path(), e);
                failures.push(FileFailure {
                    path: file.ledger_path(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    failures
}

fn install_file<R: Runtime>(
    runtime: &R,
    config: &InstallerConfig,
    temp_dir: &Path,
    file: &FileDescriptor,
) -> Result<()> {
    if file.guid.is_empty() || file.org_name.is_empty() {
        bail!("file node needs both a guid and an orgName");
    }

    // Payload files sit flat in the extraction directory.
    if flat_name(&file.guid) != Some(file.guid.as_str()) {
        bail!("file guid {:?} is not a plain file name", file.guid);
    }

    let dest_dir = config.resolve_dir(&file.org_path);
    let dest_file = config.resolve_file(&file.org_path, &file.org_name);
    let source = temp_dir.join(&file.guid);

    if !is_path_under(&dest_file, &config.app_root) {
        bail!(
            "destination {:?} is outside the application root {:?}",
            dest_file,
            config.app_root
        );
    }

    if !runtime.exists(&dest_dir) {
        runtime.create_dir_all(&dest_dir)?;
    } else if runtime.exists(&dest_file) {
        runtime
            .remove_file(&dest_file)
            .with_context(|| format!("Failed to replace {:?}", dest_file))?;
    }

    debug!("Installing {:?} -> {:?}", source, dest_file);
    move_file(runtime, &source, &dest_file)
}

/// Rename, or copy and delete when the two paths are on different file systems.
fn move_file<R: Runtime>(runtime: &R, from: &Path, to: &Path) -> Result<()> {
    if runtime.rename(from, to).is_ok() {
        return Ok(());
    }
    runtime
        .copy(from, to)
        .with_context(|| format!("Failed to move {:?} to {:?}", from, to))?;
    runtime.remove_file(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use anyhow::anyhow;
    use mockall::predicate::eq;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn descriptor(guid: &str, org_path: &str, org_name: &str) -> FileDescriptor {
        FileDescriptor {
            guid: guid.into(),
            org_path: org_path.into(),
            org_name: org_name.into(),
        }
    }

    #[test]
    fn test_no_files_is_a_no_op() {
        let runtime = MockRuntime::new();
        let config = InstallerConfig::new(PathBuf::from("/srv/site"));
        let mut ledger = InstalledPackage::default();

        let failures = install_files(&runtime, &config, Path::new("/tmp/pkg"), &[], &mut ledger);
        assert!(failures.is_empty());
        assert!(ledger.files.is_empty());
    }

    #[test]
    fn test_install_moves_file_and_records_it() {
        let site = tempdir().unwrap();
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("abc123"), "payload").unwrap();

        let config = InstallerConfig::new(site.path().to_path_buf());
        let mut ledger = InstalledPackage::default();
        let failures = install_files(
            &RealRuntime,
            &config,
            temp.path(),
            &[descriptor("abc123", "/media", "test.txt")],
            &mut ledger,
        );

        assert!(failures.is_empty());
        assert_eq!(ledger.files, vec!["/media/test.txt"]);
        assert_eq!(
            fs::read_to_string(site.path().join("media/test.txt")).unwrap(),
            "payload"
        );
        assert!(!temp.path().join("abc123").exists());
    }

    #[test]
    fn test_existing_destination_is_overwritten() {
        let site = tempdir().unwrap();
        let temp = tempdir().unwrap();
        fs::create_dir_all(site.path().join("media")).unwrap();
        fs::write(site.path().join("media/test.txt"), "old").unwrap();
        fs::write(temp.path().join("abc123"), "new").unwrap();

        let config = InstallerConfig::new(site.path().to_path_buf());
        let mut ledger = InstalledPackage::default();
        let failures = install_files(
            &RealRuntime,
            &config,
            temp.path(),
            &[descriptor("abc123", "/media", "test.txt")],
            &mut ledger,
        );

        assert!(failures.is_empty());
        assert_eq!(
            fs::read_to_string(site.path().join("media/test.txt")).unwrap(),
            "new"
        );
    }

    #[test_log::test]
    fn test_one_failure_does_not_stop_the_rest() {
        let site = tempdir().unwrap();
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("g2"), "second").unwrap();

        let config = InstallerConfig::new(site.path().to_path_buf());
        let mut ledger = InstalledPackage::default();
        let failures = install_files(
            &RealRuntime,
            &config,
            temp.path(),
            &[
                descriptor("missing", "/bin", "Gone.dll"),
                descriptor("g2", "/css", "site.css"),
            ],
            &mut ledger,
        );

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, "/bin/Gone.dll");
        assert_eq!(ledger.files, vec!["/css/site.css"]);
        assert!(site.path().join("css/site.css").exists());
    }

    #[test]
    fn test_destination_outside_app_root_is_refused() {
        let runtime = MockRuntime::new();
        let config = InstallerConfig::new(PathBuf::from("/srv/site"));
        let mut ledger = InstalledPackage::default();

        let failures = install_files(
            &runtime,
            &config,
            Path::new("/tmp/pkg"),
            &[descriptor("g1", "/../../etc", "passwd")],
            &mut ledger,
        );

        assert_eq!(failures.len(), 1);
        assert!(failures[0].reason.contains("outside the application root"));
        assert!(ledger.files.is_empty());
    }

    #[test]
    fn test_guid_outside_extraction_dir_is_refused() {
        let site = tempdir().unwrap();
        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let secret = outside.path().join("secret.txt");
        fs::write(&secret, "secret").unwrap();

        let config = InstallerConfig::new(site.path().to_path_buf());
        let mut ledger = InstalledPackage::default();
        let failures = install_files(
            &RealRuntime,
            &config,
            temp.path(),
            &[
                descriptor(&secret.to_string_lossy(), "/media", "leak.txt"),
                descriptor("../secret.txt", "/media", "leak2.txt"),
                descriptor("..", "/media", "leak3.txt"),
            ],
            &mut ledger,
        );

        assert_eq!(failures.len(), 3);
        assert!(
            failures
                .iter()
                .all(|f| f.reason.contains("not a plain file name"))
        );
        assert!(ledger.files.is_empty());
        assert_eq!(fs::read_to_string(&secret).unwrap(), "secret");
        assert!(!site.path().join("media/leak.txt").exists());
    }

    #[test]
    fn test_rename_falls_back_to_copy() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_remove_file()
            .with(eq(PathBuf::from("/srv/site/media/a.txt")))
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_rename()
            .returning(|_, _| Err(anyhow!("cross-device link")));
        runtime
            .expect_copy()
            .with(
                eq(PathBuf::from("/tmp/pkg/g1")),
                eq(PathBuf::from("/srv/site/media/a.txt")),
            )
            .times(1)
            .returning(|_, _| Ok(7));
        runtime
            .expect_remove_file()
            .with(eq(PathBuf::from("/tmp/pkg/g1")))
            .times(1)
            .returning(|_| Ok(()));

        let config = InstallerConfig::new(PathBuf::from("/srv/site"));
        let mut ledger = InstalledPackage::default();
        let failures = install_files(
            &runtime,
            &config,
            Path::new("/tmp/pkg"),
            &[descriptor("g1", "/media", "a.txt")],
            &mut ledger,
        );

        assert!(failures.is_empty());
        assert_eq!(ledger.files, vec!["/media/a.txt"]);
    }
}
