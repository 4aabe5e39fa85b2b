use anyhow::{Result, bail};
use std::path::Path;

use crate::{
    install::{install_cleanup, is_extraction_dir},
    runtime::{Runtime, normalize_path},
};

use super::{config::Config, resolve_path};

/// Discard an extraction directory left behind by `inspect`.
///
/// Only directories directly inside the data directory are accepted.
#[tracing::instrument(skip(config))]
pub fn cleanup<R: Runtime>(config: &Config<R>, dir: &Path) -> Result<()> {
    let runtime = &config.runtime;
    let path = normalize_path(&resolve_path(runtime, dir)?);

    if !is_extraction_dir(&config.installer, &path) || !runtime.is_dir(&path) {
        bail!(
            "{} is not an extracted package directory in {}",
            path.display(),
            normalize_path(&config.installer.data_dir).display()
        );
    }
    install_cleanup(runtime, &path)?;
    println!("Removed {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpClient;
    use crate::install::InstallerConfig;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    fn config(runtime: MockRuntime) -> Config<MockRuntime> {
        Config {
            runtime,
            installer: InstallerConfig::new(PathBuf::from("/site")),
            http_client: HttpClient::new(reqwest::Client::new()),
        }
    }

    #[test]
    fn test_cleanup_removes_extraction_dir() {
        let dir = PathBuf::from("/site/App_Data/0b3a8d1e");
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().with(eq(dir.clone())).returning(|_| true);
        runtime.expect_exists().with(eq(dir.clone())).returning(|_| true);
        runtime
            .expect_remove_dir_all()
            .with(eq(dir.clone()))
            .times(1)
            .returning(|_| Ok(()));

        cleanup(&config(runtime), &dir).unwrap();
    }

    #[test]
    fn test_cleanup_refuses_dirs_outside_data_dir() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| true);
        runtime.expect_remove_dir_all().never();

        let err = cleanup(&config(runtime), Path::new("/site/App_Data/../bin")).unwrap_err();
        assert!(err.to_string().contains("not an extracted package directory"));
    }
}
