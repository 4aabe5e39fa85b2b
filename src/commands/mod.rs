//! Command-line entry points. Each command resolves its paths, wires the
//! JSON-backed stores to a [`PackageInstaller`](crate::install::PackageInstaller)
//! and prints the outcome.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

mod cleanup;
pub mod config;
mod fetch;
mod inspect;
mod install;
mod list;

pub use cleanup::cleanup;
pub use config::Config;
pub use fetch::fetch;
pub use inspect::inspect;
pub use install::install;
pub use list::list;

/// Paths given on the command line are relative to the working directory.
fn resolve_path<R: Runtime>(runtime: &R, path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(runtime.current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    #[test]
    fn test_resolve_path() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_current_dir()
            .returning(|| Ok(PathBuf::from("/work")));

        assert_eq!(
            resolve_path(&runtime, Path::new("blog.umb")).unwrap(),
            PathBuf::from("/work/blog.umb")
        );
        assert_eq!(
            resolve_path(&runtime, Path::new("/tmp/blog.umb")).unwrap(),
            PathBuf::from("/tmp/blog.umb")
        );
    }
}
