use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use crate::runtime::{Runtime, path::combine_path};

pub const APP_ROOT_ENV: &str = "UMBPACK_APP_ROOT";
pub const DATA_DIR_ENV: &str = "UMBPACK_DATA_DIR";
pub const REPOSITORY_URL_ENV: &str = "UMBPACK_REPOSITORY_URL";

/// Where the well-known CMS folders live, relative to the application root.
///
/// Manifest paths may start with a placeholder such as `[$UMBRACO]`, which is
/// replaced by the matching entry here.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemDirectories {
    pub umbraco: String,
    pub umbraco_client: String,
    pub config: String,
    pub data: String,
}

impl Default for SystemDirectories {
    fn default() -> Self {
        Self {
            umbraco: "/umbraco".into(),
            umbraco_client: "/umbraco_client".into(),
            config: "/config".into(),
            data: "/App_Data".into(),
        }
    }
}

impl SystemDirectories {
    /// Replace placeholders and make the path rooted at `/`.
    pub fn expand(&self, path: &str) -> String {
        // [$UMBRACOCLIENT] first: [$UMBRACO] is a prefix of it
        let expanded = path
            .replace("[$UMBRACOCLIENT]", &self.umbraco_client)
            .replace("[$UMBRACO]", &self.umbraco)
            .replace("[$CONFIG]", &self.config)
            .replace("[$DATA]", &self.data);

        if expanded.starts_with('/') || expanded.starts_with('\\') {
            expanded
        } else {
            format!("/{}", expanded)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallerConfig {
    /// Physical root of the CMS application; files are installed below it.
    pub app_root: PathBuf,
    /// Holds extracted packages, fetched archives, the ledger and the catalog.
    pub data_dir: PathBuf,
    pub system_dirs: SystemDirectories,
    pub user_id: i64,
    pub repository_url: Option<String>,
}

impl InstallerConfig {
    pub fn new(app_root: PathBuf) -> Self {
        let data_dir = app_root.join("App_Data");
        Self {
            app_root,
            data_dir,
            system_dirs: SystemDirectories::default(),
            user_id: 0,
            repository_url: None,
        }
    }

    /// Build from explicit values, falling back to the environment and then to defaults.
    ///
    /// The application root defaults to the current directory and the data
    /// directory to `<app root>/App_Data`.
    pub fn from_env<R: Runtime>(
        runtime: &R,
        app_root: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let app_root = app_root.or_else(|| runtime.env_var(APP_ROOT_ENV).ok().map(PathBuf::from));
        let app_root = match app_root {
            Some(root) => root,
            None => runtime.current_dir()?,
        };
        let data_dir = data_dir
            .or_else(|| runtime.env_var(DATA_DIR_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| app_root.join("App_Data"));
        let repository_url = runtime
            .env_var(REPOSITORY_URL_ENV)
            .ok()
            .filter(|url| !url.is_empty());

        debug!(
            "Using app root {:?} and data dir {:?}",
            app_root, data_dir
        );

        Ok(Self {
            app_root,
            data_dir,
            system_dirs: SystemDirectories::default(),
            user_id: 0,
            repository_url,
        })
    }

    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    pub fn with_repository_url(mut self, url: impl Into<String>) -> Self {
        self.repository_url = Some(url.into());
        self
    }

    /// Physical directory a manifest `orgPath` refers to.
    pub fn resolve_dir(&self, org_path: &str) -> PathBuf {
        combine_path(&self.app_root, &self.system_dirs.expand(org_path))
    }

    /// Physical path of `org_name` inside the directory `org_path` refers to.
    pub fn resolve_file(&self, org_path: &str, org_name: &str) -> PathBuf {
        combine_path(&self.resolve_dir(org_path), org_name)
    }

    /// Directory fetched archives are stored in.
    pub fn packages_dir(&self) -> PathBuf {
        self.data_dir.join("packages")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use std::env::VarError;

    #[test]
    fn test_expand_placeholders() {
        let dirs = SystemDirectories::default();
        assert_eq!(dirs.expand("[$UMBRACO]/plugins"), "/umbraco/plugins");
        assert_eq!(dirs.expand("[$UMBRACOCLIENT]/ui"), "/umbraco_client/ui");
        assert_eq!(dirs.expand("[$CONFIG]"), "/config");
        assert_eq!(dirs.expand("[$DATA]/packages"), "/App_Data/packages");
        assert_eq!(dirs.expand("media"), "/media");
        assert_eq!(dirs.expand("/media"), "/media");
    }

    #[test]
    fn test_resolve_file() {
        let config = InstallerConfig::new(PathBuf::from("/srv/site"));
        assert_eq!(
            config.resolve_file("/media", "test.txt"),
            PathBuf::from("/srv/site/media/test.txt")
        );
        assert_eq!(
            config.resolve_file("[$UMBRACO]\\plugins\\", "x.js"),
            PathBuf::from("/srv/site/umbraco/plugins/x.js")
        );
        assert_eq!(
            config.resolve_dir("/"),
            PathBuf::from("/srv/site")
        );
    }

    #[test]
    fn test_from_env_explicit_values_win() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(|key| match key {
                APP_ROOT_ENV => Ok("/env/site".into()),
                DATA_DIR_ENV => Ok("/env/data".into()),
                _ => Err(VarError::NotPresent),
            });

        let config = InstallerConfig::from_env(
            &runtime,
            Some(PathBuf::from("/srv/site")),
            Some(PathBuf::from("/srv/data")),
        )
        .unwrap();
        assert_eq!(config.app_root, PathBuf::from("/srv/site"));
        assert_eq!(config.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.repository_url, None);
    }

    #[test]
    fn test_from_env_reads_environment() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(|key| match key {
                APP_ROOT_ENV => Ok("/env/site".into()),
                REPOSITORY_URL_ENV => Ok("http://repo.example.com".into()),
                _ => Err(VarError::NotPresent),
            });

        let config = InstallerConfig::from_env(&runtime, None, None).unwrap();
        assert_eq!(config.app_root, PathBuf::from("/env/site"));
        assert_eq!(config.data_dir, PathBuf::from("/env/site/App_Data"));
        assert_eq!(
            config.repository_url.as_deref(),
            Some("http://repo.example.com")
        );
    }

    #[test]
    fn test_from_env_defaults_to_current_dir() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(|_| Err(VarError::NotPresent));
        runtime
            .expect_current_dir()
            .returning(|| Ok(PathBuf::from("/work")));

        let config = InstallerConfig::from_env(&runtime, None, None).unwrap();
        assert_eq!(config.app_root, PathBuf::from("/work"));
        assert_eq!(config.data_dir, PathBuf::from("/work/App_Data"));
        assert_eq!(config.packages_dir(), PathBuf::from("/work/App_Data/packages"));
    }
}
