use anyhow::Result;
use reqwest::Client;
use std::path::PathBuf;

use crate::{http::HttpClient, install::InstallerConfig, runtime::Runtime};

/// User agent sent to package repositories.
pub const USER_AGENT: &str = concat!("umbpack/", env!("UMBPACK_VERSION"));

/// Everything a command needs: the runtime, resolved directories and an HTTP client.
pub struct Config<R: Runtime> {
    pub runtime: R,
    pub installer: InstallerConfig,
    pub http_client: HttpClient,
}

impl<R: Runtime> Config<R> {
    pub fn new(
        runtime: R,
        app_root: Option<PathBuf>,
        data_dir: Option<PathBuf>,
        repository_url: Option<String>,
    ) -> Result<Self> {
        let mut installer = InstallerConfig::from_env(&runtime, app_root, data_dir)?;
        if let Some(url) = repository_url {
            installer = installer.with_repository_url(url);
        }

        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            runtime,
            installer,
            http_client: HttpClient::new(client),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockito::{Matcher, Server};

    fn runtime_without_env() -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(|_| Err(std::env::VarError::NotPresent));
        runtime
            .expect_current_dir()
            .returning(|| Ok(PathBuf::from("/site")));
        runtime
    }

    #[tokio::test]
    async fn test_config_sends_user_agent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("User-Agent", Matcher::Regex("^umbpack/".to_string()))
            .create_async()
            .await;

        let config = Config::new(runtime_without_env(), None, None, None).unwrap();
        let _ = config.http_client.inner().get(server.url()).send().await;

        mock.assert_async().await;
    }

    #[test]
    fn test_config_repository_flag_overrides_env() {
        let config = Config::new(
            runtime_without_env(),
            None,
            Some(PathBuf::from("/var/umb")),
            Some("http://packages.example.com".to_string()),
        )
        .unwrap();

        assert_eq!(config.installer.app_root, PathBuf::from("/site"));
        assert_eq!(config.installer.data_dir, PathBuf::from("/var/umb"));
        assert_eq!(
            config.installer.repository_url.as_deref(),
            Some("http://packages.example.com")
        );
    }
}
