//! Fetching package archives from a repository server.

use anyhow::{Context, Result, bail};
use log::info;
use std::path::PathBuf;
use uuid::Uuid;

use crate::archive::PACKAGE_EXTENSION;
use crate::http::HttpClient;
use crate::install::InstallerConfig;
use crate::runtime::Runtime;

/// Downloads packages by GUID into the packages directory.
pub struct PackageFetcher<'a, R: Runtime> {
    runtime: &'a R,
    http_client: &'a HttpClient,
    config: &'a InstallerConfig,
}

impl<'a, R: Runtime> PackageFetcher<'a, R> {
    pub fn new(runtime: &'a R, http_client: &'a HttpClient, config: &'a InstallerConfig) -> Self {
        Self {
            runtime,
            http_client,
            config,
        }
    }

    /// Download `<repository>/fetch?package=<guid>` to `<data_dir>/packages/<guid>.umb`.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, package_guid: &str) -> Result<PathBuf> {
        let Some(repository) = self.config.repository_url.as_deref() else {
            bail!("No package repository configured");
        };
        let guid = Uuid::parse_str(package_guid)
            .with_context(|| format!("'{}' is not a package GUID", package_guid))?;

        let url = fetch_url(repository, &guid);
        let packages_dir = self.config.packages_dir();
        self.runtime
            .create_dir_all(&packages_dir)
            .with_context(|| format!("Failed to create {:?}", packages_dir))?;

        let dest = packages_dir.join(format!("{}.{}", guid, PACKAGE_EXTENSION));
        info!("Fetching package {} from {}...", guid, repository);
        let bytes = self
            .http_client
            .download_file(&url, || {
                self.runtime
                    .create_file(&dest)
                    .with_context(|| format!("Failed to create {:?}", dest))
            })
            .await
            .with_context(|| format!("Failed to fetch package {}", guid))?;

        info!("Fetched {} bytes to {:?}", bytes, dest);
        Ok(dest)
    }
}

fn fetch_url(repository: &str, guid: &Uuid) -> String {
    format!("{}/fetch?package={}", repository.trim_end_matches('/'), guid)
}
