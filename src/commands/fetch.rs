use anyhow::Result;

use crate::{download::PackageFetcher, runtime::Runtime};

use super::{config::Config, install::install};

/// Download a package by GUID, and install it straight away if asked to.
#[tracing::instrument(skip(config))]
pub async fn fetch<R: Runtime>(
    config: &Config<R>,
    package_guid: &str,
    repository_guid: Option<&str>,
    and_install: bool,
) -> Result<()> {
    let fetcher = PackageFetcher::new(&config.runtime, &config.http_client, &config.installer);
    let archive = fetcher.fetch(package_guid).await?;

    if and_install {
        install(config, &archive, Some(package_guid), repository_guid).await
    } else {
        println!("Fetched {}", archive.display());
        Ok(())
    }
}
