use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use umbpack::commands::{self, Config};

/// umbpack - package installer for Umbraco sites
///
/// Unpacks `.umb` packages, reports conflicts with what the site already has,
/// copies their files into the site and records everything in the
/// installation ledger.
///
/// Examples:
///   umbpack inspect blog.umb          # Show what a package contains
///   umbpack install blog.umb          # Install a package
///   umbpack fetch <GUID> --install    # Download from a repository and install
#[derive(Parser, Debug)]
#[command(author, version = env!("UMBPACK_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Site root that package file paths are relative to (defaults to the current directory)
    #[arg(
        long = "app-root",
        env = "UMBPACK_APP_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub app_root: Option<PathBuf>,

    /// Directory holding the ledger, catalog and extracted packages (defaults to <app-root>/App_Data)
    #[arg(
        long = "data-dir",
        env = "UMBPACK_DATA_DIR",
        value_name = "PATH",
        global = true
    )]
    pub data_dir: Option<PathBuf>,

    /// Package repository base URL
    #[arg(
        long = "repository",
        env = "UMBPACK_REPOSITORY_URL",
        value_name = "URL",
        global = true
    )]
    pub repository_url: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Download a package from the repository by GUID
    Fetch(FetchArgs),

    /// Unpack a package and show its contents and conflicts without installing
    Inspect(InspectArgs),

    /// Install a package archive or an extracted package directory
    Install(InstallArgs),

    /// List installed packages
    List(ListArgs),

    /// Remove an extracted package directory
    Cleanup(CleanupArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Package GUID
    #[arg(value_name = "GUID")]
    pub guid: String,

    /// Install the package once it is downloaded
    #[arg(long)]
    pub install: bool,

    /// Repository GUID to record in the ledger
    #[arg(long = "repository-guid", value_name = "GUID")]
    pub repository_guid: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// A `.umb` archive or an extracted package directory
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// A `.umb` archive or an extracted package directory
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Package GUID to record in the ledger (defaults to the extraction directory name)
    #[arg(long = "package-guid", value_name = "GUID")]
    pub package_guid: Option<String>,

    /// Repository GUID to record in the ledger
    #[arg(long = "repository-guid", value_name = "GUID")]
    pub repository_guid: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Include packages marked as uninstalled
    #[arg(long, short = 'a')]
    pub all: bool,
}

#[derive(clap::Args, Debug)]
pub struct CleanupArgs {
    /// The extracted package directory
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let config = Config::new(
        umbpack::runtime::RealRuntime,
        cli.app_root,
        cli.data_dir,
        cli.repository_url,
    )?;

    match cli.command {
        Commands::Fetch(args) => {
            commands::fetch(
                &config,
                &args.guid,
                args.repository_guid.as_deref(),
                args.install,
            )
            .await?
        }
        Commands::Inspect(args) => commands::inspect(&config, &args.package)?,
        Commands::Install(args) => {
            commands::install(
                &config,
                &args.package,
                args.package_guid.as_deref(),
                args.repository_guid.as_deref(),
            )
            .await?
        }
        Commands::List(args) => commands::list(&config, args.all)?,
        Commands::Cleanup(args) => commands::cleanup(&config, &args.dir)?,
    }
    Ok(())
}
