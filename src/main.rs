use anyhow::Result;
use clap::Parser;
use pkgctl::commands;
use pkgctl::config::{Config, ConfigOptions};
use pkgctl::package::VersionPart;
use std::path::PathBuf;
use std::sync::Arc;

/// pkgctl - Package Metadata Controller
///
/// Bump versions of embedded packages and switch package sources between the
/// registry, local directories and embedded copies, keeping the project's
/// dependency manifest byte-for-byte intact outside the edited values.
///
/// Examples:
///   pkgctl list                                  # Show packages and their state
///   pkgctl increment com.acme.foo minor          # 1.2.3 -> 1.3.0
///   pkgctl override com.acme.foo ../foo --apply  # Use a local checkout
#[derive(Parser, Debug)]
#[command(author, version = env!("PKGCTL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root directory (defaults to the current directory; also via PKGCTL_PROJECT)
    #[arg(
        long,
        short = 'p',
        env = "PKGCTL_PROJECT",
        value_name = "DIR",
        global = true
    )]
    project: Option<PathBuf>,

    /// Override settings file (defaults to UserSettings/PackageOverrides.json)
    #[arg(long, env = "PKGCTL_SETTINGS", value_name = "FILE", global = true)]
    settings: Option<PathBuf>,

    /// Package cache directory (defaults to Library/PackageCache)
    #[arg(long = "cache-dir", env = "PKGCTL_CACHE_DIR", value_name = "DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Shell command that re-resolves dependencies after a change
    #[arg(
        long = "resolve-command",
        env = "PKGCTL_RESOLVE_COMMAND",
        value_name = "CMD",
        global = true
    )]
    resolve_command: Option<String>,

    /// Seconds to wait for package operations
    #[arg(long, value_name = "SECS", default_value_t = 30, global = true)]
    timeout: u64,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', visible_alias = "force", global = true)]
    yes: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List packages and their source state
    List(ListArgs),

    /// Bump the version of an embedded package
    Increment(IncrementArgs),

    /// Source a package from a local directory
    Override(OverrideArgs),

    /// Return a package to its original source
    Unoverride(UnoverrideArgs),

    /// Copy a package into the project's Packages directory
    Embed(PackageArgs),

    /// Delete the embedded copy of a package
    RemoveEmbedded(PackageArgs),

    /// Re-enable a disabled embedded package
    EnableEmbedded(PackageArgs),

    /// Disable an embedded package without deleting it
    DisableEmbedded(PackageArgs),

    /// Write a registry version for a package into the manifest
    SetSourceVersion(SetSourceVersionArgs),

    /// Rewrite manifest sources to match the override settings
    Apply,
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    /// Only show packages whose name or display name contains TEXT (case-insensitive)
    #[arg(long, value_name = "TEXT")]
    filter: Option<String>,

    /// Only show embedded packages, with their next versions
    #[arg(long)]
    embedded: bool,
}

#[derive(clap::Args, Debug)]
struct IncrementArgs {
    /// Package name, e.g. com.acme.foo
    package: String,

    /// Version component to bump
    #[arg(value_name = "major|minor|patch")]
    part: VersionPart,
}

#[derive(clap::Args, Debug)]
struct OverrideArgs {
    /// Package name
    package: String,

    /// Local directory containing the package
    path: String,

    /// Update the manifest right away
    #[arg(long)]
    apply: bool,
}

#[derive(clap::Args, Debug)]
struct UnoverrideArgs {
    /// Package name
    package: String,

    /// Update the manifest right away
    #[arg(long)]
    apply: bool,
}

#[derive(clap::Args, Debug)]
struct PackageArgs {
    /// Package name
    package: String,
}

#[derive(clap::Args, Debug)]
struct SetSourceVersionArgs {
    /// Package name
    package: String,

    /// Version to declare in the manifest, e.g. 1.4.0
    version: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = Arc::new(pkgctl::runtime::RealRuntime);

    let config = Config::new(
        runtime.as_ref(),
        ConfigOptions {
            project: cli.project,
            settings: cli.settings,
            cache_dir: cli.cache_dir,
            resolve_command: cli.resolve_command,
            timeout_secs: Some(cli.timeout),
            yes: cli.yes,
        },
    )?;

    match cli.command {
        Commands::List(args) => {
            commands::list(runtime, &config, args.filter.as_deref(), args.embedded).await?
        }
        Commands::Increment(args) => {
            commands::increment(runtime, &config, &args.package, args.part).await?
        }
        Commands::Override(args) => {
            commands::set_override(runtime, &config, &args.package, &args.path, args.apply).await?
        }
        Commands::Unoverride(args) => {
            commands::clear_override(runtime, &config, &args.package, args.apply).await?
        }
        Commands::Embed(args) => commands::embed(runtime, &config, &args.package).await?,
        Commands::RemoveEmbedded(args) => {
            commands::remove_embedded(runtime, &config, &args.package).await?
        }
        Commands::EnableEmbedded(args) => {
            commands::enable_embedded(runtime, &config, &args.package).await?
        }
        Commands::DisableEmbedded(args) => {
            commands::disable_embedded(runtime, &config, &args.package).await?
        }
        Commands::SetSourceVersion(args) => {
            commands::set_source_version(runtime, &config, &args.package, &args.version).await?
        }
        Commands::Apply => commands::apply(runtime, &config).await?,
    }
    Ok(())
}
