use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use xcframework_builder::{
    BuildConfig, BuildOptions, Layout, Library, Orchestrator, Platform, SystemHost,
};

const PLATFORM_TOKEN: &str = "platform=";
const DEBUG_TOKEN: &str = "enable-debug";

#[derive(Parser, Debug)]
#[command(
    name = "xcframework-builder",
    version,
    about = "Cross-compile native libraries for Apple platforms and package xcframeworks"
)]
struct Cli {
    /// Positional tokens: `platform=<name>` (repeatable) and `enable-debug`
    #[arg(value_name = "TOKEN")]
    tokens: Vec<String>,

    /// Platform to build; repeat for several. Default: every platform
    #[arg(long = "platform", value_enum)]
    platforms: Vec<Platform>,

    /// Echo build-tool stdout and log at debug level
    #[arg(long)]
    enable_debug: bool,

    /// Build configuration (default: ./Build.toml if present, else built-in)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Library to build; repeat for several. Default: every buildable library
    #[arg(long = "library")]
    libraries: Vec<String>,

    /// Parallel build workers (default: available CPUs)
    #[arg(long)]
    jobs: Option<usize>,

    /// Working directory for checkouts and intermediate output
    #[arg(long, default_value = "Script")]
    work_dir: PathBuf,
}

/// Merge legacy positional tokens into the flag form.
fn apply_tokens(cli: &mut Cli) -> Result<()> {
    for token in std::mem::take(&mut cli.tokens) {
        if token == DEBUG_TOKEN {
            cli.enable_debug = true;
        } else if let Some(name) = token.strip_prefix(PLATFORM_TOKEN) {
            cli.platforms.push(name.parse()?);
        } else {
            bail!(
                "unrecognized argument '{}'; expected `{}<name>` or `{}`",
                token,
                PLATFORM_TOKEN,
                DEBUG_TOKEN
            );
        }
    }
    Ok(())
}

fn select_libraries<'c>(config: &'c BuildConfig, names: &[String]) -> Result<Vec<&'c Library>> {
    if names.is_empty() {
        let libraries = config.default_libraries();
        if libraries.is_empty() {
            bail!("no library has `build = true`; pass --library <name>");
        }
        return Ok(libraries);
    }
    names.iter().map(|name| config.library(name)).collect()
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();
    apply_tokens(&mut cli)?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.enable_debug { "debug" } else { "info" }),
    )
    .init();

    let config = BuildConfig::load_or_default(cli.config.as_deref(), Path::new("."))?;
    let libraries = select_libraries(&config, &cli.libraries)?;
    let options = BuildOptions {
        platforms: cli.platforms.clone(),
        jobs: cli.jobs,
    };

    let orchestrator = Orchestrator::new(&SystemHost, &config, Layout::new(&cli.work_dir), options);
    for report in orchestrator.run(&libraries)? {
        for package in &report.packages {
            log::info!(
                "[{}] {} ({} platform(s))",
                report.library,
                package.path.display(),
                package.platforms.len()
            );
        }
        if let Some(release) = &report.release {
            log::info!("[{}] release: {}", report.library, release.tarball.display());
        }
    }
    Ok(())
}
