//! Drives one library from source checkout to packaged xcframeworks.
//!
//! ```text
//! Pending -> Fetched -> Building (one task per target) -> Merging -> Packaged
//!                          \-> Aborted on the first failed target
//! ```
//!
//! Targets run on a bounded rayon pool. The first failure stops new targets
//! from being scheduled; subprocesses already running are left to finish.

use anyhow::{Context, Result};
use fs2::FileExt;
use rayon::prelude::*;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::adapter::{self, BuildContext, BuildSystemKind};
use crate::artifact::filesystem::remove_path;
use crate::config::{BuildConfig, Library};
use crate::error::BuildError;
use crate::layout::Layout;
use crate::merge::{Merger, Package};
use crate::preflight::{self, ToolInstaller};
use crate::process::{Cmd, Host};
use crate::release::{package_release, ReleaseArtifacts};
use crate::run_manifest::RunManifest;
use crate::target::{self, BuildTarget, Platform};
use crate::toolchain::{Resolver, XcrunLocator};

/// Per-invocation choices, usually from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Requested platforms; empty means all.
    pub platforms: Vec<Platform>,
    /// Worker count override; beats the config file.
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryState {
    Pending,
    Fetched,
    Building,
    Merging,
    Packaged,
    Aborted,
}

impl fmt::Display for LibraryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LibraryState::Pending => "pending",
            LibraryState::Fetched => "fetched",
            LibraryState::Building => "building",
            LibraryState::Merging => "merging",
            LibraryState::Packaged => "packaged",
            LibraryState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What a successful [`Orchestrator::build_all`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub library: String,
    pub build_system: BuildSystemKind,
    pub targets: Vec<BuildTarget>,
    pub packages: Vec<Package>,
    pub release: Option<ReleaseArtifacts>,
}

/// Exclusive lock on a work directory, released on drop.
#[derive(Debug)]
pub struct WorkDirLock {
    _file: File,
    path: PathBuf,
}

impl WorkDirLock {
    pub fn acquire(layout: &Layout) -> Result<Self> {
        let path = layout.lock_file();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to create lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            drop(file);
            return Err(anyhow::anyhow!(
                "Work directory is locked by another build: {}",
                path.display()
            ));
        }
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct Orchestrator<'a> {
    host: &'a dyn Host,
    config: &'a BuildConfig,
    layout: Layout,
    options: BuildOptions,
    tools: ToolInstaller,
    sdk: XcrunLocator<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        host: &'a dyn Host,
        config: &'a BuildConfig,
        layout: Layout,
        options: BuildOptions,
    ) -> Self {
        Self {
            host,
            config,
            layout,
            options,
            tools: ToolInstaller::default(),
            sdk: XcrunLocator::new(host),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Lock the work directory and build `libraries` in order.
    pub fn run(&self, libraries: &[&Library]) -> Result<Vec<BuildReport>> {
        fs::create_dir_all(self.layout.work_dir()).with_context(|| {
            format!(
                "creating work directory '{}'",
                self.layout.work_dir().display()
            )
        })?;
        let lock = WorkDirLock::acquire(&self.layout)?;
        log::debug!("holding {}", lock.path().display());

        let mut reports = Vec::with_capacity(libraries.len());
        for library in libraries {
            reports.push(self.build_all(library)?);
        }
        Ok(reports)
    }

    fn workers(&self, kind: BuildSystemKind) -> usize {
        if kind.builds_in_tree() {
            return 1;
        }
        self.options
            .jobs
            .or(self.config.jobs)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    fn transition(&self, library: &Library, state: &mut LibraryState, next: LibraryState) {
        log::info!("[{}] {} -> {}", library.name, state, next);
        *state = next;
    }

    /// Host tools every build needs, checked before any work starts.
    fn preflight(&self, library: &Library) -> Result<()> {
        if library.build_system == Some(BuildSystemKind::Cargo) {
            self.tools.ensure(self.host, &preflight::CARGO)?;
        }
        if !preflight::command_exists(self.host, preflight::BREW.command) {
            return Err(BuildError::MissingPrerequisite {
                tool: preflight::BREW.command.to_string(),
                hint: preflight::BREW.hint.to_string(),
            }
            .into());
        }
        preflight::check_required_tools(self.host, preflight::XCODE_TOOLS)?;
        self.tools.ensure(self.host, &preflight::GIT)?;
        self.tools.ensure(self.host, &preflight::PKG_CONFIG)?;
        Ok(())
    }

    /// Clone the pinned version unless a checkout already exists.
    fn fetch(&self, library: &Library) -> Result<()> {
        let checkout = self.layout.checkout_dir(library);
        if checkout.exists() {
            log::info!("[{}] using existing checkout {}", library.name, checkout.display());
            return Ok(());
        }
        log::info!("[{}] cloning {} at {}", library.name, library.url, library.version);
        self.host.execute(
            &Cmd::new("git")
                .args(["-c", "advice.detachedHead=false", "clone", "--depth", "1", "--branch"])
                .arg(library.version.as_str())
                .arg(library.url.as_str())
                .arg_path(&checkout)
                .dir(self.layout.work_dir())
                .log_to(&self.layout.prepare_log(&library.name))
                .scope(library.name.as_str()),
        )?;
        Ok(())
    }

    /// Remove stale output for the requested platforms only.
    fn clean(&self, library: &Library, platforms: &[Platform]) -> Result<()> {
        for platform in platforms {
            remove_path(&self.layout.platform_dir(&library.name, *platform))?;
        }
        Ok(())
    }

    /// Start this run's once-per-library logs empty.
    fn reset_library_logs(&self, library: &Library) -> Result<()> {
        for log in [
            self.layout.prepare_log(&library.name),
            self.layout.merge_log(&library.name),
        ] {
            truncate_log(&log)?;
        }
        Ok(())
    }

    fn context<'r>(
        &'r self,
        library: &'r Library,
        resolver: &'r Resolver<'_>,
        target: &'r BuildTarget,
    ) -> Result<BuildContext<'r>> {
        Ok(BuildContext {
            host: self.host,
            sdk: resolver.sdk(),
            library,
            target,
            source_dir: self.layout.source_dir(library),
            scratch_dir: self.layout.scratch_dir(target),
            prefix: self
                .layout
                .install_prefix(&target.library, target.platform, target.arch),
            log: self.layout.log_file(target),
            toolchain: resolver.resolve(target)?,
        })
    }

    fn build_target(
        &self,
        kind: BuildSystemKind,
        library: &Library,
        resolver: &Resolver<'_>,
        target: &BuildTarget,
    ) -> Result<()> {
        truncate_log(&self.layout.log_file(target))?;

        log::info!("[{target}] building");
        let ctx = self.context(library, resolver, target)?;
        adapter::build(kind, &ctx)?;
        log::info!("[{target}] installed into {}", ctx.prefix.display());
        Ok(())
    }

    /// Fetch, build every requested target, merge and package `library`.
    pub fn build_all(&self, library: &Library) -> Result<BuildReport> {
        let mut state = LibraryState::Pending;
        self.preflight(library)?;

        let platforms = target::requested_platforms(&self.options.platforms);
        let targets = target::enumerate(&library.name, &platforms);
        let mut manifest = RunManifest::started(
            &library.name,
            &library.version,
            &platforms,
            targets.iter().map(ToString::to_string).collect(),
        )?;
        let manifest_path = self.layout.manifest_path(&library.name);
        manifest.write(&manifest_path)?;

        let mut failed_target = None;
        let result = self.drive(library, &platforms, &targets, &mut state, &mut manifest, &mut failed_target);

        match result {
            Ok(report) => {
                manifest.finish_success(
                    report
                        .packages
                        .iter()
                        .map(|p| p.path.display().to_string())
                        .collect(),
                )?;
                manifest.write(&manifest_path)?;
                Ok(report)
            }
            Err(err) => {
                self.transition(library, &mut state, LibraryState::Aborted);
                manifest.finish_aborted(failed_target, &err)?;
                if let Err(write_err) = manifest.write(&manifest_path) {
                    log::warn!("[{}] {write_err:#}", library.name);
                }
                Err(err)
            }
        }
    }

    fn drive(
        &self,
        library: &Library,
        platforms: &[Platform],
        targets: &[BuildTarget],
        state: &mut LibraryState,
        manifest: &mut RunManifest,
        failed_target: &mut Option<String>,
    ) -> Result<BuildReport> {
        self.reset_library_logs(library)?;
        self.fetch(library)?;
        self.transition(library, state, LibraryState::Fetched);

        let source_dir = self.layout.source_dir(library);
        let kind = BuildSystemKind::detect(library, &source_dir);
        manifest.build_system = Some(kind);
        log::info!("[{}] build system: {}", library.name, kind);
        for tool in kind.host_tools() {
            self.tools.ensure(self.host, tool)?;
        }

        self.clean(library, platforms)?;
        let resolver = Resolver::new(self.config, &self.layout, &self.sdk);
        if let Some(first) = targets.first() {
            let ctx = self.context(library, &resolver, first)?;
            adapter::prepare(kind, &ctx, &self.layout.prepare_log(&library.name))?;
        }

        self.transition(library, state, LibraryState::Building);
        let workers = self.workers(kind);
        log::info!(
            "[{}] {} target(s) on {} worker(s)",
            library.name,
            targets.len(),
            workers
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("creating build worker pool")?;
        let built: std::result::Result<Vec<()>, (String, anyhow::Error)> = pool.install(|| {
            targets
                .par_iter()
                .map(|target| {
                    self.build_target(kind, library, &resolver, target)
                        .map_err(|err| {
                            log::error!("[{target}] failed: {err:#}");
                            (target.to_string(), err)
                        })
                })
                .collect()
        });
        if let Err((target, err)) = built {
            *failed_target = Some(target.clone());
            return Err(err.context(format!("building {target}")));
        }

        self.transition(library, state, LibraryState::Merging);
        let packages = Merger::new(self.host, &self.layout, self.config).merge(library, platforms)?;

        let release = if library.release {
            Some(package_release(self.host, &self.layout, library, &packages)?)
        } else {
            None
        };
        self.transition(library, state, LibraryState::Packaged);

        Ok(BuildReport {
            library: library.name.clone(),
            build_system: kind,
            targets: targets.to_vec(),
            packages,
            release,
        })
    }
}

/// Create `log` empty, along with its directory.
fn truncate_log(log: &Path) -> Result<()> {
    if let Some(parent) = log.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory '{}'", parent.display()))?;
    }
    File::create(log).with_context(|| format!("truncating log '{}'", log.display()))?;
    Ok(())
}
