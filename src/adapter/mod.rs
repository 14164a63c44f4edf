//! Build-system adapters.
//!
//! One module per third-party build system. The orchestrator picks a
//! [`BuildSystemKind`] per library with [`BuildSystemKind::detect`] and then
//! calls [`prepare`] once and [`build`] once per target. Every adapter
//! installs into the target's prefix (`<library>/<platform>/thin/<arch>`)
//! and sends every command through [`BuildContext::cmd`], which attaches the
//! resolved environment, the per-target log and the failure scope.

mod autotools;
mod cargo;
mod cmake;
mod meson;
mod waf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Library;
use crate::preflight::{self, HostTool};
use crate::process::{Cmd, Host};
use crate::target::BuildTarget;
use crate::toolchain::{SdkLocator, ToolchainEnvironment};

/// Parallelism passed to `make`.
pub const MAKE_JOBS: &str = "-j8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystemKind {
    Autotools,
    Cmake,
    Meson,
    Cargo,
    Waf,
}

impl BuildSystemKind {
    /// Configured override, else inspect the source tree: `meson.build`,
    /// then the waf driver, then `CMakeLists.txt`, else autotools.
    pub fn detect(library: &Library, source_dir: &Path) -> Self {
        if let Some(kind) = library.build_system {
            return kind;
        }
        if source_dir.join("meson.build").exists() {
            BuildSystemKind::Meson
        } else if source_dir.join(library.waf_script()).exists() {
            BuildSystemKind::Waf
        } else if source_dir.join("CMakeLists.txt").exists() {
            BuildSystemKind::Cmake
        } else {
            BuildSystemKind::Autotools
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuildSystemKind::Autotools => "autotools",
            BuildSystemKind::Cmake => "cmake",
            BuildSystemKind::Meson => "meson",
            BuildSystemKind::Cargo => "cargo",
            BuildSystemKind::Waf => "waf",
        }
    }

    /// Host tools the build system needs beyond the Xcode toolchain.
    pub fn host_tools(self) -> &'static [HostTool] {
        match self {
            BuildSystemKind::Autotools | BuildSystemKind::Waf => &[],
            BuildSystemKind::Cmake => &[preflight::CMAKE],
            BuildSystemKind::Meson => &[preflight::MESON, preflight::NINJA],
            BuildSystemKind::Cargo => &[preflight::CARGO],
        }
    }

    /// Builds inside the source tree, so targets of one library cannot run
    /// side by side.
    pub fn builds_in_tree(self) -> bool {
        matches!(self, BuildSystemKind::Waf)
    }
}

impl fmt::Display for BuildSystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs for building one target.
pub struct BuildContext<'a> {
    pub host: &'a dyn Host,
    pub sdk: &'a dyn SdkLocator,
    pub library: &'a Library,
    pub target: &'a BuildTarget,
    /// Where the build system runs (checkout or its subdirectory).
    pub source_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub prefix: PathBuf,
    pub log: PathBuf,
    pub toolchain: ToolchainEnvironment,
}

impl BuildContext<'_> {
    /// A command carrying this target's environment, log and scope, run in
    /// the scratch directory unless redirected with [`Cmd::dir`].
    pub fn cmd(&self, program: impl Into<String>) -> Cmd {
        Cmd::new(program)
            .envs(&self.toolchain.env)
            .dir(&self.scratch_dir)
            .log_to(&self.log)
            .scope(self.target.to_string())
    }

    pub fn run(&self, cmd: Cmd) -> Result<()> {
        self.host.execute(&cmd)?;
        Ok(())
    }
}

/// Once-per-library work that must finish before any target builds. Runs
/// with `ctx`'s toolchain environment but logs to `log`.
pub fn prepare(kind: BuildSystemKind, ctx: &BuildContext<'_>, log: &Path) -> Result<()> {
    match kind {
        BuildSystemKind::Autotools => autotools::prepare(ctx, log),
        _ => Ok(()),
    }
}

/// Configure, compile and install one target into its prefix.
pub fn build(kind: BuildSystemKind, ctx: &BuildContext<'_>) -> Result<()> {
    fs::create_dir_all(&ctx.scratch_dir)
        .with_context(|| format!("creating scratch dir '{}'", ctx.scratch_dir.display()))?;
    match kind {
        BuildSystemKind::Autotools => autotools::build(ctx),
        BuildSystemKind::Cmake => cmake::build(ctx),
        BuildSystemKind::Meson => meson::build(ctx),
        BuildSystemKind::Cargo => cargo::build(ctx),
        BuildSystemKind::Waf => waf::build(ctx),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_order() {
        let temp = TempDir::new().unwrap();
        let src = temp.path();
        let lib = Library::new("gmp", "6.2", "u");

        assert_eq!(BuildSystemKind::detect(&lib, src), BuildSystemKind::Autotools);

        fs::write(src.join("CMakeLists.txt"), "").unwrap();
        assert_eq!(BuildSystemKind::detect(&lib, src), BuildSystemKind::Cmake);

        fs::write(src.join("waf"), "").unwrap();
        assert_eq!(BuildSystemKind::detect(&lib, src), BuildSystemKind::Waf);

        fs::write(src.join("meson.build"), "").unwrap();
        assert_eq!(BuildSystemKind::detect(&lib, src), BuildSystemKind::Meson);
    }

    #[test]
    fn test_detect_override_wins() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("meson.build"), "").unwrap();
        let mut lib = Library::new("libdovi", "1", "u");
        lib.build_system = Some(BuildSystemKind::Cargo);
        assert_eq!(BuildSystemKind::detect(&lib, temp.path()), BuildSystemKind::Cargo);
    }

    #[test]
    fn test_context_cmd_carries_scope_and_log() {
        let temp = TempDir::new().unwrap();
        let host = RecordingHost::default();
        let lib = Library::new("gmp", "6.2", "u");
        let target = ios_target("gmp");
        let ctx = context(&host, &lib, &target, temp.path());

        let cmd = ctx.cmd("make");
        assert_eq!(cmd.get_env("CC"), Some("/usr/bin/clang"));
        assert_eq!(cmd.get_dir(), Some(temp.path().join("scratch").as_path()));
        assert_eq!(cmd.get_log(), Some(temp.path().join("arm64.log").as_path()));
        let err = cmd.failure(1).to_string();
        assert!(err.contains("gmp:ios:arm64"));
    }

    #[test]
    fn test_only_waf_builds_in_tree() {
        assert!(BuildSystemKind::Waf.builds_in_tree());
        assert!(!BuildSystemKind::Cmake.builds_in_tree());
        assert_eq!(BuildSystemKind::Cargo.host_tools(), &[preflight::CARGO]);
    }
}
