//! On-disk layout of a work directory.
//!
//! ```text
//! <work>/<name>-<version>/                       source checkout
//! <work>/<library>/<platform>/scratch/<arch>/    build scratch
//! <work>/<library>/<platform>/scratch/<arch>.log transcript
//! <work>/<library>/<platform>/thin/<arch>/       install prefix
//! <work>/<library>/<platform>/<Fw>.framework/    per-platform bundle
//! <work>/../Sources/<Fw>.xcframework             package
//! <work>/../Release/                             release distributable
//! ```

use std::path::{Path, PathBuf};

use crate::config::Library;
use crate::target::{Arch, BuildTarget, Platform};

pub const LOCK_FILE: &str = ".xcframework-builder.lock";
pub const MANIFEST_FILE: &str = "run-manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    work_dir: PathBuf,
}

impl Layout {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn lock_file(&self) -> PathBuf {
        self.work_dir.join(LOCK_FILE)
    }

    /// Git checkout, `<name>-<version>`.
    pub fn checkout_dir(&self, library: &Library) -> PathBuf {
        self.work_dir.join(library.checkout_name())
    }

    /// Directory the build system runs in: the checkout or its subdirectory.
    pub fn source_dir(&self, library: &Library) -> PathBuf {
        let checkout = self.checkout_dir(library);
        match &library.source_subdir {
            Some(subdir) => checkout.join(subdir),
            None => checkout,
        }
    }

    pub fn library_dir(&self, library: &str) -> PathBuf {
        self.work_dir.join(library)
    }

    pub fn platform_dir(&self, library: &str, platform: Platform) -> PathBuf {
        self.library_dir(library).join(platform.name())
    }

    pub fn scratch_dir(&self, target: &BuildTarget) -> PathBuf {
        self.platform_dir(&target.library, target.platform)
            .join("scratch")
            .join(target.arch.name())
    }

    pub fn log_file(&self, target: &BuildTarget) -> PathBuf {
        self.platform_dir(&target.library, target.platform)
            .join("scratch")
            .join(format!("{}.log", target.arch.name()))
    }

    pub fn install_prefix(&self, library: &str, platform: Platform, arch: Arch) -> PathBuf {
        self.platform_dir(library, platform)
            .join("thin")
            .join(arch.name())
    }

    pub fn framework_dir(&self, library: &str, platform: Platform, framework: &str) -> PathBuf {
        self.platform_dir(library, platform)
            .join(format!("{framework}.framework"))
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.work_dir.join("..").join("Sources")
    }

    pub fn xcframework_path(&self, framework: &str) -> PathBuf {
        self.sources_dir().join(format!("{framework}.xcframework"))
    }

    pub fn release_dir(&self) -> PathBuf {
        self.work_dir.join("..").join("Release")
    }

    /// Transcript of once-per-library steps (autogen, bootstrap).
    pub fn prepare_log(&self, library: &str) -> PathBuf {
        self.library_dir(library).join("prepare.log")
    }

    /// Transcript of `lipo` and `xcodebuild` runs.
    pub fn merge_log(&self, library: &str) -> PathBuf {
        self.library_dir(library).join("merge.log")
    }

    pub fn manifest_path(&self, library: &str) -> PathBuf {
        self.library_dir(library).join(MANIFEST_FILE)
    }
}
