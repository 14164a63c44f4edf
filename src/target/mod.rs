//! Build targets: platforms, architectures and the matrix between them.
//!
//! Platform and architecture properties live in static tables
//! ([`PlatformInfo`], [`ArchInfo`]) so toolchain derivation reads them as data
//! instead of matching on variants all over the crate.

mod arch;
mod platform;

pub use arch::{Arch, ArchInfo};
pub use platform::{Platform, PlatformInfo};

use std::fmt;

/// One (platform, architecture) pair of one library. The unit of build work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildTarget {
    pub library: String,
    pub platform: Platform,
    pub arch: Arch,
}

impl BuildTarget {
    pub fn new(library: impl Into<String>, platform: Platform, arch: Arch) -> Self {
        Self {
            library: library.into(),
            platform,
            arch,
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.library, self.platform, self.arch)
    }
}

/// Platforms actually built: the request with duplicates removed, or every
/// platform when the request is empty.
pub fn requested_platforms(requested: &[Platform]) -> Vec<Platform> {
    if requested.is_empty() {
        return Platform::ALL.to_vec();
    }
    let mut platforms = Vec::with_capacity(requested.len());
    for platform in requested {
        if !platforms.contains(platform) {
            platforms.push(*platform);
        }
    }
    platforms
}

/// Expand the requested platforms into the ordered build matrix.
pub fn enumerate(library: &str, requested: &[Platform]) -> Vec<BuildTarget> {
    requested_platforms(requested)
        .into_iter()
        .flat_map(|platform| {
            platform
                .architectures()
                .iter()
                .map(move |arch| BuildTarget::new(library, platform, *arch))
        })
        .collect()
}
