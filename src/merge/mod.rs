//! Artifact merging: install prefixes → frameworks → xcframeworks.
//!
//! For every framework a library ships, each platform gets one bundle whose
//! binary is the `lipo` union of that platform's architectures. The bundles
//! are then packaged into `../Sources/<Framework>.xcframework`.
//!
//! Platforms outside the current request keep whatever bundle an earlier
//! run left behind. That bundle is not checked against its install
//! prefixes, so it may be stale.

mod framework;
mod xcframework;

use anyhow::Result;
use std::path::PathBuf;

use crate::config::{BuildConfig, Library};
use crate::error::BuildError;
use crate::layout::Layout;
use crate::process::Host;
use crate::target::Platform;
use framework::{create_framework, BundleInfo, FrameworkJob};
use xcframework::create_xcframework;

/// One finished package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub framework: String,
    pub path: PathBuf,
    /// Platforms with a bundle in the package, in table order.
    pub platforms: Vec<Platform>,
}

pub struct Merger<'a> {
    host: &'a dyn Host,
    layout: &'a Layout,
    config: &'a BuildConfig,
}

impl<'a> Merger<'a> {
    pub fn new(host: &'a dyn Host, layout: &'a Layout, config: &'a BuildConfig) -> Self {
        Self {
            host,
            layout,
            config,
        }
    }

    /// Build bundles for `requested` platforms, reuse the rest, and package
    /// every framework of `library`.
    pub fn merge(&self, library: &Library, requested: &[Platform]) -> Result<Vec<Package>> {
        let bundle = BundleInfo {
            identifier_prefix: &self.config.bundle_identifier_prefix,
            version: &self.config.bundle_version,
        };
        let log = self.layout.merge_log(&library.name);

        let mut packages = Vec::new();
        for framework in library.framework_names() {
            let mut bundles = Vec::new();
            let mut platforms = Vec::new();
            let mut last_missing = None;

            for platform in Platform::ALL {
                let bundle_dir = self.layout.framework_dir(&library.name, platform, &framework);
                if !requested.contains(&platform) {
                    if bundle_dir.is_dir() {
                        log::info!(
                            "[merge:{}] reusing {} bundle for slice {}",
                            framework,
                            platform,
                            platform.info().xcframework_slice
                        );
                        bundles.push(bundle_dir);
                        platforms.push(platform);
                    }
                    continue;
                }

                let job = FrameworkJob {
                    library: &library.name,
                    framework: &framework,
                    platform,
                    prefixes: platform
                        .architectures()
                        .iter()
                        .map(|arch| self.layout.install_prefix(&library.name, platform, *arch))
                        .collect(),
                    bundle_dir,
                    excluded_headers: library.excluded_headers(&framework),
                    log: log.clone(),
                };
                match create_framework(self.host, &job, &bundle) {
                    Ok(path) => {
                        bundles.push(path);
                        platforms.push(platform);
                    }
                    Err(err) if is_missing_artifact(&err) => {
                        log::warn!("[merge:{}] skipping {}: {}", framework, platform, err);
                        last_missing = Some(err);
                    }
                    Err(err) => return Err(err),
                }
            }

            if bundles.is_empty() {
                return Err(last_missing.unwrap_or_else(|| {
                    BuildError::MissingArtifact {
                        framework: framework.clone(),
                        platform: "any".to_string(),
                        path: self.layout.library_dir(&library.name),
                    }
                    .into()
                }));
            }

            let output = self.layout.xcframework_path(&framework);
            create_xcframework(self.host, &bundles, &output, &log, &framework)?;
            packages.push(Package {
                framework,
                path: output,
                platforms,
            });
        }
        Ok(packages)
    }
}

fn is_missing_artifact(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingArtifact { .. })
    )
}
