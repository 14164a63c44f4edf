//! Per-target compiler and linker environment.
//!
//! [`Resolver::resolve`] turns a [`BuildTarget`] into the flags, triple and
//! child environment every build adapter runs with. SDK and tool locations
//! come from an [`SdkLocator`]; [`XcrunLocator`] asks `xcrun` once per query
//! and remembers the answer, so resolving the same target twice yields the
//! same [`ToolchainEnvironment`].

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::config::{BuildConfig, Library};
use crate::layout::Layout;
use crate::process::{Cmd, Host};
use crate::target::{BuildTarget, Platform};

pub const C_COMPILER: &str = "/usr/bin/clang";
pub const CXX_COMPILER: &str = "/usr/bin/clang++";

/// Finds SDKs and SDK-specific tools.
pub trait SdkLocator: Send + Sync {
    /// Root of the platform SDK (`-isysroot`).
    fn sdk_path(&self, platform: Platform) -> Result<PathBuf>;

    /// A developer tool (`ar`, `strip`) for the platform's SDK.
    fn find_tool(&self, platform: Platform, tool: &str) -> Result<PathBuf>;

    /// pkg-config's built-in search path.
    fn pkg_config_search_path(&self) -> Result<String>;
}

/// [`SdkLocator`] backed by `xcrun` and `pkg-config`, memoized per query.
pub struct XcrunLocator<'a> {
    host: &'a dyn Host,
    answers: Mutex<BTreeMap<String, String>>,
}

impl<'a> XcrunLocator<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self {
            host,
            answers: Mutex::new(BTreeMap::new()),
        }
    }

    fn answers(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
        self.answers
            .lock()
            .map_err(|_| anyhow::anyhow!("sdk locator lock poisoned"))
    }

    /// The lock is not held while `cmd` runs; two workers racing on the same
    /// query both run it and the first answer stored wins.
    fn query(&self, cmd: Cmd) -> Result<String> {
        let key = cmd.to_string();
        if let Some(answer) = self.answers()?.get(&key) {
            return Ok(answer.clone());
        }
        let output = self
            .host
            .execute(&cmd)
            .with_context(|| format!("querying `{key}`"))?;
        let answer = output.stdout.trim().to_string();
        Ok(self.answers()?.entry(key).or_insert(answer).clone())
    }
}

impl SdkLocator for XcrunLocator<'_> {
    fn sdk_path(&self, platform: Platform) -> Result<PathBuf> {
        let sdk = platform.sdk().to_lowercase();
        let path = self.query(
            Cmd::new("xcrun")
                .args(["--sdk", sdk.as_str(), "--show-sdk-path"])
                .error_msg(format!("cannot locate the {} SDK", platform.sdk())),
        )?;
        Ok(PathBuf::from(path))
    }

    fn find_tool(&self, platform: Platform, tool: &str) -> Result<PathBuf> {
        let sdk = platform.sdk().to_lowercase();
        let path = self.query(
            Cmd::new("xcrun")
                .args(["--sdk", sdk.as_str(), "--find", tool])
                .error_msg(format!("cannot find `{tool}` in the {} SDK", platform.sdk())),
        )?;
        Ok(PathBuf::from(path))
    }

    fn pkg_config_search_path(&self) -> Result<String> {
        self.query(
            Cmd::new("pkg-config")
                .args(["--variable", "pc_path", "pkg-config"])
                .error_msg("cannot read pkg-config's default search path"),
        )
    }
}

/// Everything a build adapter needs to cross-compile one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainEnvironment {
    /// Rust-style target triple.
    pub triple: String,
    /// Clang `-target` value.
    pub deployment_target: String,
    pub sdk_path: PathBuf,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
    /// `PKG_CONFIG_LIBDIR` value.
    pub pkg_config_libdir: String,
    /// Variables handed to every child process of this target.
    pub env: BTreeMap<String, String>,
}

/// Derives [`ToolchainEnvironment`]s from configuration and layout.
pub struct Resolver<'a> {
    config: &'a BuildConfig,
    layout: &'a Layout,
    sdk: &'a dyn SdkLocator,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a BuildConfig, layout: &'a Layout, sdk: &'a dyn SdkLocator) -> Self {
        Self {
            config,
            layout,
            sdk,
        }
    }

    pub fn sdk(&self) -> &dyn SdkLocator {
        self.sdk
    }

    /// Fails only when the SDK or pkg-config cannot be queried. Missing
    /// sibling prefixes contribute nothing.
    pub fn resolve(&self, target: &BuildTarget) -> Result<ToolchainEnvironment> {
        let platform = target.platform;
        let arch = target.arch;
        let sdk_path = self.sdk.sdk_path(platform)?;
        let deployment_target = platform.deployment_target(arch);
        let sysroot = sdk_path.display().to_string();

        let mut common = vec![
            "-arch".to_string(),
            arch.name().to_string(),
            "-isysroot".to_string(),
            sysroot.clone(),
            "-target".to_string(),
            deployment_target.clone(),
        ];
        common.extend(platform.version_min_flag());

        let mut cflags = common.clone();
        cflags.extend(platform.info().defines.iter().map(|d| d.to_string()));

        let mut ldflags = vec!["-lc++".to_string()];
        ldflags.extend(common);
        if platform == Platform::Maccatalyst {
            ldflags.push("-iframework".to_string());
            ldflags.push(format!(
                "{sysroot}/System/iOSSupport/System/Library/Frameworks"
            ));
        }

        let mut pkg_config_libdir = String::new();
        for (sibling, prefix) in self.sibling_prefixes(target) {
            cflags.push(format!("-I{}", prefix.join("include").display()));

            ldflags.push(format!("-L{}", prefix.join("lib").display()));
            ldflags.extend(sibling.link_names().into_iter().map(|name| format!("-l{name}")));
            for framework in &sibling.system_frameworks {
                ldflags.push("-framework".to_string());
                ldflags.push(framework.clone());
            }

            pkg_config_libdir.push_str(&format!("{}:", prefix.join("lib/pkgconfig").display()));
        }
        pkg_config_libdir.push_str(&self.sdk.pkg_config_search_path()?);

        let cflags_joined = cflags.join(" ");
        let env: BTreeMap<String, String> = [
            ("LC_CTYPE", "C".to_string()),
            ("CC", C_COMPILER.to_string()),
            ("CXX", CXX_COMPILER.to_string()),
            ("CURRENT_ARCH", arch.name().to_string()),
            ("CFLAGS", cflags_joined.clone()),
            ("CPPFLAGS", cflags_joined.clone()),
            ("CXXFLAGS", cflags_joined),
            ("LDFLAGS", ldflags.join(" ")),
            ("PKG_CONFIG_LIBDIR", pkg_config_libdir.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Ok(ToolchainEnvironment {
            triple: platform.target_triple(arch),
            deployment_target,
            sdk_path,
            cflags,
            ldflags,
            pkg_config_libdir,
            env,
        })
    }

    /// Other configured libraries already installed for this target, in
    /// declared order.
    fn sibling_prefixes(&self, target: &BuildTarget) -> Vec<(&'a Library, PathBuf)> {
        self.config
            .libraries
            .iter()
            .filter(|library| library.name != target.library)
            .filter_map(|library| {
                let prefix = self
                    .layout
                    .install_prefix(&library.name, target.platform, target.arch);
                prefix.is_dir().then_some((library, prefix))
            })
            .collect()
    }
}
