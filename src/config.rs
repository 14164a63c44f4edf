//! Library definitions and build configuration (`Build.toml`).
//!
//! ```toml
//! bundle_identifier_prefix = "com.kintan.ksplayer"
//! bundle_version = "87.88.520"
//!
//! [[library]]
//! name = "nettle"
//! version = "nettle_3.9.1_release_20230601"
//! url = "https://github.com/gnutls/nettle"
//! link = ["nettle", "hogweed"]
//! build = false
//! ```
//!
//! Libraries are kept in declared order. That order is the sibling order used
//! for `-I`/`-L` flags and the pkg-config search path.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::adapter::BuildSystemKind;

pub const DEFAULT_CONFIG_FILE: &str = "Build.toml";
pub const DEFAULT_BUNDLE_IDENTIFIER_PREFIX: &str = "com.kintan.ksplayer";
pub const DEFAULT_BUNDLE_VERSION: &str = "87.88.520";
pub const DEFAULT_WAF_SCRIPT: &str = "./waf";

/// Top-level build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default = "default_bundle_identifier_prefix")]
    pub bundle_identifier_prefix: String,
    #[serde(default = "default_bundle_version")]
    pub bundle_version: String,
    /// Worker count; defaults to the host's available parallelism.
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(rename = "library", default)]
    pub libraries: Vec<Library>,
}

/// A third-party dependency pinned to one version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Library {
    pub name: String,
    /// Git tag or branch to clone.
    pub version: String,
    pub url: String,
    /// Force a build system instead of inspecting the source tree.
    #[serde(default)]
    pub build_system: Option<BuildSystemKind>,
    /// Directory inside the checkout where the build runs.
    #[serde(default)]
    pub source_subdir: Option<PathBuf>,
    /// Distributable units; defaults to the library name.
    #[serde(default)]
    pub frameworks: Vec<String>,
    /// Headers left out of each framework's module map, keyed by framework.
    #[serde(default)]
    pub exclude_headers: BTreeMap<String, Vec<String>>,
    /// `-l` names dependents link with; defaults to the name minus `lib`.
    #[serde(default)]
    pub link: Vec<String>,
    /// System frameworks dependents must link (`-framework`).
    #[serde(default)]
    pub system_frameworks: Vec<String>,
    /// Extra arguments for configure / cmake / meson setup / waf configure.
    #[serde(default)]
    pub configure_args: Vec<String>,
    #[serde(default)]
    pub waf_script: Option<String>,
    #[serde(default)]
    pub waf_targets: Vec<String>,
    /// Toolchain passed to cargo as `+<toolchain>`.
    #[serde(default)]
    pub rust_toolchain: Option<String>,
    /// Produce the `../Release` distributable after merging.
    #[serde(default)]
    pub release: bool,
    /// Built by default; `false` marks a sibling that is only linked against.
    #[serde(default = "default_true")]
    pub build: bool,
}

fn default_bundle_identifier_prefix() -> String {
    DEFAULT_BUNDLE_IDENTIFIER_PREFIX.to_string()
}

fn default_bundle_version() -> String {
    DEFAULT_BUNDLE_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

/// `libfoo` → `Libfoo`; other names are used as-is.
pub fn framework_name(name: &str) -> String {
    match name.strip_prefix("lib") {
        Some(rest) => format!("Lib{rest}"),
        None => name.to_string(),
    }
}

impl Library {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            url: url.into(),
            build_system: None,
            source_subdir: None,
            frameworks: Vec::new(),
            exclude_headers: BTreeMap::new(),
            link: Vec::new(),
            system_frameworks: Vec::new(),
            configure_args: Vec::new(),
            waf_script: None,
            waf_targets: Vec::new(),
            rust_toolchain: None,
            release: false,
            build: true,
        }
    }

    /// Checkout directory name, `<name>-<version>`.
    pub fn checkout_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Framework names with the `lib` prefix normalized.
    pub fn framework_names(&self) -> Vec<String> {
        if self.frameworks.is_empty() {
            return vec![framework_name(&self.name)];
        }
        self.frameworks.iter().map(|f| framework_name(f)).collect()
    }

    pub fn excluded_headers(&self, framework: &str) -> &[String] {
        self.exclude_headers
            .iter()
            .find(|(name, _)| framework_name(name) == framework)
            .map(|(_, headers)| headers.as_slice())
            .unwrap_or(&[])
    }

    pub fn link_names(&self) -> Vec<String> {
        if !self.link.is_empty() {
            return self.link.clone();
        }
        let name = self.name.strip_prefix("lib").unwrap_or(&self.name);
        vec![name.to_string()]
    }

    pub fn waf_script(&self) -> &str {
        self.waf_script.as_deref().unwrap_or(DEFAULT_WAF_SCRIPT)
    }

    /// Version without the `<name>-` prefix or surrounding `v`s, for file names.
    pub fn release_version(&self) -> String {
        let prefix = format!("{}-", self.name);
        self.version
            .strip_prefix(&prefix)
            .unwrap_or(&self.version)
            .trim_matches('v')
            .to_string()
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        let mut libdovi = Library::new(
            "libdovi",
            "libdovi-3.3.0",
            "https://github.com/quietvoid/dovi_tool",
        );
        libdovi.build_system = Some(BuildSystemKind::Cargo);
        libdovi.source_subdir = Some(PathBuf::from("dolby_vision"));
        libdovi.rust_toolchain = Some("stage1".to_string());
        libdovi.release = true;

        Self {
            bundle_identifier_prefix: default_bundle_identifier_prefix(),
            bundle_version: default_bundle_version(),
            jobs: None,
            libraries: vec![libdovi],
        }
    }
}

impl BuildConfig {
    /// Load `path`, or fall back to the built-in defaults when `path` is
    /// `None` and no `Build.toml` exists in `dir`.
    pub fn load_or_default(path: Option<&Path>, dir: &Path) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let candidate = dir.join(DEFAULT_CONFIG_FILE);
                if candidate.is_file() {
                    Self::load(&candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading build config '{}'", path.display()))?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let config: BuildConfig = toml::from_str(content)
            .with_context(|| format!("parsing build config '{}'", origin.display()))?;
        config.validate(origin)?;
        Ok(config)
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        if self.libraries.is_empty() {
            bail!(
                "invalid build config '{}': at least one [[library]] is required",
                origin.display()
            );
        }
        if self.jobs == Some(0) {
            bail!("invalid build config '{}': jobs must be at least 1", origin.display());
        }

        let mut seen = BTreeSet::new();
        for library in &self.libraries {
            for (field, value) in [
                ("name", &library.name),
                ("version", &library.version),
                ("url", &library.url),
            ] {
                if value.trim().is_empty() {
                    bail!(
                        "invalid build config '{}': library.{} must not be empty",
                        origin.display(),
                        field
                    );
                }
            }
            if !seen.insert(library.name.as_str()) {
                bail!(
                    "invalid build config '{}': duplicate library '{}'",
                    origin.display(),
                    library.name
                );
            }
            if library.name.contains('/') {
                bail!(
                    "invalid build config '{}': library name '{}' must not contain '/'",
                    origin.display(),
                    library.name
                );
            }
        }
        Ok(())
    }

    pub fn library(&self, name: &str) -> Result<&Library> {
        self.libraries
            .iter()
            .find(|library| library.name == name)
            .ok_or_else(|| {
                let known: Vec<_> = self.libraries.iter().map(|l| l.name.as_str()).collect();
                anyhow::anyhow!(
                    "unknown library '{}'; expected one of: {}",
                    name,
                    known.join(", ")
                )
            })
    }

    /// Libraries built when none is named explicitly.
    pub fn default_libraries(&self) -> Vec<&Library> {
        self.libraries.iter().filter(|library| library.build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
bundle_version = "1.2.3"

[[library]]
name = "gmp"
version = "v6.2.1"
url = "https://example.invalid/gmp.git"
build = false

[[library]]
name = "nettle"
version = "nettle_3.9"
url = "https://example.invalid/nettle.git"
link = ["nettle", "hogweed"]
configure_args = ["--disable-mini-gmp"]

[[library]]
name = "libsmbclient"
version = "4.15"
url = "https://example.invalid/samba.git"
build_system = "waf"
waf_script = "./buildtools/bin/waf"
waf_targets = ["client/smbclient"]
frameworks = ["libsmbclient"]

[library.exclude_headers]
libsmbclient = ["talloc"]
"#;

    fn sample() -> BuildConfig {
        BuildConfig::parse(SAMPLE, Path::new("Build.toml")).unwrap()
    }

    #[test]
    fn test_parse_keeps_declared_order() {
        let config = sample();
        let names: Vec<_> = config.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["gmp", "nettle", "libsmbclient"]);
        assert_eq!(config.bundle_version, "1.2.3");
        assert_eq!(config.bundle_identifier_prefix, DEFAULT_BUNDLE_IDENTIFIER_PREFIX);
    }

    #[test]
    fn test_default_libraries_skip_siblings() {
        let config = sample();
        let names: Vec<_> = config
            .default_libraries()
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["nettle", "libsmbclient"]);
    }

    #[test]
    fn test_library_fields() {
        let config = sample();
        let smb = config.library("libsmbclient").unwrap();
        assert_eq!(smb.build_system, Some(BuildSystemKind::Waf));
        assert_eq!(smb.waf_script(), "./buildtools/bin/waf");
        assert_eq!(smb.framework_names(), vec!["Libsmbclient".to_string()]);
        assert_eq!(smb.excluded_headers("Libsmbclient"), &["talloc".to_string()]);
        assert_eq!(smb.link_names(), vec!["smbclient".to_string()]);

        let nettle = config.library("nettle").unwrap();
        assert_eq!(nettle.link_names(), vec!["nettle", "hogweed"]);
        assert_eq!(nettle.waf_script(), "./waf");
    }

    #[test]
    fn test_unknown_library() {
        let err = sample().library("openssl").unwrap_err().to_string();
        assert!(err.contains("gmp, nettle, libsmbclient"));
    }

    #[test]
    fn test_framework_name_normalization() {
        assert_eq!(framework_name("libdovi"), "Libdovi");
        assert_eq!(framework_name("gmp"), "gmp");
    }

    #[test]
    fn test_release_version() {
        let lib = Library::new("libdovi", "libdovi-3.3.0", "u");
        assert_eq!(lib.release_version(), "3.3.0");
        let lib = Library::new("gmp", "v6.2.1", "u");
        assert_eq!(lib.release_version(), "6.2.1");
    }

    #[test]
    fn test_default_config_builds_libdovi_with_cargo() {
        let config = BuildConfig::default();
        let dovi = config.library("libdovi").unwrap();
        assert_eq!(dovi.build_system, Some(BuildSystemKind::Cargo));
        assert_eq!(dovi.checkout_name(), "libdovi-libdovi-3.3.0");
        assert!(dovi.release);
    }

    #[test]
    fn test_rejects_duplicates_and_unknown_fields() {
        let dup = r#"
[[library]]
name = "gmp"
version = "1"
url = "u"

[[library]]
name = "gmp"
version = "2"
url = "u"
"#;
        let err = BuildConfig::parse(dup, Path::new("dup.toml")).unwrap_err();
        assert!(err.to_string().contains("duplicate library 'gmp'"));

        let unknown = "[[library]]\nname = \"gmp\"\nversion = \"1\"\nurl = \"u\"\nflavor = \"x\"\n";
        assert!(BuildConfig::parse(unknown, Path::new("bad.toml")).is_err());
    }

    #[test]
    fn test_bundled_config_parses() {
        let config = BuildConfig::parse(include_str!("../Build.toml"), Path::new("Build.toml")).unwrap();
        let names: Vec<_> = config
            .default_libraries()
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["libdovi"]);
        assert_eq!(
            config.library("gnutls").unwrap().system_frameworks,
            vec!["Security", "CoreFoundation"]
        );
    }

    #[test]
    fn test_rejects_empty_config() {
        let err = BuildConfig::parse("", Path::new("empty.toml")).unwrap_err();
        assert!(err.to_string().contains("at least one [[library]]"));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = BuildConfig::load_or_default(None, temp.path()).unwrap();
        assert_eq!(config, BuildConfig::default());
    }
}
