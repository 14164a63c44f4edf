use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Arch;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Isimulator,
    Tvos,
    Tvsimulator,
    Macos,
    Maccatalyst,
}

/// Derived properties of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Name used on the command line and in directory names.
    pub name: &'static str,
    /// Minimum OS version; empty when the toolchain default applies.
    pub min_version: &'static str,
    /// SDK name as known to `xcrun` (lowercased) and `Info.plist`.
    pub sdk: &'static str,
    /// OS component of `-target` deployment strings.
    pub deployment_os: &'static str,
    /// Suffix appended to the deployment string (`-simulator`, `-macabi`).
    pub deployment_suffix: &'static str,
    /// OS component of the Rust target triple.
    pub triple_os: &'static str,
    /// Variant suffix of the Rust target triple (`-sim`, `-macabi`).
    pub triple_variant: &'static str,
    /// Minimum-version compiler flag prefix, if the platform has one.
    pub version_min_flag: Option<&'static str>,
    /// Extra preprocessor defines.
    pub defines: &'static [&'static str],
    /// `subsystem` value in meson cross files.
    pub meson_subsystem: &'static str,
    /// Slice identifier inside an xcframework.
    pub xcframework_slice: &'static str,
    pub archs: &'static [Arch],
}

#[cfg(target_arch = "x86_64")]
const MACOS_ARCHS: &[Arch] = &[Arch::X86_64, Arch::Arm64];
#[cfg(not(target_arch = "x86_64"))]
const MACOS_ARCHS: &[Arch] = &[Arch::Arm64, Arch::X86_64];

const IOS: PlatformInfo = PlatformInfo {
    name: "ios",
    min_version: "13.0",
    sdk: "iPhoneOS",
    deployment_os: "ios",
    deployment_suffix: "",
    triple_os: "ios",
    triple_variant: "",
    version_min_flag: Some("-mios-version-min="),
    defines: &[],
    meson_subsystem: "ios",
    xcframework_slice: "ios-arm64",
    archs: &[Arch::Arm64],
};

const ISIMULATOR: PlatformInfo = PlatformInfo {
    name: "isimulator",
    min_version: "13.0",
    sdk: "iPhoneSimulator",
    deployment_os: "ios",
    deployment_suffix: "-simulator",
    triple_os: "ios",
    triple_variant: "-sim",
    version_min_flag: Some("-mios-simulator-version-min="),
    defines: &[],
    meson_subsystem: "ios-simulator",
    xcframework_slice: "ios-arm64_x86_64-simulator",
    archs: &[Arch::Arm64, Arch::X86_64],
};

// arm64e matches what Xcode ships for tvOS device slices.
const TVOS: PlatformInfo = PlatformInfo {
    name: "tvos",
    min_version: "13.0",
    sdk: "AppleTVOS",
    deployment_os: "tvos",
    deployment_suffix: "",
    triple_os: "tvos",
    triple_variant: "",
    version_min_flag: Some("-mtvos-version-min="),
    defines: &["-DHAVE_FORK=0"],
    meson_subsystem: "tvos",
    xcframework_slice: "tvos-arm64_arm64e",
    archs: &[Arch::Arm64, Arch::Arm64e],
};

const TVSIMULATOR: PlatformInfo = PlatformInfo {
    name: "tvsimulator",
    min_version: "13.0",
    sdk: "AppleTVSimulator",
    deployment_os: "tvos",
    deployment_suffix: "-simulator",
    triple_os: "tvos",
    triple_variant: "-sim",
    version_min_flag: Some("-mtvos-simulator-version-min="),
    defines: &["-DHAVE_FORK=0"],
    meson_subsystem: "tvos-simulator",
    xcframework_slice: "tvos-arm64_x86_64-simulator",
    archs: &[Arch::Arm64, Arch::X86_64],
};

const MACOS: PlatformInfo = PlatformInfo {
    name: "macos",
    min_version: "10.15",
    sdk: "MacOSX",
    deployment_os: "macos",
    deployment_suffix: "",
    triple_os: "darwin",
    triple_variant: "",
    version_min_flag: Some("-mmacosx-version-min="),
    defines: &[],
    meson_subsystem: "macos",
    xcframework_slice: "macos-arm64_x86_64",
    archs: MACOS_ARCHS,
};

const MACCATALYST: PlatformInfo = PlatformInfo {
    name: "maccatalyst",
    min_version: "",
    sdk: "MacOSX",
    deployment_os: "ios",
    deployment_suffix: "-macabi",
    triple_os: "ios",
    triple_variant: "-macabi",
    version_min_flag: None,
    defines: &[],
    meson_subsystem: "maccatalyst",
    xcframework_slice: "ios-arm64_x86_64-maccatalyst",
    archs: &[Arch::Arm64, Arch::X86_64],
};

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Ios,
        Platform::Isimulator,
        Platform::Tvos,
        Platform::Tvsimulator,
        Platform::Macos,
        Platform::Maccatalyst,
    ];

    pub fn info(self) -> &'static PlatformInfo {
        match self {
            Platform::Ios => &IOS,
            Platform::Isimulator => &ISIMULATOR,
            Platform::Tvos => &TVOS,
            Platform::Tvsimulator => &TVSIMULATOR,
            Platform::Macos => &MACOS,
            Platform::Maccatalyst => &MACCATALYST,
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn architectures(self) -> &'static [Arch] {
        self.info().archs
    }

    pub fn min_version(self) -> &'static str {
        self.info().min_version
    }

    pub fn sdk(self) -> &'static str {
        self.info().sdk
    }

    /// `-target` value, e.g. `arm64-apple-ios13.0-simulator`.
    pub fn deployment_target(self, arch: Arch) -> String {
        let info = self.info();
        format!(
            "{}-apple-{}{}{}",
            arch.target_cpu(),
            info.deployment_os,
            info.min_version,
            info.deployment_suffix
        )
    }

    /// Minimum-version flag, e.g. `-mios-version-min=13.0`.
    pub fn version_min_flag(self) -> Option<String> {
        let info = self.info();
        info.version_min_flag
            .map(|flag| format!("{flag}{}", info.min_version))
    }

    /// Target triple as the Rust toolchain spells it.
    ///
    /// x86_64 simulator triples collapse onto the device triple: the Rust
    /// toolchain has no separate `-sim` target for Intel simulators.
    pub fn target_triple(self, arch: Arch) -> String {
        let info = self.info();
        let variant = if arch == Arch::X86_64 && info.triple_variant == "-sim" {
            ""
        } else {
            info.triple_variant
        };
        format!(
            "{}-apple-{}{}",
            arch.info().triple_cpu,
            info.triple_os,
            variant
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|platform| platform.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Platform::ALL.iter().map(|p| p.name()).collect();
                anyhow::anyhow!(
                    "unknown platform '{}'; expected one of: {}",
                    s,
                    known.join(", ")
                )
            })
    }
}
