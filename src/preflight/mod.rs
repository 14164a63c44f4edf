//! Preflight checks for host tools.
//!
//! Validates that the host has the tools a build needs before anything is
//! compiled, and installs the ones Homebrew can provide on demand.
//!
//! # Example
//!
//! ```rust,ignore
//! use xcframework_builder::preflight::{ToolInstaller, MESON};
//! use xcframework_builder::process::SystemHost;
//!
//! let installer = ToolInstaller::default();
//! let meson = installer.ensure(&SystemHost, &MESON)?;
//! ```

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::BuildError;
use crate::process::{Cmd, Host};

/// A tool the build may need on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTool {
    /// Executable name looked up in PATH.
    pub command: &'static str,
    /// Homebrew formula that provides it, if it can be installed on demand.
    pub formula: Option<&'static str>,
    /// What to tell the user when it is missing and cannot be installed.
    pub hint: &'static str,
}

pub const BREW: HostTool = HostTool {
    command: "brew",
    formula: None,
    hint: "You need to install Homebrew first:\n\
           /bin/bash -c \"$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)\"",
};

pub const PKG_CONFIG: HostTool = HostTool {
    command: "pkg-config",
    formula: Some("pkg-config"),
    hint: "brew install pkg-config",
};

pub const CMAKE: HostTool = HostTool {
    command: "cmake",
    formula: Some("cmake"),
    hint: "brew install cmake",
};

pub const MESON: HostTool = HostTool {
    command: "meson",
    formula: Some("meson"),
    hint: "brew install meson",
};

pub const NINJA: HostTool = HostTool {
    command: "ninja",
    formula: Some("ninja"),
    hint: "brew install ninja",
};

pub const CARGO: HostTool = HostTool {
    command: "cargo",
    formula: None,
    hint: "Please manually install cargo: https://doc.rust-lang.org/cargo/getting-started/installation.html",
};

pub const GIT: HostTool = HostTool {
    command: "git",
    formula: Some("git"),
    hint: "xcode-select --install",
};

/// Apple developer tools used to locate SDKs and merge artifacts.
pub const XCODE_TOOLS: &[HostTool] = &[
    HostTool {
        command: "xcrun",
        formula: None,
        hint: "xcode-select --install",
    },
    HostTool {
        command: "lipo",
        formula: None,
        hint: "xcode-select --install",
    },
    HostTool {
        command: "xcodebuild",
        formula: None,
        hint: "install Xcode from the App Store",
    },
];

/// Check if a command exists on the host.
pub fn command_exists(host: &dyn Host, cmd: &str) -> bool {
    host.which(cmd).is_some()
}

/// Check that specific tools are available, reporting every missing one.
pub fn check_required_tools(host: &dyn Host, tools: &[HostTool]) -> Result<()> {
    let missing: Vec<&HostTool> = tools
        .iter()
        .filter(|tool| !command_exists(host, tool.command))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|t| format!("  {} ({})", t.command, t.hint))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Installs missing tools at most once per process.
///
/// The lock is held across the check and the install so concurrent callers
/// never run `brew install` for the same formula twice.
#[derive(Debug, Default)]
pub struct ToolInstaller {
    resolved: Mutex<BTreeMap<&'static str, PathBuf>>,
}

impl ToolInstaller {
    /// Return the tool's path, installing it through Homebrew if needed.
    pub fn ensure(&self, host: &dyn Host, tool: &HostTool) -> Result<PathBuf> {
        let mut resolved = self
            .resolved
            .lock()
            .map_err(|_| anyhow::anyhow!("tool installer lock poisoned"))?;

        if let Some(path) = resolved.get(tool.command) {
            return Ok(path.clone());
        }

        if let Some(path) = host.which(tool.command) {
            resolved.insert(tool.command, path.clone());
            return Ok(path);
        }

        let Some(formula) = tool.formula else {
            return Err(missing(tool));
        };

        if host.which(BREW.command).is_none() {
            return Err(BuildError::MissingPrerequisite {
                tool: tool.command.to_string(),
                hint: BREW.hint.to_string(),
            }
            .into());
        }

        log::info!("[preflight] installing {} via brew", formula);
        host.execute(
            &Cmd::new("brew")
                .args(["install", formula])
                .error_msg(format!("brew install {formula} failed")),
        )?;

        let path = host.which(tool.command).ok_or_else(|| missing(tool))?;
        resolved.insert(tool.command, path.clone());
        Ok(path)
    }
}

fn missing(tool: &HostTool) -> anyhow::Error {
    BuildError::MissingPrerequisite {
        tool: tool.command.to_string(),
        hint: tool.hint.to_string(),
    }
    .into()
}
