use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Arm64,
    X86_64,
    Arm64e,
}

/// Derived properties of an architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchInfo {
    /// Name passed to `-arch` and `lipo`.
    pub name: &'static str,
    /// CPU family as written in target triples and meson `cpu_family`.
    pub cpu_family: &'static str,
    /// CPU as written in `-target` deployment strings and meson `cpu`.
    pub target_cpu: &'static str,
    /// CPU component of the Rust target triple.
    pub triple_cpu: &'static str,
}

const ARM64: ArchInfo = ArchInfo {
    name: "arm64",
    cpu_family: "aarch64",
    target_cpu: "arm64",
    triple_cpu: "aarch64",
};

const X86_64: ArchInfo = ArchInfo {
    name: "x86_64",
    cpu_family: "x86_64",
    target_cpu: "x86_64",
    triple_cpu: "x86_64",
};

const ARM64E: ArchInfo = ArchInfo {
    name: "arm64e",
    cpu_family: "aarch64",
    target_cpu: "arm64",
    triple_cpu: "arm64e",
};

impl Arch {
    pub const ALL: [Arch; 3] = [Arch::Arm64, Arch::X86_64, Arch::Arm64e];

    pub fn info(self) -> &'static ArchInfo {
        match self {
            Arch::Arm64 => &ARM64,
            Arch::X86_64 => &X86_64,
            Arch::Arm64e => &ARM64E,
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn cpu_family(self) -> &'static str {
        self.info().cpu_family
    }

    pub fn target_cpu(self) -> &'static str {
        self.info().target_cpu
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Arch::ALL
            .into_iter()
            .find(|arch| arch.name() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown architecture '{s}'"))
    }
}
