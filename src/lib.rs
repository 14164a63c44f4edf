//! Cross-compiles native libraries for Apple platforms and packages them as
//! xcframeworks.
//!
//! A library is cloned at a pinned version, built once per
//! (platform, architecture) target with whatever build system it uses, and
//! the per-architecture installs are merged into one framework per platform
//! and one `.xcframework` per distributable unit.
//!
//! - **Targets** - platform and architecture tables, matrix expansion
//! - **Toolchain** - per-target flags, triples and child environment
//! - **Adapters** - autotools, CMake, Meson, Cargo and waf drivers
//! - **Merging** - `lipo`, framework bundles, `xcodebuild -create-xcframework`
//! - **Orchestration** - fetch, clean, parallel build, merge, release hook
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     │
//!     ├── target::enumerate ──> BuildTarget × N
//!     ├── toolchain::Resolver ─> ToolchainEnvironment per target
//!     ├── adapter::build ─────> <library>/<platform>/thin/<arch>/
//!     ├── merge::Merger ──────> <library>/<platform>/<Fw>.framework
//!     │                         ../Sources/<Fw>.xcframework
//!     └── release ────────────> ../Release/
//! ```
//!
//! All external tools run through [`process::Host`], so the whole pipeline
//! can be driven by a recording host in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use xcframework_builder::{BuildConfig, BuildOptions, Layout, Orchestrator, Platform, SystemHost};
//!
//! let config = BuildConfig::default();
//! let options = BuildOptions { platforms: vec![Platform::Ios], jobs: None };
//! let orchestrator = Orchestrator::new(&SystemHost, &config, Layout::new("Script"), options);
//! orchestrator.run(&config.default_libraries())?;
//! ```

pub mod adapter;
pub mod artifact;
pub mod config;
pub mod error;
pub mod layout;
pub mod merge;
pub mod orchestrator;
pub mod preflight;
pub mod process;
pub mod release;
pub mod run_manifest;
pub mod target;
pub mod toolchain;

pub use adapter::BuildSystemKind;
pub use config::{BuildConfig, Library};
pub use error::BuildError;
pub use layout::Layout;
pub use orchestrator::{BuildOptions, BuildReport, Orchestrator};
pub use process::{Cmd, CmdResult, Host, SystemHost};
pub use target::{Arch, BuildTarget, Platform};
