//! Artifact helpers shared by the merger and the release hook.
//!
//! - [`filesystem`] - directory copying, pruning, atomic writes
//! - [`archive`] - deterministic tarballs

pub mod archive;
pub mod filesystem;
