//! Typed failures the orchestrator reports.
//!
//! Everything else travels as `anyhow::Error` with context; these variants
//! exist so callers (and tests) can tell the three failure classes apart with
//! `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A host tool is absent and cannot be installed automatically.
    #[error("missing prerequisite `{tool}`: {hint}")]
    MissingPrerequisite { tool: String, hint: String },

    /// An external command exited non-zero while building a target.
    #[error("{target}: `{program}` failed with exit code {code}; see log {}", log.display())]
    CommandFailed {
        target: String,
        program: String,
        code: i32,
        log: PathBuf,
    },

    /// An expected per-architecture artifact was not found while merging.
    #[error("missing artifact for {framework} ({platform}): {}", path.display())]
    MissingArtifact {
        framework: String,
        platform: String,
        path: PathBuf,
    },
}
