use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::adapter::BuildSystemKind;
use crate::target::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Building,
    Success,
    Aborted,
}

/// `<library>/run-manifest.json`, rewritten at the start and end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub library: String,
    pub version: String,
    pub build_system: Option<BuildSystemKind>,
    pub platforms: Vec<Platform>,
    /// `library:platform:arch` of every target in the matrix.
    pub targets: Vec<String>,
    pub status: RunStatus,
    pub created_at_utc: String,
    pub finished_at_utc: Option<String>,
    /// Target whose build aborted the run.
    pub failed_target: Option<String>,
    pub error: Option<String>,
    /// Packages written under `Sources/`.
    pub packages: Vec<String>,
}

impl RunManifest {
    pub fn started(library: &str, version: &str, platforms: &[Platform], targets: Vec<String>) -> Result<Self> {
        Ok(Self {
            library: library.to_string(),
            version: version.to_string(),
            build_system: None,
            platforms: platforms.to_vec(),
            targets,
            status: RunStatus::Building,
            created_at_utc: now_utc()?,
            finished_at_utc: None,
            failed_target: None,
            error: None,
            packages: Vec::new(),
        })
    }

    pub fn finish_success(&mut self, packages: Vec<String>) -> Result<()> {
        self.status = RunStatus::Success;
        self.packages = packages;
        self.finished_at_utc = Some(now_utc()?);
        Ok(())
    }

    pub fn finish_aborted(&mut self, failed_target: Option<String>, error: &anyhow::Error) -> Result<()> {
        self.status = RunStatus::Aborted;
        self.failed_target = failed_target;
        self.error = Some(format!("{error:#}"));
        self.finished_at_utc = Some(now_utc()?);
        Ok(())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
            .with_context(|| format!("writing run manifest '{}'", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("reading run manifest '{}'", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing run manifest '{}'", path.display()))
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).with_context(|| "serializing run manifest")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

/// RFC 3339 UTC timestamp with second precision.
pub(crate) fn now_utc() -> Result<String> {
    let now = OffsetDateTime::now_utc();
    Ok(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_roundtrip_through_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("libdovi/run-manifest.json");
        let mut manifest = RunManifest::started(
            "libdovi",
            "libdovi-3.3.0",
            &[Platform::Ios],
            vec!["libdovi:ios:arm64".into()],
        )
        .unwrap();
        manifest.build_system = Some(BuildSystemKind::Cargo);
        manifest.write(&path).unwrap();
        assert_eq!(RunManifest::load(&path).unwrap().status, RunStatus::Building);

        manifest
            .finish_success(vec!["Libdovi.xcframework".into()])
            .unwrap();
        manifest.write(&path).unwrap();

        let loaded = RunManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.finished_at_utc.is_some());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"status\": \"success\""));
        assert!(raw.contains("\"build_system\": \"cargo\""));
    }

    #[test]
    fn test_aborted_records_failure() {
        let mut manifest = RunManifest::started("gmp", "6.2", &[], vec![]).unwrap();
        let err = anyhow!("make failed");
        manifest
            .finish_aborted(Some("gmp:ios:arm64".into()), &err)
            .unwrap();
        assert_eq!(manifest.status, RunStatus::Aborted);
        assert_eq!(manifest.failed_target.as_deref(), Some("gmp:ios:arm64"));
        assert_eq!(manifest.error.as_deref(), Some("make failed"));
    }

    #[test]
    fn test_now_utc_shape() {
        let ts = now_utc().unwrap();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }
}
