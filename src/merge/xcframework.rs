//! Multi-platform `.xcframework` packages.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::filesystem::remove_path;
use crate::process::{Cmd, Host};

pub fn create_xcframework_cmd(bundles: &[PathBuf], output: &Path) -> Cmd {
    let mut cmd = Cmd::new("xcodebuild").arg("-create-xcframework");
    for bundle in bundles {
        cmd = cmd.arg("-framework").arg_path(bundle);
    }
    cmd.arg("-output").arg_path(output)
}

/// Replace `output` with a package of `bundles`.
pub fn create_xcframework(host: &dyn Host, bundles: &[PathBuf], output: &Path, log: &Path, scope: &str) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    remove_path(output)?;
    host.execute(
        &create_xcframework_cmd(bundles, output)
            .log_to(log)
            .scope(scope),
    )?;
    log::info!("[merge:{scope}] packaged {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_lists_every_bundle() {
        let cmd = create_xcframework_cmd(
            &[
                PathBuf::from("gmp/ios/gmp.framework"),
                PathBuf::from("gmp/macos/gmp.framework"),
            ],
            Path::new("../Sources/gmp.xcframework"),
        );
        assert_eq!(
            cmd.to_string(),
            "xcodebuild -create-xcframework -framework gmp/ios/gmp.framework -framework gmp/macos/gmp.framework -output ../Sources/gmp.xcframework"
        );
    }
}
