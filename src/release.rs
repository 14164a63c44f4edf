//! Release packaging run after a successful merge.
//!
//! Produces `../Release/` with each xcframework zipped and a tarball of the
//! static libraries and headers:
//!
//! ```text
//! Release/<Fw>.xcframework
//! Release/<Fw>.xcframework.zip
//! Release/<library>/lib/<platform>/thin/<arch>/lib/*.a
//! Release/<library>/include/
//! Release/<library>-<version>.tar
//! ```

use anyhow::Result;
use std::path::PathBuf;

use crate::artifact::archive::create_tar;
use crate::artifact::filesystem::{copy_dir_recursive, prune, recreate_dir};
use crate::config::Library;
use crate::layout::{Layout, MANIFEST_FILE};
use crate::merge::Package;
use crate::process::{Cmd, Host};
use crate::target::Platform;

/// Entry names dropped from the copied library tree.
fn is_build_leftover(name: &str) -> bool {
    name.ends_with(".framework")
        || name.ends_with(".dylib")
        || matches!(name, "pkgconfig" | "include" | "scratch" | MANIFEST_FILE)
}

fn is_host_junk(name: &str) -> bool {
    name.ends_with(".log") || name == ".DS_Store"
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseArtifacts {
    pub dir: PathBuf,
    pub zips: Vec<PathBuf>,
    pub tarball: PathBuf,
}

/// Headers of the first installed target, in platform table order.
fn first_include_dir(layout: &Layout, library: &str) -> Option<PathBuf> {
    Platform::ALL.iter().find_map(|platform| {
        platform.architectures().iter().find_map(|arch| {
            let include = layout
                .install_prefix(library, *platform, *arch)
                .join("include");
            include.is_dir().then_some(include)
        })
    })
}

pub fn package_release(
    host: &dyn Host,
    layout: &Layout,
    library: &Library,
    packages: &[Package],
) -> Result<ReleaseArtifacts> {
    let release = layout.release_dir();
    let workdir = release.join(&library.name);
    recreate_dir(&release)?;
    recreate_dir(&workdir)?;

    for package in packages {
        let name = format!("{}.xcframework", package.framework);
        copy_dir_recursive(&package.path, &release.join(&name))?;
    }

    copy_dir_recursive(&layout.library_dir(&library.name), &workdir.join("lib"))?;
    if let Some(include) = first_include_dir(layout, &library.name) {
        copy_dir_recursive(&include, &workdir.join("include"))?;
    }
    prune(&workdir.join("lib"), is_build_leftover)?;
    prune(&release, is_host_junk)?;

    let log = layout.merge_log(&library.name);
    let mut zips = Vec::new();
    for package in packages {
        let name = format!("{}.xcframework", package.framework);
        let zip = format!("{name}.zip");
        host.execute(
            &Cmd::new("zip")
                .args(["-qr", zip.as_str(), name.as_str()])
                .dir(&release)
                .log_to(&log)
                .scope(format!("{}:release", library.name)),
        )?;
        zips.push(release.join(zip));
    }

    let tarball = release.join(format!(
        "{}-{}.tar",
        library.name,
        library.release_version()
    ));
    create_tar(&workdir, &library.name, &tarball)?;

    log::info!("[release:{}] wrote {}", library.name, tarball.display());
    Ok(ReleaseArtifacts {
        dir: release,
        zips,
        tarball,
    })
}
