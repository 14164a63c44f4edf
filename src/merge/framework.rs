//! Per-platform `.framework` bundles.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::filesystem::{copy_dir_recursive, recreate_dir, remove_path, write_atomic};
use crate::error::BuildError;
use crate::process::{Cmd, Host};
use crate::target::Platform;

/// Bundle metadata shared by every framework of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo<'a> {
    pub identifier_prefix: &'a str,
    pub version: &'a str,
}

/// Static library file stem for a framework: `Libdovi` → `libdovi`,
/// `gmp` → `libgmp`.
pub fn library_stem(framework: &str) -> String {
    match framework.strip_prefix("Lib").or_else(|| framework.strip_prefix("lib")) {
        Some(rest) => format!("lib{rest}"),
        None => format!("lib{framework}"),
    }
}

/// `lib/<stem>.a`, falling back to `lib/<stem>.dylib`.
pub fn find_library(prefix: &Path, framework: &str) -> Option<PathBuf> {
    let stem = library_stem(framework);
    ["a", "dylib"]
        .iter()
        .map(|ext| prefix.join("lib").join(format!("{stem}.{ext}")))
        .find(|path| path.exists())
}

/// `include/<framework>` if present, else `include`.
pub fn find_headers(prefix: &Path, framework: &str) -> Option<PathBuf> {
    let nested = prefix.join("include").join(framework);
    if nested.is_dir() {
        return Some(nested);
    }
    let include = prefix.join("include");
    include.is_dir().then_some(include)
}

pub fn module_map(framework: &str, excluded_headers: &[String]) -> String {
    let excludes: String = excluded_headers
        .iter()
        .map(|header| format!("    exclude header \"{header}.h\"\n"))
        .collect();
    format!(
        "framework module {framework} [system] {{\n    umbrella \".\"\n{excludes}    export *\n}}"
    )
}

pub fn info_plist(framework: &str, bundle: &BundleInfo<'_>, platform: Platform) -> String {
    let identifier = format!("{}.{}", bundle.identifier_prefix, framework);
    let version = bundle.version;
    let min_version = platform.min_version();
    let sdk = platform.sdk();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
<key>CFBundleDevelopmentRegion</key>
<string>en</string>
<key>CFBundleExecutable</key>
<string>{framework}</string>
<key>CFBundleIdentifier</key>
<string>{identifier}</string>
<key>CFBundleInfoDictionaryVersion</key>
<string>6.0</string>
<key>CFBundleName</key>
<string>{framework}</string>
<key>CFBundlePackageType</key>
<string>FMWK</string>
<key>CFBundleShortVersionString</key>
<string>{version}</string>
<key>CFBundleVersion</key>
<string>{version}</string>
<key>CFBundleSignature</key>
<string>????</string>
<key>MinimumOSVersion</key>
<string>{min_version}</string>
<key>CFBundleSupportedPlatforms</key>
<array>
<string>{sdk}</string>
</array>
<key>NSPrincipalClass</key>
<string></string>
</dict>
</plist>"#
    )
}

/// Inputs for building one platform's bundle.
pub struct FrameworkJob<'a> {
    pub library: &'a str,
    pub framework: &'a str,
    pub platform: Platform,
    /// Install prefixes, one per architecture of the platform.
    pub prefixes: Vec<PathBuf>,
    pub bundle_dir: PathBuf,
    pub excluded_headers: &'a [String],
    pub log: PathBuf,
}

/// Assemble `<bundle_dir>` from the per-architecture prefixes.
///
/// Fails with [`BuildError::MissingArtifact`] when a prefix or its library
/// is missing; the partial bundle is removed so it can't be reused later.
pub fn create_framework(host: &dyn Host, job: &FrameworkJob<'_>, bundle: &BundleInfo<'_>) -> Result<PathBuf> {
    recreate_dir(&job.bundle_dir)?;
    match assemble(host, job, bundle) {
        Ok(()) => Ok(job.bundle_dir.clone()),
        Err(err) => {
            remove_path(&job.bundle_dir)?;
            Err(err)
        }
    }
}

fn assemble(host: &dyn Host, job: &FrameworkJob<'_>, bundle: &BundleInfo<'_>) -> Result<()> {
    let missing = |path: PathBuf| -> anyhow::Error {
        BuildError::MissingArtifact {
            framework: job.framework.to_string(),
            platform: job.platform.to_string(),
            path,
        }
        .into()
    };

    let mut libraries = Vec::with_capacity(job.prefixes.len());
    let mut headers = None;
    for prefix in &job.prefixes {
        if !prefix.is_dir() {
            return Err(missing(prefix.clone()));
        }
        let library = find_library(prefix, job.framework).ok_or_else(|| {
            missing(
                prefix
                    .join("lib")
                    .join(format!("{}.a", library_stem(job.framework))),
            )
        })?;
        libraries.push(library);
        // headers are copied once; the last architecture that has them wins
        if let Some(found) = find_headers(prefix, job.framework) {
            headers = Some(found);
        }
    }

    let binary = job.bundle_dir.join(job.framework);
    let mut lipo = Cmd::new("lipo").arg("-create");
    for library in &libraries {
        lipo = lipo.arg_path(library);
    }
    host.execute(
        &lipo
            .arg("-output")
            .arg_path(&binary)
            .log_to(&job.log)
            .scope(format!("{}:{}", job.library, job.platform)),
    )?;

    if let Some(headers) = headers {
        copy_dir_recursive(&headers, &job.bundle_dir.join("Headers"))?;
    }

    let modules = job.bundle_dir.join("Modules");
    fs::create_dir_all(&modules)
        .with_context(|| format!("creating {}", modules.display()))?;
    write_atomic(
        &modules.join("module.modulemap"),
        module_map(job.framework, job.excluded_headers).as_bytes(),
    )?;
    write_atomic(
        &job.bundle_dir.join("Info.plist"),
        info_plist(job.framework, bundle, job.platform).as_bytes(),
    )?;

    log::info!(
        "[merge:{}] {} bundle from {} architecture(s)",
        job.framework,
        job.platform,
        libraries.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CmdResult;
    use tempfile::TempDir;

    /// Host whose `lipo` writes the concatenated inputs to `-output`.
    struct LipoHost;

    impl Host for LipoHost {
        fn which(&self, _program: &str) -> Option<PathBuf> {
            None
        }

        fn execute(&self, cmd: &Cmd) -> Result<CmdResult> {
            let args = cmd.get_args();
            let out = args.iter().position(|a| a == "-output").unwrap();
            let mut data = Vec::new();
            for input in &args[1..out] {
                data.extend(fs::read(input).unwrap());
            }
            fs::write(&args[out + 1], data).unwrap();
            Ok(CmdResult::default())
        }
    }

    const BUNDLE: BundleInfo<'static> = BundleInfo {
        identifier_prefix: "com.kintan.ksplayer",
        version: "87.88.520",
    };

    fn prefix_with(root: &Path, arch: &str, lib_file: &str, header_dir: Option<&str>) -> PathBuf {
        let prefix = root.join("thin").join(arch);
        fs::create_dir_all(prefix.join("lib")).unwrap();
        fs::write(prefix.join("lib").join(lib_file), arch).unwrap();
        let include = match header_dir {
            Some(dir) => prefix.join("include").join(dir),
            None => prefix.join("include"),
        };
        fs::create_dir_all(&include).unwrap();
        fs::write(include.join("rpu_parser.h"), "// header").unwrap();
        prefix
    }

    fn job<'a>(root: &Path, prefixes: Vec<PathBuf>, excluded: &'a [String]) -> FrameworkJob<'a> {
        FrameworkJob {
            library: "libdovi",
            framework: "Libdovi",
            platform: Platform::Isimulator,
            prefixes,
            bundle_dir: root.join("Libdovi.framework"),
            excluded_headers: excluded,
            log: root.join("merge.log"),
        }
    }

    #[test]
    fn test_library_stem() {
        assert_eq!(library_stem("Libdovi"), "libdovi");
        assert_eq!(library_stem("libdovi"), "libdovi");
        assert_eq!(library_stem("gmp"), "libgmp");
    }

    #[test]
    fn test_find_library_prefers_static() {
        let temp = TempDir::new().unwrap();
        let prefix = prefix_with(temp.path(), "arm64", "libgmp.dylib", None);
        assert_eq!(
            find_library(&prefix, "gmp"),
            Some(prefix.join("lib/libgmp.dylib"))
        );
        fs::write(prefix.join("lib/libgmp.a"), "a").unwrap();
        assert_eq!(find_library(&prefix, "gmp"), Some(prefix.join("lib/libgmp.a")));
    }

    #[test]
    fn test_module_map_text() {
        assert_eq!(
            module_map("gnutls", &["gnutlsxx".to_string()]),
            "framework module gnutls [system] {\n    umbrella \".\"\n    exclude header \"gnutlsxx.h\"\n    export *\n}"
        );
        assert_eq!(
            module_map("dav1d", &[]),
            "framework module dav1d [system] {\n    umbrella \".\"\n    export *\n}"
        );
    }

    #[test]
    fn test_info_plist_fields() {
        let plist = info_plist("Libdovi", &BUNDLE, Platform::Tvos);
        assert!(plist.contains("<string>com.kintan.ksplayer.Libdovi</string>"));
        assert!(plist.contains("<key>MinimumOSVersion</key>\n<string>13.0</string>"));
        assert!(plist.contains("<array>\n<string>AppleTVOS</string>\n</array>"));
        assert!(plist.contains("<key>CFBundleVersion</key>\n<string>87.88.520</string>"));
    }

    #[test]
    fn test_create_framework_layout() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let prefixes = vec![
            prefix_with(root, "arm64", "libdovi.a", Some("Libdovi")),
            prefix_with(root, "x86_64", "libdovi.a", Some("Libdovi")),
        ];
        let job = job(root, prefixes, &[]);

        let bundle = create_framework(&LipoHost, &job, &BUNDLE).unwrap();

        assert_eq!(fs::read_to_string(bundle.join("Libdovi")).unwrap(), "arm64x86_64");
        assert!(bundle.join("Headers/rpu_parser.h").exists());
        assert!(bundle.join("Modules/module.modulemap").exists());
        assert!(bundle.join("Info.plist").exists());
    }

    #[test]
    fn test_create_framework_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let prefixes = vec![
            prefix_with(root, "arm64", "libdovi.a", None),
            prefix_with(root, "x86_64", "libdovi.a", None),
        ];
        let excluded = vec!["dovi_internal".to_string()];
        let job = job(root, prefixes, &excluded);

        let read = |bundle: &Path| {
            (
                fs::read(bundle.join("Libdovi")).unwrap(),
                fs::read(bundle.join("Modules/module.modulemap")).unwrap(),
                fs::read(bundle.join("Info.plist")).unwrap(),
                fs::read(bundle.join("Headers/rpu_parser.h")).unwrap(),
            )
        };
        let first = read(&create_framework(&LipoHost, &job, &BUNDLE).unwrap());
        let second = read(&create_framework(&LipoHost, &job, &BUNDLE).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_headers_come_from_last_architecture() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let prefixes = vec![
            prefix_with(root, "arm64", "libdovi.a", None),
            prefix_with(root, "x86_64", "libdovi.a", None),
        ];
        fs::write(prefixes[1].join("include/rpu_parser.h"), "// x86_64").unwrap();
        let job = job(root, prefixes, &[]);

        let bundle = create_framework(&LipoHost, &job, &BUNDLE).unwrap();
        assert_eq!(
            fs::read_to_string(bundle.join("Headers/rpu_parser.h")).unwrap(),
            "// x86_64"
        );
    }

    #[test]
    fn test_missing_prefix_is_missing_artifact() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let prefixes = vec![
            prefix_with(root, "arm64", "libdovi.a", None),
            root.join("thin/x86_64"),
        ];
        let job = job(root, prefixes, &[]);

        let err = create_framework(&LipoHost, &job, &BUNDLE).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingArtifact { .. })
        ));
        assert!(!job.bundle_dir.exists());
    }

    #[test]
    fn test_missing_library_file_is_missing_artifact() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let prefixes = vec![prefix_with(root, "arm64", "libother.a", None)];
        let job = job(root, prefixes, &[]);

        let err = create_framework(&LipoHost, &job, &BUNDLE).unwrap_err();
        assert!(err.to_string().contains("libdovi.a"));
    }
}
