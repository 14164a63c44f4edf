//! Deterministic tar archives.
//!
//! Entries are sorted by relative path and stamped with mtime 0 and uid/gid
//! 0, so archiving the same tree twice yields identical bytes.

use anyhow::{Context, Result};
use std::fs::{self, File, Metadata};
use std::path::{Path, PathBuf};
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

/// Write `src_dir` to an uncompressed tar at `out_path`, with every entry
/// under the top-level directory `root_name`.
pub fn create_tar(src_dir: &Path, root_name: &str, out_path: &Path) -> Result<()> {
    let out = File::create(out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    let mut builder = TarBuilder::new(out);

    let mut entries: Vec<PathBuf> = vec![];
    for ent in WalkDir::new(src_dir).follow_links(false) {
        let ent = ent.with_context(|| format!("Failed to walk {}", src_dir.display()))?;
        entries.push(ent.path().to_path_buf());
    }
    entries.sort_by(|a, b| {
        let ra = a.strip_prefix(src_dir).unwrap_or(a).to_string_lossy();
        let rb = b.strip_prefix(src_dir).unwrap_or(b).to_string_lossy();
        ra.cmp(&rb)
    });

    for p in entries {
        let rel = p.strip_prefix(src_dir).unwrap_or(&p);
        let name = if rel.as_os_str().is_empty() {
            root_name.to_string()
        } else {
            format!("{}/{}", root_name, rel.to_string_lossy().replace('\\', "/"))
        };

        let md = fs::symlink_metadata(&p)?;
        if md.is_dir() {
            let mut header = header_for(tar::EntryType::Directory, 0, entry_mode(&md, 0o755));
            header.set_cksum();
            builder.append_data(&mut header, name, std::io::empty())?;
        } else if md.file_type().is_symlink() {
            let target = fs::read_link(&p)?;
            let mut header = header_for(tar::EntryType::Symlink, 0, entry_mode(&md, 0o777));
            header.set_link_name(&target)?;
            header.set_cksum();
            builder.append_data(&mut header, name, std::io::empty())?;
        } else if md.is_file() {
            let mut f = File::open(&p)?;
            let mut header = header_for(tar::EntryType::Regular, md.len(), entry_mode(&md, 0o644));
            header.set_cksum();
            builder.append_data(&mut header, name, &mut f)?;
        }
    }

    builder
        .into_inner()
        .with_context(|| "Failed to finalize tar builder")?;
    Ok(())
}

fn header_for(kind: tar::EntryType, size: u64, mode: u32) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header
}

/// Permission bits to record: the file's own on unix, `fallback` elsewhere.
#[cfg(unix)]
fn entry_mode(md: &Metadata, _fallback: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode()
}

#[cfg(not(unix))]
fn entry_mode(_md: &Metadata, fallback: u32) -> u32 {
    fallback
}
