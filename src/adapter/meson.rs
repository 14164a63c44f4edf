//! Meson + Ninja, cross-compiling through a generated cross file.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::BuildContext;
use crate::target::BuildTarget;
use crate::toolchain::{ToolchainEnvironment, C_COMPILER, CXX_COMPILER};

pub const CROSS_FILE: &str = "crossFile.meson";

fn quoted_list(flags: &[String]) -> String {
    flags
        .iter()
        .map(|f| format!("'{f}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the cross file for one target.
pub fn cross_file(
    target: &BuildTarget,
    toolchain: &ToolchainEnvironment,
    prefix: &Path,
    ar: &Path,
    strip: &Path,
) -> String {
    let cflags = quoted_list(&toolchain.cflags);
    let ldflags = quoted_list(&toolchain.ldflags);
    let languages = ["c", "cpp", "objc", "objcpp"];
    let args: String = languages
        .iter()
        .map(|lang| format!("{lang}_args = [{cflags}]\n"))
        .collect();
    let link_args: String = languages
        .iter()
        .map(|lang| format!("{lang}_link_args = [{ldflags}]\n"))
        .collect();

    format!(
        "[binaries]\n\
         c = '{C_COMPILER}'\n\
         cpp = '{CXX_COMPILER}'\n\
         objc = '{C_COMPILER}'\n\
         objcpp = '{CXX_COMPILER}'\n\
         ar = '{ar}'\n\
         strip = '{strip}'\n\
         pkg-config = 'pkg-config'\n\
         \n\
         [properties]\n\
         has_function_printf = true\n\
         has_function_hfkerhisadf = false\n\
         \n\
         [host_machine]\n\
         system = 'darwin'\n\
         subsystem = '{subsystem}'\n\
         kernel = 'xnu'\n\
         cpu_family = '{cpu_family}'\n\
         cpu = '{cpu}'\n\
         endian = 'little'\n\
         \n\
         [built-in options]\n\
         default_library = 'static'\n\
         buildtype = 'release'\n\
         prefix = '{prefix}'\n\
         {args}{link_args}",
        ar = ar.display(),
        strip = strip.display(),
        subsystem = target.platform.info().meson_subsystem,
        cpu_family = target.arch.cpu_family(),
        cpu = target.arch.target_cpu(),
        prefix = prefix.display(),
    )
}

fn write_cross_file(ctx: &BuildContext<'_>) -> Result<PathBuf> {
    let platform = ctx.target.platform;
    let ar = ctx.sdk.find_tool(platform, "ar")?;
    let strip = ctx.sdk.find_tool(platform, "strip")?;
    let path = ctx.scratch_dir.join(CROSS_FILE);
    fs::write(
        &path,
        cross_file(ctx.target, &ctx.toolchain, &ctx.prefix, &ar, &strip),
    )
    .with_context(|| format!("writing meson cross file '{}'", path.display()))?;
    Ok(path)
}

pub(super) fn build(ctx: &BuildContext<'_>) -> Result<()> {
    let cross = write_cross_file(ctx)?;

    ctx.run(
        ctx.cmd("meson")
            .arg("setup")
            .arg_path(&ctx.scratch_dir)
            .arg(format!("--cross-file={}", cross.display()))
            .args(ctx.library.configure_args.iter().cloned())
            .dir(&ctx.source_dir),
    )?;
    ctx.run(ctx.cmd("meson").args(["compile", "--clean"]))?;
    ctx.run(ctx.cmd("meson").args(["compile", "--verbose"]))?;
    ctx.run(ctx.cmd("meson").arg("install"))?;
    Ok(())
}
