//! CMake, configured out of tree with the Makefile generator.

use anyhow::Result;

use super::{BuildContext, MAKE_JOBS};

pub(super) fn configure_args(ctx: &BuildContext<'_>) -> Vec<String> {
    // Minimum OS versions reach CMake through the `-target` in CFLAGS.
    let mut args = vec![
        ctx.source_dir.display().to_string(),
        "-DCMAKE_VERBOSE_MAKEFILE=0".to_string(),
        "-DCMAKE_BUILD_TYPE=Release".to_string(),
        format!(
            "-DCMAKE_OSX_SYSROOT={}",
            ctx.target.platform.sdk().to_lowercase()
        ),
        format!("-DCMAKE_OSX_ARCHITECTURES={}", ctx.target.arch.name()),
        format!("-DCMAKE_INSTALL_PREFIX={}", ctx.prefix.display()),
        "-DBUILD_SHARED_LIBS=0".to_string(),
    ];
    args.extend(ctx.library.configure_args.iter().cloned());
    args
}

pub(super) fn build(ctx: &BuildContext<'_>) -> Result<()> {
    ctx.run(ctx.cmd("cmake").args(configure_args(ctx)))?;
    ctx.run(ctx.cmd("make").arg(MAKE_JOBS))?;
    ctx.run(ctx.cmd("make").args([MAKE_JOBS, "install"]))?;
    Ok(())
}
