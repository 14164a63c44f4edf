//! GNU autotools: `configure && make && make install`, out of tree.

use anyhow::Result;
use std::path::Path;

use super::{BuildContext, MAKE_JOBS};
use crate::process::{ensure_exists, Cmd};

/// A script in the source tree, run with the target's toolchain environment
/// and logged to the once-per-library `log`.
fn script(ctx: &BuildContext<'_>, path: &Path, log: &Path) -> Cmd {
    ctx.cmd(path.display().to_string())
        .dir(&ctx.source_dir)
        .log_to(log)
}

/// Generate `configure` if the checkout doesn't ship one.
pub(super) fn prepare(ctx: &BuildContext<'_>, log: &Path) -> Result<()> {
    let source_dir = &ctx.source_dir;
    let autogen = source_dir.join("autogen.sh");
    if autogen.exists() {
        log::info!("[{}] running autogen.sh", ctx.library.name);
        ctx.run(script(ctx, &autogen, log).env("NOCONFIGURE", "1"))?;
    }

    if !source_dir.join("configure").exists() {
        let bootstrap = ["bootstrap", ".bootstrap"]
            .iter()
            .map(|name| source_dir.join(name))
            .find(|path| path.exists());
        if let Some(bootstrap) = bootstrap {
            log::info!("[{}] running {}", ctx.library.name, bootstrap.display());
            ctx.run(script(ctx, &bootstrap, log))?;
        }
    }
    Ok(())
}

pub(super) fn build(ctx: &BuildContext<'_>) -> Result<()> {
    let configure = ctx.source_dir.join("configure");
    ensure_exists(&configure, "configure script")?;

    ctx.run(
        ctx.cmd(configure.display().to_string())
            .arg(format!("--prefix={}", ctx.prefix.display()))
            .args(ctx.library.configure_args.iter().cloned()),
    )?;
    ctx.run(ctx.cmd("make").arg(MAKE_JOBS))?;
    ctx.run(ctx.cmd("make").args([MAKE_JOBS, "install"]))?;
    Ok(())
}
