//! Projects driven by a bundled waf script (samba's libsmbclient).
//!
//! waf configures and builds inside the source tree, so the orchestrator
//! builds these libraries one target at a time.

use anyhow::Result;

use super::BuildContext;
use crate::process::Cmd;

const PYTHON: &str = "python3";

fn waf(ctx: &BuildContext<'_>) -> Cmd {
    ctx.cmd(PYTHON)
        .arg(ctx.library.waf_script())
        .dir(&ctx.source_dir)
}

pub(super) fn build(ctx: &BuildContext<'_>) -> Result<()> {
    ctx.run(waf(ctx).arg("distclean"))?;
    ctx.run(
        waf(ctx)
            .arg("configure")
            .arg(format!("--prefix={}", ctx.prefix.display()))
            .args(ctx.library.configure_args.iter().cloned()),
    )?;
    for target in &ctx.library.waf_targets {
        ctx.run(waf(ctx).arg(format!("--targets={target}")))?;
    }
    ctx.run(waf(ctx).arg("build"))?;
    ctx.run(waf(ctx).arg("install"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::Library;
    use tempfile::TempDir;

    #[test]
    fn test_waf_sequence() {
        let temp = TempDir::new().unwrap();
        let host = RecordingHost::default();
        let mut lib = Library::new("libsmbclient", "samba-4.15.13", "u");
        lib.waf_script = Some("./buildtools/bin/waf".into());
        lib.waf_targets = vec!["client/smbclient".into()];
        lib.configure_args = vec!["--without-ad-dc".into()];
        let target = ios_target("libsmbclient");
        let ctx = context(&host, &lib, &target, temp.path());

        build(&ctx).unwrap();

        let lines = host.lines();
        assert_eq!(
            lines,
            vec![
                "python3 ./buildtools/bin/waf distclean".to_string(),
                format!(
                    "python3 ./buildtools/bin/waf configure --prefix={} --without-ad-dc",
                    ctx.prefix.display()
                ),
                "python3 ./buildtools/bin/waf --targets=client/smbclient".to_string(),
                "python3 ./buildtools/bin/waf build".to_string(),
                "python3 ./buildtools/bin/waf install".to_string(),
            ]
        );
        let commands = host.commands.lock().unwrap();
        assert!(commands.iter().all(|c| c.get_dir() == Some(ctx.source_dir.as_path())));
    }
}
