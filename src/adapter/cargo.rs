//! Rust crates exposing a C ABI, built with `cargo cinstall`.

use anyhow::Result;

use super::BuildContext;

pub(super) fn args(ctx: &BuildContext<'_>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(toolchain) = &ctx.library.rust_toolchain {
        args.push(format!("+{toolchain}"));
    }
    args.extend([
        "cinstall".to_string(),
        "-Zbuild-std=std,panic_abort".to_string(),
        "--release".to_string(),
        format!("--prefix={}", ctx.prefix.display()),
        format!("--target={}", ctx.toolchain.triple),
    ]);
    args.extend(ctx.library.configure_args.iter().cloned());
    args
}

pub(super) fn build(ctx: &BuildContext<'_>) -> Result<()> {
    ctx.run(ctx.cmd("cargo").args(args(ctx)).dir(&ctx.source_dir))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::Library;
    use crate::target::{Arch, BuildTarget, Platform};
    use tempfile::TempDir;

    #[test]
    fn test_cinstall_command() {
        let temp = TempDir::new().unwrap();
        let host = RecordingHost::default();
        let mut lib = Library::new("libdovi", "libdovi-3.3.0", "u");
        lib.rust_toolchain = Some("stage1".into());
        let target = BuildTarget::new("libdovi", Platform::Isimulator, Arch::X86_64);
        let ctx = context(&host, &lib, &target, temp.path());

        build(&ctx).unwrap();

        let commands = host.commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].to_string(),
            format!(
                "cargo +stage1 cinstall -Zbuild-std=std,panic_abort --release --prefix={} --target=x86_64-apple-ios",
                ctx.prefix.display()
            )
        );
        assert_eq!(commands[0].get_dir(), Some(ctx.source_dir.as_path()));
    }

    #[test]
    fn test_default_toolchain_has_no_plus_arg() {
        let temp = TempDir::new().unwrap();
        let host = RecordingHost::default();
        let lib = Library::new("libdovi", "1", "u");
        let target = ios_target("libdovi");
        let ctx = context(&host, &lib, &target, temp.path());

        assert_eq!(args(&ctx)[0], "cinstall");
    }
}
