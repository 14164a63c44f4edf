//! A host that records commands and fakes the files real tools would leave
//! behind, so whole builds run without Xcode.

use anyhow::Result;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use xcframework_builder::{Cmd, CmdResult, Host};

#[derive(Default)]
pub struct FakeHost {
    /// Programs `which` reports as absent.
    pub missing: BTreeSet<String>,
    /// Files `git clone` drops into the checkout.
    pub checkout_files: Vec<String>,
    /// Static library name installers produce, e.g. `libzvbi.a`.
    pub lib_file: String,
    /// Fail every run of this program under the given scope.
    pub fail_on: Option<(String, String)>,
    pub commands: Mutex<Vec<Cmd>>,
}

impl FakeHost {
    pub fn new(lib_file: &str) -> Self {
        Self {
            lib_file: lib_file.to_string(),
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<Cmd> {
        self.commands.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| c.program().to_string())
            .collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.program() == program)
            .count()
    }

    fn install(&self, prefix: &Path) {
        fs::create_dir_all(prefix.join("lib/pkgconfig")).unwrap();
        fs::create_dir_all(prefix.join("include")).unwrap();
        fs::write(prefix.join("lib").join(&self.lib_file), "static").unwrap();
        fs::write(prefix.join("include/api.h"), "// api").unwrap();
    }
}

fn arg_value<'a>(cmd: &'a Cmd, key: &str) -> Option<&'a str> {
    cmd.get_args().iter().find_map(|a| a.strip_prefix(key))
}

/// `<platform>/scratch/<arch>` → `<platform>/thin/<arch>`.
fn prefix_from_scratch(dir: &Path) -> PathBuf {
    let arch = dir.file_name().unwrap();
    dir.parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("thin")
        .join(arch)
}

impl Host for FakeHost {
    fn which(&self, program: &str) -> Option<PathBuf> {
        (!self.missing.contains(program)).then(|| Path::new("/usr/local/bin").join(program))
    }

    fn execute(&self, cmd: &Cmd) -> Result<CmdResult> {
        self.commands.lock().unwrap().push(cmd.clone());

        if let Some((program, scope)) = &self.fail_on {
            if cmd.program() == program && cmd.get_scope() == Some(scope.as_str()) {
                return Err(cmd.failure(2));
            }
        }

        let args = cmd.get_args();
        let mut stdout = String::new();
        match cmd.program() {
            "git" => {
                let checkout = PathBuf::from(args.last().unwrap());
                fs::create_dir_all(&checkout).unwrap();
                for file in &self.checkout_files {
                    fs::write(checkout.join(file), "").unwrap();
                }
            }
            "xcrun" if args.iter().any(|a| a == "--show-sdk-path") => {
                stdout = format!("/SDKs/{}.sdk", args[1]);
            }
            "xcrun" => {
                stdout = format!("/usr/bin/{}", args.last().unwrap());
            }
            "pkg-config" => stdout = "/usr/lib/pkgconfig:/usr/share/pkgconfig".to_string(),
            "cargo" => {
                let prefix = arg_value(cmd, "--prefix=").unwrap();
                self.install(Path::new(prefix));
            }
            "make" | "meson" if args.iter().any(|a| a == "install") => {
                self.install(&prefix_from_scratch(cmd.get_dir().unwrap()));
            }
            "lipo" => fs::write(args.last().unwrap(), "fat").unwrap(),
            "xcodebuild" => fs::create_dir_all(args.last().unwrap()).unwrap(),
            "zip" => fs::write(cmd.get_dir().unwrap().join(&args[1]), "zip").unwrap(),
            _ => {}
        }
        Ok(CmdResult { stdout })
    }
}
