//! External command execution.
//!
//! Every compiler, build-system driver and packaging tool is run through
//! [`Cmd`], a plain description of one invocation, executed by a [`Host`].
//! [`SystemHost`] spawns real processes; tests substitute a recording host.
//!
//! Child processes do not inherit the parent environment. They see `HOME`,
//! a default `PATH` (unless the command sets one) and whatever the command
//! adds explicitly, so two targets never leak flags into each other.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::BuildError;

/// One external command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: BTreeMap<String, String>,
    dir: Option<PathBuf>,
    log: Option<PathBuf>,
    scope: Option<String>,
    error_msg: Option<String>,
}

/// Captured result of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdResult {
    pub stdout: String,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.display().to_string());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, envs: &BTreeMap<String, String>) -> Self {
        self.envs
            .extend(envs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Append the command line and its output to `log`.
    pub fn log_to(mut self, log: &Path) -> Self {
        self.log = Some(log.to_path_buf());
        self
    }

    /// Label used in failure reports, typically `library:platform:arch`.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.envs.get(key).map(String::as_str)
    }

    pub fn get_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn get_log(&self) -> Option<&Path> {
        self.log.as_deref()
    }

    pub fn get_scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Environment the child process actually receives.
    pub fn child_environment(&self) -> BTreeMap<String, String> {
        let mut environment = self.envs.clone();
        let home = home_dir();
        if let Some(home) = &home {
            environment.insert("HOME".to_string(), home.clone());
        }
        if !environment.contains_key("PATH") {
            environment.insert(
                "PATH".to_string(),
                default_path(home.as_deref().unwrap_or_default()),
            );
        }
        environment
    }

    /// Turn a non-zero exit into the appropriate error.
    pub fn failure(&self, code: i32) -> anyhow::Error {
        match (&self.scope, &self.log) {
            (Some(scope), Some(log)) => BuildError::CommandFailed {
                target: scope.clone(),
                program: self.program.clone(),
                code,
                log: log.clone(),
            }
            .into(),
            _ => anyhow::anyhow!(
                "{} (exit code {code}): {self}",
                self.error_msg
                    .as_deref()
                    .unwrap_or("external command failed")
            ),
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// `PATH` handed to children that don't set their own.
pub fn default_path(home: &str) -> String {
    format!("{home}/.cargo/bin:/opt/homebrew/bin:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin")
}

fn home_dir() -> Option<String> {
    std::env::var_os("HOME")
        .or_else(|| dirs::home_dir().map(Into::into))
        .map(|home| home.to_string_lossy().into_owned())
}

/// Look `program` up in the same `PATH` children get, so a tool found here
/// is the tool that runs.
pub fn find_program(program: &str, home: &str) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    which::which_in(program, Some(default_path(home)), cwd).ok()
}

/// The machine commands run on.
pub trait Host: Send + Sync {
    /// Locate a program on the host, `None` if it is not installed.
    fn which(&self, program: &str) -> Option<PathBuf>;

    /// Run a command to completion. Errors on spawn failure or non-zero exit.
    fn execute(&self, cmd: &Cmd) -> Result<CmdResult>;
}

/// Runs commands on the local machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl Host for SystemHost {
    fn which(&self, program: &str) -> Option<PathBuf> {
        find_program(program, home_dir().as_deref().unwrap_or_default())
    }

    fn execute(&self, cmd: &Cmd) -> Result<CmdResult> {
        let environment = cmd.child_environment();
        let log = match cmd.get_log() {
            Some(path) => Some(Arc::new(Mutex::new(open_log(path)?))),
            None => None,
        };

        let mut header = format!("{cmd}");
        if let Some(dir) = cmd.get_dir() {
            header.push_str(&format!(" (in {})", dir.display()));
        }
        log::debug!("$ {header}");
        if let Some(log) = &log {
            write_line(log, &format!("$ {header}"));
            write_line(log, &format!("  environment: {environment:?}"));
        }

        let mut command = Command::new(cmd.program());
        command
            .args(cmd.get_args())
            .env_clear()
            .envs(&environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cmd.get_dir() {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to execute {}", cmd.program()))?;

        let stderr = child.stderr.take().context("child stderr not captured")?;
        let stderr_log = log.clone();
        let stderr_reader = thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                log::info!("{line}");
                if let Some(log) = &stderr_log {
                    write_line(log, &line);
                }
            }
        });

        let mut stdout = String::new();
        if let Some(out) = child.stdout.take() {
            for line in BufReader::new(out).lines().map_while(|l| l.ok()) {
                log::debug!("{line}");
                if let Some(log) = &log {
                    write_line(log, &line);
                }
                stdout.push_str(&line);
                stdout.push('\n');
            }
        }

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for {}", cmd.program()))?;
        if stderr_reader.join().is_err() {
            log::warn!("stderr reader for {} panicked", cmd.program());
        }

        if !status.success() {
            if let Some(path) = cmd.get_log() {
                log::error!("please view log file for detail: {}", path.display());
            }
            return Err(cmd.failure(status.code().unwrap_or(-1)));
        }

        Ok(CmdResult {
            stdout: stdout.trim_end_matches('\n').to_string(),
        })
    }
}

fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory '{}'", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file '{}'", path.display()))
}

fn write_line(log: &Mutex<File>, line: &str) {
    if let Ok(mut file) = log.lock() {
        if let Err(err) = writeln!(file, "{line}") {
            log::warn!("cannot append to build log: {err}");
        }
    }
}

/// Fail with a descriptive error if `path` does not exist.
pub fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} not found at: {}", what, path.display());
    }
    Ok(())
}
