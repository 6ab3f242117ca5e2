// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package installation through an external package manager.
//!
//! Dotblock does not know how to install anything by itself. It hands each
//! package to a [`PackageManager`], which answers two questions: is this
//! package installed, and can you install it. Every install is install-or-skip,
//! so running setup again never reinstalls what is already there. A failed
//! install is reported and the run moves on to the next package.

use crate::config::PackageEntry;

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    process::{Command, Stdio},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

/// Layer of indirection for package installation.
pub trait PackageManager {
    /// Check if package is already installed.
    fn is_installed(&self, package: &PackageEntry) -> Result<bool>;

    /// Install package, blocking until the package manager exits.
    fn install(&self, package: &PackageEntry) -> Result<()>;
}

/// Package installation through Homebrew.
#[derive(Debug, Clone)]
pub struct Homebrew {
    program: String,
}

impl Homebrew {
    /// Construct new Homebrew package manager using `brew` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("brew")
    }

    /// Construct new Homebrew package manager using a specific binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args<'a>(&self, subcommand: &'a str, package: &'a PackageEntry) -> Vec<&'a str> {
        let mut args = vec![subcommand];
        if package.cask {
            args.push("--cask");
        }
        args.push(package.name.as_str());
        args
    }
}

impl Default for Homebrew {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageManager for Homebrew {
    fn is_installed(&self, package: &PackageEntry) -> Result<bool> {
        let status = Command::new(&self.program)
            .args(self.args("list", package))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| InstallError::Spawn {
                source: err,
                program: self.program.clone(),
            })?;

        Ok(status.success())
    }

    fn install(&self, package: &PackageEntry) -> Result<()> {
        let output = syscall_non_interactive(&self.program, self.args("install", package))?;
        debug!("{output}");
        Ok(())
    }
}

/// Outcome of installing one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Package was present before the run.
    AlreadyInstalled,

    /// Package was installed by this run.
    Installed,

    /// Package manager reported failure.
    Failed(String),
}

impl InstallOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl Display for InstallOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::AlreadyInstalled => fmt.write_str("already installed"),
            Self::Installed => fmt.write_str("installed"),
            Self::Failed(message) => write!(fmt, "failed: {message}"),
        }
    }
}

/// Install every package that is not installed yet.
///
/// Shows a spinner while the package manager runs. Failures are logged as
/// warnings and recorded, and never stop the remaining packages.
#[instrument(skip(manager, packages), level = "debug")]
pub fn install_packages<P>(manager: &P, packages: &[PackageEntry]) -> Vec<(String, InstallOutcome)>
where
    P: PackageManager + ?Sized,
{
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(100));

    let mut outcomes = Vec::with_capacity(packages.len());
    for package in packages {
        bar.set_message(format!("checking {}", package.name));
        let outcome = match manager.is_installed(package) {
            Ok(true) => InstallOutcome::AlreadyInstalled,
            Ok(false) => {
                bar.set_message(format!("installing {}", package.name));
                match manager.install(package) {
                    Ok(()) => InstallOutcome::Installed,
                    Err(err) => InstallOutcome::Failed(err.to_string()),
                }
            }
            Err(err) => InstallOutcome::Failed(err.to_string()),
        };

        bar.suspend(|| match &outcome {
            InstallOutcome::Failed(message) => {
                warn!("package {} not installed: {message}", package.name)
            }
            outcome => info!("package {} {outcome}", package.name),
        });
        outcomes.push((package.name.clone(), outcome));
    }
    bar.finish_and_clear();

    outcomes
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref())
        .args(args)
        .output()
        .map_err(|err| InstallError::Spawn {
            source: err,
            program: cmd.as_ref().to_string_lossy().into_owned(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(InstallError::Syscall {
            program: cmd.as_ref().to_string_lossy().into_owned(),
            message,
        });
    }

    Ok(message)
}

/// Package installation error types.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// Package manager binary cannot be run.
    #[error("failed to run {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Package manager exited with failure.
    #[error("command {program:?} failed:\n{message}")]
    Syscall { program: String, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = InstallError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, collections::HashSet};

    /// Package manager that records installs in memory.
    #[derive(Debug, Default)]
    pub(crate) struct FakeManager {
        pub(crate) installed: RefCell<HashSet<String>>,
        pub(crate) broken: HashSet<String>,
    }

    impl PackageManager for FakeManager {
        fn is_installed(&self, package: &PackageEntry) -> Result<bool> {
            Ok(self.installed.borrow().contains(&package.name))
        }

        fn install(&self, package: &PackageEntry) -> Result<()> {
            if self.broken.contains(&package.name) {
                return Err(InstallError::Syscall {
                    program: "brew".into(),
                    message: format!("no formula named {}", package.name),
                });
            }
            self.installed.borrow_mut().insert(package.name.clone());
            Ok(())
        }
    }

    fn package(name: &str) -> PackageEntry {
        PackageEntry {
            name: name.into(),
            cask: false,
        }
    }

    #[test]
    fn install_or_skip_each_package() {
        let manager = FakeManager {
            installed: RefCell::new(HashSet::from(["git".to_string()])),
            broken: HashSet::from(["nope".to_string()]),
        };

        let result = install_packages(&manager, &[package("git"), package("nope"), package("fzf")]);
        let expect = vec![
            ("git".to_string(), InstallOutcome::AlreadyInstalled),
            (
                "nope".to_string(),
                InstallOutcome::Failed("command \"brew\" failed:\nno formula named nope".into()),
            ),
            ("fzf".to_string(), InstallOutcome::Installed),
        ];
        assert_eq!(result, expect);

        // Second run installs nothing.
        let result = install_packages(&manager, &[package("fzf")]);
        assert_eq!(result, vec![("fzf".to_string(), InstallOutcome::AlreadyInstalled)]);
    }

    #[test]
    fn homebrew_arguments() {
        let brew = Homebrew::new();
        let kitty = PackageEntry {
            name: "kitty".into(),
            cask: true,
        };
        assert_eq!(brew.args("install", &kitty), vec!["install", "--cask", "kitty"]);
        assert_eq!(brew.args("list", &package("fzf")), vec!["list", "fzf"]);
    }

    #[test]
    fn missing_package_manager_is_reported() {
        let brew = Homebrew::with_program("dotblock-no-such-brew");
        let result = install_packages(&brew, &[package("fzf")]);
        assert!(result[0].1.is_failure());
    }
}
