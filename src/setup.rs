// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Setup run orchestration.
//!
//! One __setup run__ walks a whole [`SetupManifest`]: packages are installed
//! first, then every managed block is merged, then every section is replaced.
//! Each target file is handled independently. A failure for one target is
//! recorded in the [`Report`] and the run carries on with the next target, so
//! a single broken file never blocks the rest of the machine's configuration.

use crate::{
    block::{
        ensure_managed_block,
        layout::{detect_format, FormatTag},
        marker::Markers,
        replace_section, Action, MergeError,
    },
    config::{ConfigError, SetupManifest},
    install::{install_packages, InstallOutcome, PackageManager},
};

use std::{
    fs::{read, read_to_string},
    path::{Path, PathBuf},
};
use tracing::{error, info, instrument};

/// Runs a setup manifest.
#[derive(Debug, Clone)]
pub struct Setup {
    manifest: SetupManifest,
}

impl Setup {
    /// Construct new setup run from a parsed manifest.
    pub fn new(manifest: SetupManifest) -> Self {
        Self { manifest }
    }

    /// Load setup manifest from file.
    ///
    /// # Errors
    ///
    /// - Return [`SetupError::ReadManifest`] if manifest cannot be read.
    /// - Return [`SetupError::Config`] if manifest cannot be parsed.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_to_string(path.as_ref()).map_err(|err| SetupError::ReadManifest {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        Ok(Self::new(content.parse()?))
    }

    pub fn manifest(&self) -> &SetupManifest {
        &self.manifest
    }

    /// Build markers for an entry of the manifest.
    ///
    /// # Errors
    ///
    /// - Return [`MergeError::InvalidMarkers`] if tool name or subsection
    ///   cannot form marker lines.
    pub fn markers(&self, subsection: Option<&str>) -> Result<Markers, MergeError> {
        let settings = &self.manifest.settings;
        let markers = Markers::new(&settings.tool, subsection)?;
        if settings.legacy {
            Ok(markers)
        } else {
            Ok(markers.without_legacy())
        }
    }

    /// Run every step of the manifest.
    ///
    /// Package installation is skipped entirely when install is false.
    pub fn run<P>(&self, manager: &P, install: bool) -> Report
    where
        P: PackageManager + ?Sized,
    {
        let mut report = Report::default();

        if install && !self.manifest.packages.is_empty() {
            report.packages = install_packages(manager, &self.manifest.packages);
        }

        for block in &self.manifest.blocks {
            let result = self
                .markers(block.subsection.as_deref())
                .and_then(|markers| ensure_managed_block(&block.target, &block.source, &markers));
            report.record(block.target.as_path(), result);
        }

        for section in &self.manifest.sections {
            let result = self
                .markers(section.subsection.as_deref())
                .and_then(|markers| replace_section(&section.file, &markers, &section.body));
            report.record(section.file.as_path(), result);
        }

        report
    }

    /// Detect current format of every managed block target.
    ///
    /// A target that does not exist yet reports `None`.
    ///
    /// # Errors
    ///
    /// - Return [`SetupError::Merge`] if markers cannot be built.
    /// - Return [`SetupError::ReadTarget`] if an existing target cannot be
    ///   read.
    pub fn status(&self) -> Result<Vec<(PathBuf, Option<FormatTag>)>> {
        let mut status = Vec::with_capacity(self.manifest.blocks.len());
        for block in &self.manifest.blocks {
            let markers = self.markers(block.subsection.as_deref())?;
            let path = block.target.as_path();
            let tag = match read(path) {
                Ok(content) => Some(detect_format(content, &markers)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => {
                    return Err(SetupError::ReadTarget {
                        source: err,
                        path: path.to_path_buf(),
                    })
                }
            };
            status.push((path.to_path_buf(), tag));
        }

        Ok(status)
    }
}

/// Per-target outcome of a setup run.
#[derive(Debug, Default)]
pub struct Report {
    pub packages: Vec<(String, InstallOutcome)>,
    pub targets: Vec<(PathBuf, Result<Action, MergeError>)>,
}

impl Report {
    fn record(&mut self, path: &Path, result: Result<Action, MergeError>) {
        match &result {
            Ok(action) => info!("{:?}: {action}", path.display()),
            Err(err) => error!("{:?}: {err}", path.display()),
        }
        self.targets.push((path.to_path_buf(), result));
    }

    /// Check if any package or target failed.
    pub fn has_failures(&self) -> bool {
        self.packages.iter().any(|(_, outcome)| outcome.is_failure())
            || self.targets.iter().any(|(_, result)| result.is_err())
    }

    /// Count targets that ended with a given action.
    pub fn count(&self, action: Action) -> usize {
        self.targets
            .iter()
            .filter(|(_, result)| matches!(result, Ok(done) if *done == action))
            .count()
    }
}

/// Setup run error types.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Manifest file cannot be read.
    #[error("failed to read setup manifest at {:?}", path.display())]
    ReadManifest {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Existing target cannot be read.
    #[error("failed to read {:?}", path.display())]
    ReadTarget {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest cannot be parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Merge preparation failed.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Friendly result alias :3
type Result<T, E = SetupError> = std::result::Result<T, E>;
