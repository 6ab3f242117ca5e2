// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the setup manifest that dotblock uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Setup manifest layout.
///
/// A setup manifest lists everything one run of dotblock should do: packages
/// to install through the package manager, managed blocks to merge into
/// configuration files, and shell profile sections to replace.
///
/// # General Layout
///
/// The manifest is composed of four parts. The settings section names the tool
/// that owns every marker. Package entries name packages to install if they
/// are not installed already. Block entries pair a target configuration file
/// with the source-of-truth file whose content belongs in the target's managed
/// block. Section entries carry an inline body for a section that always lives
/// at the end of its file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SetupManifest {
    /// Settings for the whole run.
    #[serde(default)]
    pub settings: SetupSettings,

    /// Packages to install.
    #[serde(rename = "package", default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageEntry>,

    /// Managed blocks to merge.
    #[serde(rename = "block", default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<BlockEntry>,

    /// Sections to replace.
    #[serde(rename = "section", default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionEntry>,
}

impl FromStr for SetupManifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: SetupManifest =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        for block in manifest.blocks.iter_mut() {
            block.target = block.target.expand()?;
            block.source = block.source.expand()?;
        }
        for section in manifest.sections.iter_mut() {
            section.file = section.file.expand()?;
        }

        Ok(manifest)
    }
}

impl Display for SetupManifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Settings shared by every entry of a manifest.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SetupSettings {
    /// Tool name written into every marker.
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Recognize `# MANAGED BY <tool>` lines for migration.
    #[serde(default = "default_legacy")]
    pub legacy: bool,
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            legacy: default_legacy(),
        }
    }
}

fn default_tool() -> String {
    env!("CARGO_PKG_NAME").into()
}

fn default_legacy() -> bool {
    true
}

/// Package to install through the package manager.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PackageEntry {
    /// Name of the package.
    pub name: String,

    /// Install as a cask (GUI application) instead of a formula.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cask: bool,
}

/// Managed block to merge into a target file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct BlockEntry {
    /// Configuration file that receives the managed block.
    pub target: ManifestPath,

    /// Source-of-truth file whose content fills the managed block.
    pub source: ManifestPath,

    /// Optional subsection label for the markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
}

/// Section to replace at the end of a file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SectionEntry {
    /// File holding the section.
    pub file: ManifestPath,

    /// Optional subsection label for the markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,

    /// Body placed between the markers.
    pub body: String,
}

/// Path field of a manifest that may use shell syntax like `~` or `$HOME`.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ManifestPath(PathBuf);

impl ManifestPath {
    /// Construct new manifest path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Treat manifest path as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    fn expand(&self) -> Result<Self> {
        Ok(Self::new(
            shellexpand::full(self.to_string().as_str())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        ))
    }
}

impl AsRef<Path> for ManifestPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

impl Display for ManifestPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
