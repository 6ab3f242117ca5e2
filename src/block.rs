// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed configuration blocks.
//!
//! A __managed block__ is a region of a user-owned configuration file, such as
//! `.zshrc`, `.zprofile`, or `kitty.conf`, that dotblock owns and may freely
//! overwrite. The region is delimited by a begin marker line and an end marker
//! line. Everything outside the region belongs to the user and is preserved
//! byte-for-byte.
//!
//! # Merge Procedure
//!
//! Merging source-of-truth content into a target file goes like this:
//!
//! 1. Skip if the source-of-truth is missing or empty.
//! 2. Create the target outright if it does not exist yet.
//! 3. Otherwise back up the target before anything else happens.
//! 4. Detect the format of the target: absent, legacy single marker, paired
//!    markers, or corrupt.
//! 5. Render the new content: append, migrate in place, replace between
//!    markers, or overwrite everything.
//! 6. Stage the result next to the target, re-scan the staged bytes, and only
//!    if they hold exactly one well-formed block, rename them over the target.
//!
//! Merging is idempotent: running it twice with the same source leaves a
//! byte-identical file.
//!
//! # See Also
//!
//! - [`layout`]
//! - [`marker`]

pub mod backup;
pub mod layout;
pub mod marker;
pub mod stage;

use crate::block::{
    backup::{create_backup, BackupError, BackupKind},
    layout::{detect_format, relocate_section, render_block, FormatTag, Layout},
    marker::{MarkerError, Markers},
    stage::{StageError, StagedWrite},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Outcome of a merge against one target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Target did not exist and was created with a fresh block.
    Created,

    /// Target existed and its managed block was appended, replaced, or
    /// rebuilt from a corrupt state.
    Updated,

    /// Legacy single-line marker was rewritten into paired markers.
    Migrated,

    /// Source-of-truth was missing or empty; target left untouched.
    Skipped,

    /// Target already held the exact result; nothing was written.
    Unchanged,
}

impl Display for Action {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let action = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Migrated => "migrated",
            Self::Skipped => "skipped",
            Self::Unchanged => "unchanged",
        };
        fmt.write_str(action)
    }
}

/// Read source-of-truth content as raw bytes.
///
/// Content may be in any encoding.
///
/// # Errors
///
/// - Return [`MergeError::SourceMissing`] if source does not exist or is
///   empty.
/// - Return [`MergeError::ReadSource`] if source exists but cannot be read.
pub fn read_source(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    match read(path) {
        Ok(content) if !content.is_empty() => Ok(content),
        Ok(_) => Err(MergeError::SourceMissing {
            path: path.to_path_buf(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(MergeError::SourceMissing {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(MergeError::ReadSource {
            source: err,
            path: path.to_path_buf(),
        }),
    }
}

/// Ensure target holds exactly one managed block equal to source file content.
///
/// Missing or empty source means [`Action::Skipped`] with a warning, and the
/// target is not touched.
///
/// # Errors
///
/// - Return [`MergeError::BackupFailed`] if backup of existing target fails.
/// - Return [`MergeError::MigrationFailed`] if legacy format migration
///   produces unusable output.
/// - Return [`MergeError::ValidationFailed`] if staged result does not hold
///   exactly one well-formed block.
/// - Return [`MergeError::ReadSource`], [`MergeError::ReadTarget`],
///   [`MergeError::CreateParent`], or [`MergeError::Stage`] if file I/O
///   fails.
#[instrument(skip(target, source, markers), level = "debug")]
pub fn ensure_managed_block(
    target: impl AsRef<Path>,
    source: impl AsRef<Path>,
    markers: &Markers,
) -> Result<Action> {
    let content = match read_source(source.as_ref()) {
        Ok(content) => content,
        Err(MergeError::SourceMissing { path }) => {
            warn!(
                "source {:?} is missing or empty, skipping {:?}",
                path.display(),
                target.as_ref().display()
            );
            return Ok(Action::Skipped);
        }
        Err(err) => return Err(err),
    };

    ensure_managed_content(target, content, markers)
}

/// Ensure target holds exactly one managed block equal to source content.
///
/// Same as [`ensure_managed_block`], but with source-of-truth content given
/// directly.
///
/// # Errors
///
/// - Same as [`ensure_managed_block`].
#[instrument(skip(target, source, markers), level = "debug")]
pub fn ensure_managed_content(
    target: impl AsRef<Path>,
    source: impl AsRef<[u8]>,
    markers: &Markers,
) -> Result<Action> {
    let target = target.as_ref();
    let source = source.as_ref();

    if source.is_empty() {
        warn!("source content is empty, skipping {:?}", target.display());
        return Ok(Action::Skipped);
    }

    if !exists(target)? {
        create_parent(target)?;
        commit_validated(target, render_block(markers, source), markers)?;
        info!("created {:?} with managed block", target.display());
        return Ok(Action::Created);
    }

    // INVARIANT: Back up before any mutation, and never proceed without one.
    let backup = take_backup(target, BackupKind::Bak)?;
    debug!("backup of {:?} at {:?}", target.display(), backup.display());

    let current = read_target(target)?;
    let layout = Layout::parse(&current, markers);
    debug!(
        "{} format in {:?}, replacing {:?}",
        layout.tag(),
        target.display(),
        String::from_utf8_lossy(&layout.managed())
    );
    let rendered = layout.render(markers, source);

    let action = match layout.tag() {
        FormatTag::Absent => Action::Updated,
        FormatTag::LegacySingleMarker => {
            if rendered.is_empty() || detect_format(&rendered, markers) != FormatTag::PairedMarker
            {
                return Err(MergeError::MigrationFailed {
                    path: target.to_path_buf(),
                });
            }
            Action::Migrated
        }
        FormatTag::PairedMarker => Action::Updated,
        FormatTag::Corrupt => {
            warn!(
                "markers {markers} in {:?} are malformed, discarding prior content (backup at {:?})",
                target.display(),
                backup.display()
            );
            Action::Updated
        }
    };

    if rendered == current {
        info!("{:?} already up to date", target.display());
        return Ok(Action::Unchanged);
    }

    commit_validated(target, rendered, markers)?;
    info!("{action} managed block in {:?}", target.display());

    Ok(action)
}

/// Replace a marker-delimited section and move it to end-of-file.
///
/// Every existing `[begin, end]` line range is removed, then a fresh block
/// holding new body is appended. Surrounding content is preserved, but the
/// block's position relative to it is not.
///
/// # Errors
///
/// - Return [`MergeError::BackupFailed`] if backup of existing file fails.
/// - Return [`MergeError::ValidationFailed`] if staged result does not hold
///   exactly one well-formed block.
/// - Return [`MergeError::ReadTarget`], [`MergeError::CreateParent`], or
///   [`MergeError::Stage`] if file I/O fails.
#[instrument(skip(file, markers, new_body), level = "debug")]
pub fn replace_section(
    file: impl AsRef<Path>,
    markers: &Markers,
    new_body: impl AsRef<[u8]>,
) -> Result<Action> {
    let file = file.as_ref();
    let new_body = new_body.as_ref();

    if !exists(file)? {
        create_parent(file)?;
        commit_validated(file, render_block(markers, new_body), markers)?;
        info!("created {:?} with section {markers}", file.display());
        return Ok(Action::Created);
    }

    let backup = take_backup(file, BackupKind::Backup)?;
    debug!("backup of {:?} at {:?}", file.display(), backup.display());

    let current = read_target(file)?;
    let rendered = relocate_section(&current, markers, new_body);
    if rendered == current {
        info!("{:?} already up to date", file.display());
        return Ok(Action::Unchanged);
    }

    commit_validated(file, rendered, markers)?;
    info!("updated section {markers} in {:?}", file.display());

    Ok(Action::Updated)
}

fn exists(path: &Path) -> Result<bool> {
    path.try_exists().map_err(|err| MergeError::ReadTarget {
        source: err,
        path: path.to_path_buf(),
    })
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent).map_err(|err| MergeError::CreateParent {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    Ok(())
}

fn take_backup(target: &Path, kind: BackupKind) -> Result<PathBuf> {
    create_backup(target, kind).map_err(|err| MergeError::BackupFailed {
        source: err,
        path: target.to_path_buf(),
    })
}

fn read_target(target: &Path) -> Result<Vec<u8>> {
    read(target).map_err(|err| MergeError::ReadTarget {
        source: err,
        path: target.to_path_buf(),
    })
}

// INVARIANT: Destination only ever receives content whose re-scan shows
// exactly one begin marker followed by exactly one end marker.
fn commit_validated(target: &Path, content: Vec<u8>, markers: &Markers) -> Result<()> {
    let staged = StagedWrite::stage(target, content)?;
    let found = detect_format(staged.read_back()?, markers);
    if found != FormatTag::PairedMarker {
        // Dropping the stage removes the temporary file.
        drop(staged);
        return Err(MergeError::ValidationFailed {
            path: target.to_path_buf(),
            found,
        });
    }

    staged.commit()?;

    Ok(())
}

/// Managed block merge error types.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Source-of-truth is absent or empty.
    #[error("source {:?} is missing or empty", path.display())]
    SourceMissing { path: PathBuf },

    /// Source-of-truth exists but cannot be read.
    #[error("failed to read source {:?}", path.display())]
    ReadSource {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backup of existing target could not be written.
    #[error("refusing to modify {:?} without a backup", path.display())]
    BackupFailed {
        #[source]
        source: BackupError,
        path: PathBuf,
    },

    /// Legacy format rewrite produced empty or invalid output.
    #[error("failed to migrate legacy marker in {:?}", path.display())]
    MigrationFailed { path: PathBuf },

    /// Staged result does not hold exactly one well-formed block.
    #[error("staged result for {:?} is {found}, expected one paired block", path.display())]
    ValidationFailed { path: PathBuf, found: FormatTag },

    /// Existing target cannot be read.
    #[error("failed to read {:?}", path.display())]
    ReadTarget {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Parent directory of new target cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateParent {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Markers for target are invalid.
    #[error(transparent)]
    InvalidMarkers(#[from] MarkerError),

    /// Staging or committing new content failed.
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// Friendly result alias :3
pub type Result<T, E = MergeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::backup::list_backups;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs::{read_dir, read_to_string, write};

    fn markers() -> Markers {
        Markers::new("t", None).unwrap()
    }

    #[test]
    fn merge_replaces_content_between_markers() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join(".zshrc");
        write(&target, "foo=1\n# BEGIN t\nold\n# END t\nbar=2\n")?;

        let action = ensure_managed_content(&target, "new\n", &markers())?;

        assert_eq!(action, Action::Updated);
        assert_eq!(
            read_to_string(&target)?,
            "foo=1\n# BEGIN t\nnew\n# END t\nbar=2\n"
        );

        Ok(())
    }

    #[test]
    fn merge_creates_missing_target() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("kitty").join("kitty.conf");

        let action = ensure_managed_content(&target, "new\n", &markers())?;

        assert_eq!(action, Action::Created);
        assert_eq!(read_to_string(&target)?, "# BEGIN t\nnew\n# END t\n");
        assert!(list_backups(&target, BackupKind::Bak)?.is_empty());

        Ok(())
    }

    #[test]
    fn merge_migrates_legacy_marker() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join(".zshrc");
        write(&target, "x\n# MANAGED BY t\ny\n")?;

        let action = ensure_managed_content(&target, "new\n", &markers())?;

        assert_eq!(action, Action::Migrated);
        assert_eq!(read_to_string(&target)?, "x\n# BEGIN t\nnew\n# END t\ny\n");

        Ok(())
    }

    #[test]
    fn merge_appends_when_markers_absent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join(".zprofile");
        write(&target, "export EDITOR=vim")?;

        let action = ensure_managed_content(&target, "new", &markers())?;

        assert_eq!(action, Action::Updated);
        assert_eq!(
            read_to_string(&target)?,
            "export EDITOR=vim\n# BEGIN t\nnew\n# END t\n"
        );

        Ok(())
    }

    #[test]
    fn merge_overwrites_corrupt_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join(".zshrc");
        let corrupt = indoc! {"
            user=1
            # BEGIN t
            a
            # BEGIN t
            b
            # END t
        "};
        write(&target, corrupt)?;

        let action = ensure_managed_content(&target, "new\n", &markers())?;

        assert_eq!(action, Action::Updated);
        assert_eq!(read_to_string(&target)?, "# BEGIN t\nnew\n# END t\n");

        let backups = list_backups(&target, BackupKind::Bak)?;
        assert_eq!(backups.len(), 1);
        assert_eq!(read_to_string(&backups[0])?, corrupt);

        Ok(())
    }

    #[test]
    fn merge_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join(".zshrc");
        write(&target, "a\n# BEGIN t\nold\n# END t\nb\n")?;

        assert_eq!(ensure_managed_content(&target, "new\n", &markers())?, Action::Updated);
        let first = read_to_string(&target)?;
        assert_eq!(
            ensure_managed_content(&target, "new\n", &markers())?,
            Action::Unchanged
        );
        assert_eq!(read_to_string(&target)?, first);

        Ok(())
    }

    #[test]
    fn merge_skips_missing_source() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join(".zshrc");
        write(&target, "keep\n")?;

        let action = ensure_managed_block(&target, dir.path().join("nope"), &markers())?;
        assert_eq!(action, Action::Skipped);

        let empty = dir.path().join("empty");
        write(&empty, "")?;
        let action = ensure_managed_block(&target, &empty, &markers())?;
        assert_eq!(action, Action::Skipped);

        assert_eq!(read_to_string(&target)?, "keep\n");
        assert!(list_backups(&target, BackupKind::Bak)?.is_empty());

        Ok(())
    }

    #[test]
    fn merge_rejects_source_holding_markers() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join(".zshrc");
        write(&target, "a\n")?;

        let result = ensure_managed_content(&target, "# END t\n", &markers());
        assert!(matches!(
            result,
            Err(MergeError::ValidationFailed {
                found: FormatTag::Corrupt,
                ..
            })
        ));
        assert_eq!(read_to_string(&target)?, "a\n");

        // Only target and its backup remain; staged file is gone.
        assert_eq!(read_dir(dir.path())?.count(), 2);

        Ok(())
    }

    #[test]
    fn section_replace_relocates_block() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join(".zprofile");
        let markers = Markers::new("t", Some("brew"))?;
        write(
            &file,
            "# BEGIN t: brew\nold\n# END t: brew\nexport A=1\n",
        )?;

        let action = replace_section(&file, &markers, "eval \"$(brew shellenv)\"\n")?;

        assert_eq!(action, Action::Updated);
        assert_eq!(
            read_to_string(&file)?,
            "export A=1\n# BEGIN t: brew\neval \"$(brew shellenv)\"\n# END t: brew\n"
        );
        assert_eq!(list_backups(&file, BackupKind::Backup)?.len(), 1);
        assert_eq!(
            replace_section(&file, &markers, "eval \"$(brew shellenv)\"\n")?,
            Action::Unchanged
        );

        Ok(())
    }

    #[test]
    fn section_replace_creates_missing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join(".zprofile");
        let markers = Markers::new("t", Some("brew"))?;

        assert_eq!(replace_section(&file, &markers, "x")?, Action::Created);
        assert_eq!(read_to_string(&file)?, "# BEGIN t: brew\nx\n# END t: brew\n");

        Ok(())
    }

    #[test]
    fn merge_accepts_non_utf8_source_and_target() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join(".zshrc");
        let source = dir.path().join("zshrc");
        write(&target, b"# caf\xe9\n")?;
        write(&source, b"export NAME=caf\xe9\n")?;

        let action = ensure_managed_block(&target, &source, &markers())?;

        assert_eq!(action, Action::Updated);
        assert_eq!(
            read(&target)?,
            b"# caf\xe9\n# BEGIN t\nexport NAME=caf\xe9\n# END t\n".to_vec()
        );
        assert_eq!(
            ensure_managed_block(&target, &source, &markers())?,
            Action::Unchanged
        );

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn merge_creates_file_behind_dangling_symlink() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let link = dir.path().join(".zshrc");
        std::os::unix::fs::symlink("zshrc.real", &link)?;

        let action = ensure_managed_content(&link, "new\n", &markers())?;

        assert_eq!(action, Action::Created);
        assert!(link.is_symlink());
        assert_eq!(
            read_to_string(dir.path().join("zshrc.real"))?,
            "# BEGIN t\nnew\n# END t\n"
        );

        Ok(())
    }
}
