// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Staged writes committed through atomic rename.
//!
//! New content never goes straight into the destination. It is written into a
//! temporary file inside the destination's own directory, flushed to disk, and
//! only then renamed over the destination. Rename within one directory is
//! atomic, so an observer sees either the old bytes or the new bytes, never a
//! partial file. Dropping a [`StagedWrite`] without committing it deletes the
//! temporary file and leaves the destination untouched.

use std::{
    fs::{canonicalize, metadata, read, read_link, set_permissions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, instrument};

/// Content staged next to its destination, waiting to be committed.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl StagedWrite {
    /// Stage content for target.
    ///
    /// If target is a symlink, the staged file goes next to the file it points
    /// to, so that committing updates the link's destination instead of
    /// replacing the link itself. A dangling symlink stages for the path it
    /// names, so committing creates that file. Permissions of an existing
    /// destination are carried over to the staged file.
    ///
    /// # Errors
    ///
    /// - Return [`StageError::Resolve`] if a symlinked target cannot be
    ///   resolved.
    /// - Return [`StageError::Create`] if temporary file cannot be created.
    /// - Return [`StageError::Write`] if content cannot be written and synced.
    #[instrument(skip(target, content), level = "debug")]
    pub fn stage(target: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Result<Self> {
        let destination = resolve_destination(target.as_ref())?;

        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut temp = Builder::new()
            .prefix(".dotblock-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|err| StageError::Create { source: err, dir })?;

        temp.write_all(content.as_ref())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|err| StageError::Write {
                source: err,
                path: temp.path().to_path_buf(),
            })?;

        if let Ok(existing) = metadata(&destination) {
            set_permissions(temp.path(), existing.permissions()).map_err(|err| {
                StageError::Write {
                    source: err,
                    path: temp.path().to_path_buf(),
                }
            })?;
        }

        debug!(
            "staged {:?} for {:?}",
            temp.path().display(),
            destination.display()
        );

        Ok(Self { temp, destination })
    }

    /// Path of the temporary file holding staged content.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Re-read staged content from disk.
    ///
    /// # Errors
    ///
    /// - Return [`StageError::ReadBack`] if staged file cannot be read.
    pub fn read_back(&self) -> Result<Vec<u8>> {
        read(self.temp.path()).map_err(|err| StageError::ReadBack {
            source: err,
            path: self.temp.path().to_path_buf(),
        })
    }

    /// Atomically rename staged content over destination.
    ///
    /// # Errors
    ///
    /// - Return [`StageError::Commit`] if rename fails. The temporary file is
    ///   removed and destination keeps its previous bytes.
    #[instrument(skip(self), level = "debug")]
    pub fn commit(self) -> Result<PathBuf> {
        let Self { temp, destination } = self;
        temp.persist(&destination)
            .map_err(|err| StageError::Commit {
                source: err.error,
                path: destination.clone(),
            })?;
        debug!("committed {:?}", destination.display());

        Ok(destination)
    }
}

fn resolve_destination(target: &Path) -> Result<PathBuf> {
    if !target.is_symlink() {
        return Ok(target.to_path_buf());
    }

    let resolve_err = |err: std::io::Error| StageError::Resolve {
        source: err,
        path: target.to_path_buf(),
    };

    match canonicalize(target) {
        Ok(path) => Ok(path),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let link = read_link(target).map_err(resolve_err)?;
            let destination = match target.parent() {
                Some(parent) if link.is_relative() => parent.join(link),
                _ => link,
            };
            debug!(
                "{:?} dangles, staging for {:?}",
                target.display(),
                destination.display()
            );

            Ok(destination)
        }
        Err(err) => Err(resolve_err(err)),
    }
}

/// Staged write error types.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Symlinked target cannot be resolved.
    #[error("failed to resolve symlink {:?}", path.display())]
    Resolve {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Temporary file cannot be created.
    #[error("failed to create temporary file in {:?}", dir.display())]
    Create {
        #[source]
        source: std::io::Error,
        dir: PathBuf,
    },

    /// Temporary file cannot be written.
    #[error("failed to write staged content to {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Staged content cannot be read back.
    #[error("failed to read staged content from {:?}", path.display())]
    ReadBack {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Rename over destination failed.
    #[error("failed to rename staged content onto {:?}", path.display())]
    Commit {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StageError> = std::result::Result<T, E>;
