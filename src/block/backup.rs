// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Timestamped sibling backups of configuration files.
//!
//! Before a pre-existing configuration file is touched, its bytes are copied
//! next to it as `<target>.bak-<unix-timestamp>` (managed block merges) or
//! `<target>.backup-<unix-timestamp>` (section replacement). Backups are never
//! deleted by this crate, and an existing backup is never overwritten.

use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::{SystemTime, SystemTimeError, UNIX_EPOCH},
};
use tracing::{debug, instrument};

const MAX_ATTEMPTS: u64 = 64;

/// Naming scheme of a backup file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// `<target>.bak-<unix-timestamp>`.
    #[default]
    Bak,

    /// `<target>.backup-<unix-timestamp>`.
    Backup,
}

impl BackupKind {
    fn infix(&self) -> &'static str {
        match self {
            Self::Bak => ".bak-",
            Self::Backup => ".backup-",
        }
    }

    /// Backup path of target for a given timestamp.
    pub fn path_for(&self, target: impl AsRef<Path>, timestamp: u64) -> PathBuf {
        let mut name = target.as_ref().as_os_str().to_os_string();
        name.push(self.infix());
        name.push(timestamp.to_string());
        PathBuf::from(name)
    }
}

/// Copy target's current bytes into a fresh backup file.
///
/// Starts from the current unix timestamp. If a backup with that name already
/// exists, the timestamp is bumped one second at a time until a free name is
/// found, so a previous backup is never clobbered.
///
/// # Errors
///
/// - Return [`BackupError::Clock`] if system clock is before the unix epoch.
/// - Return [`BackupError::Copy`] if target cannot be read or backup cannot be
///   written.
/// - Return [`BackupError::Exhausted`] if no free backup name is found.
#[instrument(skip(target), level = "debug")]
pub fn create_backup(target: impl AsRef<Path>, kind: BackupKind) -> Result<PathBuf> {
    let target = target.as_ref();
    let start = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    for timestamp in start..start + MAX_ATTEMPTS {
        let backup = kind.path_for(target, timestamp);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&backup) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!("backup {:?} already taken", backup.display());
                continue;
            }
            Err(err) => return Err(BackupError::copy(err, target, backup)),
        };

        let copied = File::open(target)
            .and_then(|mut original| io::copy(&mut original, &mut file))
            .and_then(|_| file.sync_all());
        if let Err(err) = copied {
            // Half-written backup is worse than none.
            let _ = std::fs::remove_file(&backup);
            return Err(BackupError::copy(err, target, backup));
        }

        debug!("backed up {:?} to {:?}", target.display(), backup.display());
        return Ok(backup);
    }

    Err(BackupError::Exhausted {
        target: target.to_path_buf(),
    })
}

/// List existing backups of target, oldest first.
///
/// # Errors
///
/// - Return [`BackupError::Pattern`] if target path cannot form a glob
///   pattern.
pub fn list_backups(target: impl AsRef<Path>, kind: BackupKind) -> Result<Vec<PathBuf>> {
    let target = target.as_ref();
    let prefix = format!("{}{}", target.to_string_lossy(), kind.infix());
    let pattern = format!("{}*", glob::Pattern::escape(prefix.as_str()));

    let paths = glob::glob(pattern.as_str()).map_err(|err| BackupError::Pattern {
        source: err,
        target: target.to_path_buf(),
    })?;

    let mut backups = paths
        .filter_map(std::result::Result::ok)
        .filter_map(|path| {
            let timestamp = path
                .to_string_lossy()
                .strip_prefix(prefix.as_str())
                .and_then(|stamp| stamp.parse::<u64>().ok())?;
            Some((timestamp, path))
        })
        .collect::<Vec<_>>();
    backups.sort();

    Ok(backups.into_iter().map(|(_, path)| path).collect())
}

/// Backup error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// System clock reads earlier than the unix epoch.
    #[error("cannot compute backup timestamp")]
    Clock(#[from] SystemTimeError),

    /// Copying target bytes into backup failed.
    #[error("failed to back up {:?} to {:?}", target.display(), backup.display())]
    Copy {
        #[source]
        source: io::Error,
        target: PathBuf,
        backup: PathBuf,
    },

    /// Every candidate backup name is already taken.
    #[error("no free backup name left for {:?}", target.display())]
    Exhausted { target: PathBuf },

    /// Target path cannot be turned into a glob pattern.
    #[error("cannot search backups of {:?}", target.display())]
    Pattern {
        #[source]
        source: glob::PatternError,
        target: PathBuf,
    },
}

impl BackupError {
    fn copy(source: io::Error, target: &Path, backup: PathBuf) -> Self {
        Self::Copy {
            source,
            target: target.to_path_buf(),
            backup,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
