// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sentinel lines that delimit a managed block.
//!
//! Every managed block is bounded by a __begin__ marker and an __end__ marker.
//! Both are full lines of the form `# BEGIN <tool-name>[: <subsection>]` and
//! `# END <tool-name>[: <subsection>]`. Older releases only ever wrote a single
//! line, `# MANAGED BY <tool-name>`, with no closing counterpart. Markers built
//! from a tool name recognize that __legacy__ marker as well, so that it can be
//! migrated into the paired format.
//!
//! Markers are plain ASCII, so lines are matched as raw bytes. Configuration
//! files do not need to be valid UTF-8.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Begin, end, and optional legacy marker for one managed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    begin: String,
    end: String,
    legacy: Option<String>,
}

impl Markers {
    /// Construct markers for a tool, optionally scoped to a subsection.
    ///
    /// The legacy `# MANAGED BY <tool>` sentinel is recognized too. Use
    /// [`Markers::without_legacy`] to opt out.
    ///
    /// # Errors
    ///
    /// - Return [`MarkerError::EmptyToolName`] if tool name is blank.
    /// - Return [`MarkerError::MultiLine`] if tool name or subsection contain
    ///   a line break.
    pub fn new(tool: impl AsRef<str>, subsection: Option<&str>) -> Result<Self> {
        let tool = tool.as_ref().trim();
        if tool.is_empty() {
            return Err(MarkerError::EmptyToolName);
        }

        let label = match subsection.map(str::trim).filter(|sub| !sub.is_empty()) {
            Some(sub) => format!("{tool}: {sub}"),
            None => tool.to_string(),
        };

        let mut markers = Self::custom(format!("# BEGIN {label}"), format!("# END {label}"))?;
        markers.legacy = Some(format!("# MANAGED BY {tool}"));

        Ok(markers)
    }

    /// Construct markers from raw begin and end lines.
    ///
    /// # Errors
    ///
    /// - Return [`MarkerError::Empty`] if either marker is empty.
    /// - Return [`MarkerError::MultiLine`] if either marker spans lines.
    /// - Return [`MarkerError::Identical`] if begin and end are the same.
    pub fn custom(begin: impl Into<String>, end: impl Into<String>) -> Result<Self> {
        let begin = begin.into();
        let end = end.into();

        for marker in [&begin, &end] {
            if marker.is_empty() {
                return Err(MarkerError::Empty);
            }

            if marker.contains(['\n', '\r']) {
                return Err(MarkerError::MultiLine {
                    marker: marker.clone(),
                });
            }
        }

        if begin == end {
            return Err(MarkerError::Identical { marker: begin });
        }

        Ok(Self {
            begin,
            end,
            legacy: None,
        })
    }

    /// Stop recognizing the legacy sentinel.
    pub fn without_legacy(mut self) -> Self {
        self.legacy = None;
        self
    }

    pub fn begin(&self) -> &str {
        self.begin.as_str()
    }

    pub fn end(&self) -> &str {
        self.end.as_str()
    }

    pub fn legacy(&self) -> Option<&str> {
        self.legacy.as_deref()
    }

    /// Classify a single line of a configuration file.
    ///
    /// A line matches a marker only if its content, minus the line
    /// terminator, is exactly equal to that marker.
    pub fn classify(&self, line: impl AsRef<[u8]>) -> Option<MarkerKind> {
        let line = strip_terminator(line.as_ref());
        if line == self.begin.as_bytes() {
            Some(MarkerKind::Begin)
        } else if line == self.end.as_bytes() {
            Some(MarkerKind::End)
        } else if self.legacy.as_deref().map(str::as_bytes) == Some(line) {
            Some(MarkerKind::Legacy)
        } else {
            None
        }
    }
}

impl Display for Markers {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} ... {}", self.begin, self.end)
    }
}

/// Kind of marker a line matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Begin,
    End,
    Legacy,
}

pub(crate) fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Marker construction error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkerError {
    /// Tool name is blank.
    #[error("tool name for markers cannot be empty")]
    EmptyToolName,

    /// Marker line is empty.
    #[error("marker line cannot be empty")]
    Empty,

    /// Marker contains a line break.
    #[error("marker {marker:?} spans more than one line")]
    MultiLine { marker: String },

    /// Begin and end markers cannot be told apart.
    #[error("begin and end markers are both {marker:?}")]
    Identical { marker: String },
}

/// Friendly result alias :3
type Result<T, E = MarkerError> = std::result::Result<T, E>;
