// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Line-oriented parse of a configuration file around its managed block.
//!
//! A configuration file is split into three ordered runs of lines: the lines
//! __before__ the managed block, the lines __managed__ by the block, and the
//! lines __after__ it. Every line keeps its original terminator, so joining
//! the unmanaged runs back together reproduces the user's bytes exactly.
//! Content is handled as raw bytes, because nothing here cares about its
//! encoding. All functions are pure; file I/O lives in [`crate::block`].

use crate::block::marker::{MarkerKind, Markers};

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Format of a configuration file with respect to one set of markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    /// No marker of any kind.
    Absent,

    /// Exactly one legacy sentinel line and no begin or end marker.
    LegacySingleMarker,

    /// Exactly one begin marker followed later by exactly one end marker.
    PairedMarker,

    /// Any other combination of markers.
    Corrupt,
}

impl Display for FormatTag {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let tag = match self {
            Self::Absent => "absent",
            Self::LegacySingleMarker => "legacy-single-marker",
            Self::PairedMarker => "paired-marker",
            Self::Corrupt => "corrupt",
        };
        fmt.pad(tag)
    }
}

/// Positions of every marker line in a file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MarkerScan {
    pub begins: Vec<usize>,
    pub ends: Vec<usize>,
    pub legacies: Vec<usize>,
}

impl MarkerScan {
    /// Record the line index of every marker line in content.
    pub fn scan(content: impl AsRef<[u8]>, markers: &Markers) -> Self {
        let mut scan = Self::default();
        for (index, line) in lines(content.as_ref()).enumerate() {
            match markers.classify(line) {
                Some(MarkerKind::Begin) => scan.begins.push(index),
                Some(MarkerKind::End) => scan.ends.push(index),
                Some(MarkerKind::Legacy) => scan.legacies.push(index),
                None => continue,
            }
        }

        scan
    }

    /// Derive format tag from marker counts and order.
    pub fn format(&self) -> FormatTag {
        match (
            self.begins.as_slice(),
            self.ends.as_slice(),
            self.legacies.as_slice(),
        ) {
            ([], [], []) => FormatTag::Absent,
            ([], [], [_]) => FormatTag::LegacySingleMarker,
            ([begin], [end], []) if begin < end => FormatTag::PairedMarker,
            _ => FormatTag::Corrupt,
        }
    }
}

/// Detect format of content with respect to given markers.
pub fn detect_format(content: impl AsRef<[u8]>, markers: &Markers) -> FormatTag {
    MarkerScan::scan(content, markers).format()
}

/// Split content into lines that keep their `\n` terminator.
fn lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    content.split_inclusive(|byte| *byte == b'\n')
}

/// Three-state parse of a configuration file.
///
/// # Invariant
///
/// - For [`FormatTag::Absent`], every line lands in `before`.
/// - For [`FormatTag::LegacySingleMarker`], the legacy line itself is dropped
///   and `managed` stays empty.
/// - For [`FormatTag::PairedMarker`], both marker lines are dropped and only
///   the lines strictly between them land in `managed`.
/// - For [`FormatTag::Corrupt`], all runs are empty, because prior structure
///   is discarded wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout<'a> {
    tag: FormatTag,
    before: Vec<&'a [u8]>,
    managed: Vec<&'a [u8]>,
    after: Vec<&'a [u8]>,
}

impl<'a> Layout<'a> {
    /// Split content around the managed block delimited by markers.
    pub fn parse<C>(content: &'a C, markers: &Markers) -> Self
    where
        C: AsRef<[u8]> + ?Sized,
    {
        let content = content.as_ref();
        let scan = MarkerScan::scan(content, markers);
        let tag = scan.format();
        let lines = lines(content).collect::<Vec<_>>();

        let (before, managed, after) = match tag {
            FormatTag::Absent => (lines, Vec::new(), Vec::new()),
            FormatTag::LegacySingleMarker => {
                let at = scan.legacies[0];
                (lines[..at].to_vec(), Vec::new(), lines[at + 1..].to_vec())
            }
            FormatTag::PairedMarker => {
                let (begin, end) = (scan.begins[0], scan.ends[0]);
                (
                    lines[..begin].to_vec(),
                    lines[begin + 1..end].to_vec(),
                    lines[end + 1..].to_vec(),
                )
            }
            FormatTag::Corrupt => (Vec::new(), Vec::new(), Vec::new()),
        };

        Self {
            tag,
            before,
            managed,
            after,
        }
    }

    pub fn tag(&self) -> FormatTag {
        self.tag
    }

    /// Current content of the managed region.
    pub fn managed(&self) -> Vec<u8> {
        self.managed.concat()
    }

    /// Serialize layout with a fresh managed block holding source.
    ///
    /// Absent format appends the block to end-of-file. Every other format puts
    /// the block where the old markers were.
    pub fn render(&self, markers: &Markers, source: impl AsRef<[u8]>) -> Vec<u8> {
        let mut out = self.before.concat();
        terminate(&mut out);
        out.extend_from_slice(&render_block(markers, source));
        out.extend_from_slice(&self.after.concat());

        out
    }
}

/// Render `begin + source + end` as whole lines.
pub fn render_block(markers: &Markers, source: impl AsRef<[u8]>) -> Vec<u8> {
    let source = source.as_ref();
    let mut block =
        Vec::with_capacity(markers.begin().len() + source.len() + markers.end().len() + 3);
    block.extend_from_slice(markers.begin().as_bytes());
    block.push(b'\n');
    block.extend_from_slice(source);
    terminate(&mut block);
    block.extend_from_slice(markers.end().as_bytes());
    block.push(b'\n');

    block
}

/// Remove every `[begin, end]` line range inclusive, then append a fresh
/// block holding body at end-of-file.
///
/// A begin marker without a later end marker removes everything through
/// end-of-file. Stray end markers outside any range are dropped too.
pub fn relocate_section(
    content: impl AsRef<[u8]>,
    markers: &Markers,
    body: impl AsRef<[u8]>,
) -> Vec<u8> {
    let content = content.as_ref();
    let body = body.as_ref();
    let mut out = Vec::with_capacity(content.len() + body.len());
    let mut inside = false;
    for line in lines(content) {
        match (inside, markers.classify(line)) {
            (false, Some(MarkerKind::Begin)) => inside = true,
            (false, Some(MarkerKind::End)) => continue,
            (true, Some(MarkerKind::End)) => inside = false,
            (true, _) => continue,
            (false, _) => out.extend_from_slice(line),
        }
    }

    terminate(&mut out);
    out.extend_from_slice(&render_block(markers, body));

    out
}

// Non-empty buffers must end on a line boundary before more lines follow.
fn terminate(buf: &mut Vec<u8>) {
    if buf.last().is_some_and(|byte| *byte != b'\n') {
        buf.push(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn markers() -> Markers {
        Markers::new("t", None).unwrap()
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test_case("", FormatTag::Absent; "empty file")]
    #[test_case("foo=1\nbar=2\n", FormatTag::Absent; "no markers")]
    #[test_case("x\n# MANAGED BY t\ny\n", FormatTag::LegacySingleMarker; "legacy")]
    #[test_case("# BEGIN t\n# END t\n", FormatTag::PairedMarker; "empty pair")]
    #[test_case("a\n# BEGIN t\nold\n# END t\nb", FormatTag::PairedMarker; "pair")]
    #[test_case("# END t\nold\n# BEGIN t\n", FormatTag::Corrupt; "end before begin")]
    #[test_case("# BEGIN t\n# BEGIN t\nold\n# END t\n", FormatTag::Corrupt; "two begins")]
    #[test_case("# BEGIN t\nold\n", FormatTag::Corrupt; "missing end")]
    #[test_case("old\n# END t\n", FormatTag::Corrupt; "missing begin")]
    #[test_case("# MANAGED BY t\n# MANAGED BY t\n", FormatTag::Corrupt; "two legacy")]
    #[test_case("# MANAGED BY t\n# BEGIN t\n# END t\n", FormatTag::Corrupt; "legacy and pair")]
    #[test]
    fn format_detection(content: &str, expect: FormatTag) {
        use pretty_assertions::assert_eq;
        assert_eq!(detect_format(content, &markers()), expect);
    }

    #[test]
    fn legacy_marker_is_ignored_when_opted_out() {
        let markers = Markers::new("t", None).unwrap().without_legacy();
        assert_eq!(
            detect_format("x\n# MANAGED BY t\ny\n", &markers),
            FormatTag::Absent
        );
    }

    #[test]
    fn layout_splits_paired_block() {
        let content = indoc! {"
            foo=1
            # BEGIN t
            old
            # END t
            bar=2
        "};
        let layout = Layout::parse(content, &markers());

        assert_eq!(layout.tag(), FormatTag::PairedMarker);
        assert_eq!(text(layout.managed()), "old\n");
        assert_eq!(
            text(layout.render(&markers(), "new\n")),
            "foo=1\n# BEGIN t\nnew\n# END t\nbar=2\n"
        );
    }

    #[test]
    fn layout_replaces_legacy_line_in_place() {
        let layout = Layout::parse("x\n# MANAGED BY t\ny\n", &markers());
        assert_eq!(
            text(layout.render(&markers(), "new\n")),
            "x\n# BEGIN t\nnew\n# END t\ny\n"
        );
    }

    #[test]
    fn layout_appends_to_unterminated_file() {
        let layout = Layout::parse("export A=1", &markers());
        assert_eq!(
            text(layout.render(&markers(), "new")),
            "export A=1\n# BEGIN t\nnew\n# END t\n"
        );
    }

    #[test]
    fn layout_discards_corrupt_structure() {
        let layout = Layout::parse("a\n# BEGIN t\n# BEGIN t\nb\n# END t\nc\n", &markers());
        assert_eq!(layout.tag(), FormatTag::Corrupt);
        assert_eq!(
            text(layout.render(&markers(), "new\n")),
            "# BEGIN t\nnew\n# END t\n"
        );
    }

    #[test]
    fn layout_keeps_crlf_outside_block() {
        let content = "a\r\n# BEGIN t\r\nold\r\n# END t\r\nb\r\n";
        let layout = Layout::parse(content, &markers());
        assert_eq!(
            text(layout.render(&markers(), "new\n")),
            "a\r\n# BEGIN t\nnew\n# END t\nb\r\n"
        );
    }

    #[test]
    fn relocate_section_moves_block_to_end() {
        let markers = Markers::new("t", Some("path")).unwrap();
        let content = indoc! {"
            a
            # BEGIN t: path
            export PATH=old
            # END t: path
            b
        "};

        let result = text(relocate_section(content, &markers, "export PATH=new\n"));
        let expect = indoc! {"
            a
            b
            # BEGIN t: path
            export PATH=new
            # END t: path
        "};
        assert_eq!(result, expect);

        // Running again only rewrites the trailing block.
        assert_eq!(
            text(relocate_section(&result, &markers, "export PATH=new\n")),
            expect
        );
    }

    #[test]
    fn relocate_section_without_end_drops_tail() {
        let markers = Markers::new("t", None).unwrap();
        let result = relocate_section("a\n# BEGIN t\nb\nc\n", &markers, "new");
        assert_eq!(text(result), "a\n# BEGIN t\nnew\n# END t\n");
    }

    #[test]
    fn relocate_section_drops_stray_end() {
        let markers = Markers::new("t", None).unwrap();
        let result = relocate_section("# END t\na\n", &markers, "new\n");
        assert_eq!(text(result), "a\n# BEGIN t\nnew\n# END t\n");
    }

    #[test]
    fn layout_keeps_non_utf8_bytes_outside_block() {
        let content = b"# caf\xe9\n# BEGIN t\nold\n# END t\n\xff\xfe\n";
        let layout = Layout::parse(content, &markers());

        assert_eq!(layout.tag(), FormatTag::PairedMarker);
        assert_eq!(
            layout.render(&markers(), b"name=caf\xe9\n"),
            b"# caf\xe9\n# BEGIN t\nname=caf\xe9\n# END t\n\xff\xfe\n".to_vec()
        );
    }
}
