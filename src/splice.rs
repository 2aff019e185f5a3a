//! Ranges are 1-based and inclusive. Lines outside the range come back
//! byte-for-byte and in order; the replacement may have any number of lines.
//! Bounds are only meaningful for the document they were computed from.

use crate::document::{Document, LineEnding};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpliceError {
    #[error(
        "invalid line range {start_line}..={end_line} for a document of {total_lines} lines"
    )]
    InvalidRange {
        start_line: usize,
        end_line: usize,
        total_lines: usize,
    },
}

fn check_range(
    document: &Document<'_>,
    start_line: usize,
    end_line: usize,
) -> Result<(), SpliceError> {
    if document.contains_range(start_line, end_line) {
        Ok(())
    } else {
        Err(SpliceError::InvalidRange {
            start_line,
            end_line,
            total_lines: document.line_count(),
        })
    }
}

impl Document<'_> {
    pub fn slice(&self, start_line: usize, end_line: usize) -> Result<String, SpliceError> {
        check_range(self, start_line, end_line)?;
        Ok(self.join_range(start_line, end_line))
    }

    /// Renders the document with lines `start_line..=end_line` replaced.
    ///
    /// In a CRLF document, LF line breaks of the replacement are widened to
    /// CRLF. In an LF document the replacement is inserted byte-for-byte.
    pub fn replace_range(
        &self,
        start_line: usize,
        end_line: usize,
        replacement: &str,
    ) -> Result<String, SpliceError> {
        check_range(self, start_line, end_line)?;
        let lines = self.lines();
        let inserted = replacement_lines(replacement, self.ending());

        let mut out: Vec<&str> =
            Vec::with_capacity(lines.len() - (end_line - start_line) + inserted.len());
        out.extend_from_slice(&lines[..start_line - 1]);
        out.extend_from_slice(&inserted);
        out.extend_from_slice(&lines[end_line..]);
        Ok(out.join(self.ending().as_str()))
    }
}

/// Splits `replacement` on `\n`. For CRLF documents the `\r` in front of
/// each break belongs to the separator, not to the line.
fn replacement_lines(replacement: &str, ending: LineEnding) -> Vec<&str> {
    let mut lines: Vec<&str> = replacement.split('\n').collect();
    if ending == LineEnding::CrLf {
        let last = lines.len() - 1;
        for line in &mut lines[..last] {
            let text: &str = *line;
            *line = text.strip_suffix('\r').unwrap_or(text);
        }
    }
    lines
}

pub fn slice_lines(text: &str, start_line: usize, end_line: usize) -> Result<String, SpliceError> {
    Document::parse(text).slice(start_line, end_line)
}

pub fn replace_lines(
    text: &str,
    start_line: usize,
    end_line: usize,
    replacement: &str,
) -> Result<String, SpliceError> {
    Document::parse(text).replace_range(start_line, end_line, replacement)
}
