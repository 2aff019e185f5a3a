use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// CRLF only when every `\n` in the text is preceded by `\r`.
    pub fn detect(text: &str) -> Self {
        let breaks = text.matches('\n').count();
        if breaks > 0 && text.matches("\r\n").count() == breaks {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document<'a> {
    lines: Vec<&'a str>,
    ending: LineEnding,
}

impl<'a> Document<'a> {
    pub fn parse(text: &'a str) -> Self {
        let ending = LineEnding::detect(text);
        Self {
            lines: text.split(ending.as_str()).collect(),
            ending,
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn ending(&self) -> LineEnding {
        self.ending
    }

    pub fn lines(&self) -> &[&'a str] {
        &self.lines
    }

    /// Returns line `number` (1-based).
    pub fn line(&self, number: usize) -> Option<&'a str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.lines.get(idx).copied())
    }

    /// Iterates `(line_number, line)` pairs starting at 1.
    pub fn numbered_lines(&self) -> impl Iterator<Item = (usize, &'a str)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .map(|(idx, line)| (idx + 1, *line))
    }

    pub fn contains_range(&self, start_line: usize, end_line: usize) -> bool {
        start_line >= 1 && start_line <= end_line && end_line <= self.lines.len()
    }

    /// Joins lines `start_line..=end_line`. Callers check the range first.
    pub(crate) fn join_range(&self, start_line: usize, end_line: usize) -> String {
        self.lines[start_line - 1..end_line].join(self.ending.as_str())
    }

    pub fn render(&self) -> String {
        self.lines.join(self.ending.as_str())
    }
}

/// A 1-based inclusive line range of one document and the text it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

impl Span {
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}
