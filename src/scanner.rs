//! Line-oriented block scanner.
//!
//! Blocks are located by counting `{` and `}` per line rather than parsing
//! CSS. A brace inside a comment or string literal is counted like any other
//! brace, so stylesheets that put unbalanced braces there are outside what
//! this scanner supports.

use crate::document::{Document, Span};
use serde::{Deserialize, Serialize};

pub const THEME: &str = "theme";
pub const THEME_INLINE: &str = "theme-inline";
pub const ROOT: &str = "root";
pub const DARK_THEME: &str = "dark-theme";

/// Recognises the first line of a block by its trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub label: String,
    pub prefix: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl Anchor {
    pub fn new(label: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prefix: prefix.into(),
            requires: Vec::new(),
            excludes: Vec::new(),
        }
    }

    pub fn requiring(mut self, needle: impl Into<String>) -> Self {
        self.requires.push(needle.into());
        self
    }

    pub fn excluding(mut self, needle: impl Into<String>) -> Self {
        self.excludes.push(needle.into());
        self
    }

    pub fn matches(&self, trimmed: &str) -> bool {
        trimmed.starts_with(&self.prefix)
            && self.requires.iter().all(|needle| trimmed.contains(needle))
            && !self.excludes.iter().any(|needle| trimmed.contains(needle))
    }
}

/// Classification order used when listing every design-token block.
pub fn token_anchors() -> Vec<Anchor> {
    vec![
        Anchor::new(THEME_INLINE, "@theme").requiring("inline"),
        Anchor::new(THEME, "@theme"),
        Anchor::new(ROOT, ":root"),
        Anchor::new(DARK_THEME, ".dark-theme"),
    ]
}

/// Net brace count of one line.
pub fn brace_delta(line: &str) -> i64 {
    line.chars().fold(0, |depth, ch| match ch {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("unbalanced closing brace on line {line}")]
    UnbalancedBraces { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedBlock<'a> {
    pub anchor: &'a Anchor,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnclosedBlock<'a> {
    pub anchor: &'a Anchor,
    pub start_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State<'a> {
    Idle,
    InBlock {
        anchor: &'a Anchor,
        start_line: usize,
        depth: i64,
        opened: bool,
    },
}

/// Streaming state machine over numbered lines.
///
/// Feed lines in order with [`BlockScanner::step`]; a block is reported on
/// the line where it closes. Anchors are only recognised while no other
/// block is open, so blocks never overlap.
#[derive(Debug, Clone)]
pub struct BlockScanner<'a> {
    anchors: &'a [Anchor],
    state: State<'a>,
    outer_depth: i64,
}

impl<'a> BlockScanner<'a> {
    pub fn new(anchors: &'a [Anchor]) -> Self {
        Self {
            anchors,
            state: State::Idle,
            outer_depth: 0,
        }
    }

    pub fn step(
        &mut self,
        line_number: usize,
        line: &str,
    ) -> Result<Option<ClosedBlock<'a>>, ScanError> {
        let delta = brace_delta(line);
        let opens = line.contains('{');

        match self.state {
            State::Idle => {
                let anchors = self.anchors;
                let trimmed = line.trim();
                let Some(anchor) = anchors.iter().find(|anchor| anchor.matches(trimmed)) else {
                    self.outer_depth += delta;
                    if self.outer_depth < 0 {
                        return Err(ScanError::UnbalancedBraces { line: line_number });
                    }
                    return Ok(None);
                };
                if delta < 0 {
                    return Err(ScanError::UnbalancedBraces { line: line_number });
                }
                if opens && delta == 0 {
                    return Ok(Some(ClosedBlock {
                        anchor,
                        start_line: line_number,
                        end_line: line_number,
                    }));
                }
                self.state = State::InBlock {
                    anchor,
                    start_line: line_number,
                    depth: delta,
                    opened: opens,
                };
                Ok(None)
            }
            State::InBlock {
                anchor,
                start_line,
                depth,
                opened,
            } => {
                let depth = depth + delta;
                let opened = opened || opens;
                if depth < 0 {
                    return Err(ScanError::UnbalancedBraces { line: line_number });
                }
                if opened && depth == 0 {
                    self.state = State::Idle;
                    return Ok(Some(ClosedBlock {
                        anchor,
                        start_line,
                        end_line: line_number,
                    }));
                }
                self.state = State::InBlock {
                    anchor,
                    start_line,
                    depth,
                    opened,
                };
                Ok(None)
            }
        }
    }

    /// The block still open at end of input, if any.
    pub fn finish(self) -> Option<UnclosedBlock<'a>> {
        match self.state {
            State::Idle => None,
            State::InBlock {
                anchor, start_line, ..
            } => Some(UnclosedBlock { anchor, start_line }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub label: String,
    #[serde(flatten)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unclosed {
    pub label: String,
    pub start_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ScanOutcome {
    pub blocks: Vec<Block>,
    pub unclosed: Option<Unclosed>,
}

/// Lists every anchor block of `document` in source order.
pub fn scan_blocks(document: &Document<'_>, anchors: &[Anchor]) -> Result<ScanOutcome, ScanError> {
    let mut scanner = BlockScanner::new(anchors);
    let mut blocks = Vec::new();

    for (number, line) in document.numbered_lines() {
        if let Some(closed) = scanner.step(number, line)? {
            blocks.push(Block {
                label: closed.anchor.label.clone(),
                span: Span {
                    start_line: closed.start_line,
                    end_line: closed.end_line,
                    content: document.join_range(closed.start_line, closed.end_line),
                },
            });
        }
    }

    let unclosed = scanner.finish().map(|open| Unclosed {
        label: open.anchor.label.clone(),
        start_line: open.start_line,
    });
    Ok(ScanOutcome { blocks, unclosed })
}
