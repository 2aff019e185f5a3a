use crate::document::{Document, Span};
use crate::scanner::{Anchor, BlockScanner, DARK_THEME, ROOT, ScanError, THEME};
use serde::Serialize;

/// Start lines of the recognised anchors. `root` and `dark_theme` are
/// `None` when that anchor is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnchorLines {
    pub theme: usize,
    pub root: Option<usize>,
    pub dark_theme: Option<usize>,
    pub dark_theme_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSection {
    #[serde(flatten)]
    pub span: Span,
    pub anchors: AnchorLines,
}

pub fn section_anchors() -> Vec<Anchor> {
    vec![
        Anchor::new(THEME, "@theme").excluding("inline"),
        Anchor::new(ROOT, ":root"),
        Anchor::new(DARK_THEME, ".dark-theme"),
    ]
}

pub fn locate(css: &str) -> Result<Option<TokenSection>, ScanError> {
    locate_in(&Document::parse(css))
}

/// `Ok(None)` when no `@theme` block precedes a closed `.dark-theme` block.
pub fn locate_in(document: &Document<'_>) -> Result<Option<TokenSection>, ScanError> {
    let anchors = section_anchors();
    let mut scanner = BlockScanner::new(&anchors);
    let mut theme = None;
    let mut root = None;
    let mut dark_theme = None;

    for (number, line) in document.numbered_lines() {
        let Some(block) = scanner.step(number, line)? else {
            continue;
        };
        match block.anchor.label.as_str() {
            THEME => {
                theme.get_or_insert(block.start_line);
            }
            ROOT => {
                root.get_or_insert(block.start_line);
            }
            DARK_THEME => {
                dark_theme = Some((block.start_line, block.end_line));
                break;
            }
            _ => {}
        }
    }

    let (Some(theme), Some((dark_start, dark_end))) = (theme, dark_theme) else {
        return Ok(None);
    };

    Ok(Some(TokenSection {
        span: Span {
            start_line: theme,
            end_line: dark_end,
            content: document.join_range(theme, dark_end),
        },
        anchors: AnchorLines {
            theme,
            root,
            dark_theme: Some(dark_start),
            dark_theme_end: dark_end,
        },
    }))
}
