use crate::locator::{TokenSection, locate};
use crate::walk::walk_files;
use globset::{Glob, GlobSet};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("discover requires at least one pattern")]
    NoPatterns,
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverOptions {
    pub base_path: PathBuf,
    pub respect_gitignore: bool,
    pub include_node_modules: bool,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            respect_gitignore: true,
            include_node_modules: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum StylesheetStatus {
    Section { section: TokenSection },
    NoSection,
    Malformed { reason: String },
    Unreadable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StylesheetReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: StylesheetStatus,
}

/// Walks `base_path` and reports, for every stylesheet matching `patterns`,
/// whether it carries a token section.
pub fn discover(
    patterns: &[String],
    ignore_patterns: &[String],
    options: &DiscoverOptions,
) -> Result<Vec<StylesheetReport>, DiscoverError> {
    if patterns.is_empty() {
        return Err(DiscoverError::NoPatterns);
    }

    let globset = build_globset(patterns)?;
    let ignore_set = build_globset(ignore_patterns)?;
    let mut paths = Vec::new();

    for file in walk_files(&options.base_path, options.respect_gitignore) {
        let file = match file {
            Ok(file) => file,
            Err(err) => {
                tracing::debug!("skipping unreadable entry: {}", err);
                continue;
            }
        };
        let matches = |set: &GlobSet| set.is_match(&file.relative) || set.is_match(&file.path);
        if !matches(&globset) || matches(&ignore_set) || should_skip_file(&file.path, options) {
            continue;
        }
        paths.push(file.path);
    }

    paths.sort();
    tracing::debug!(files = paths.len(), "inspecting stylesheets");
    Ok(paths.into_iter().map(inspect).collect())
}

fn inspect(path: PathBuf) -> StylesheetReport {
    let status = match fs::read_to_string(&path) {
        Ok(text) => match locate(&text) {
            Ok(Some(section)) => StylesheetStatus::Section { section },
            Ok(None) => StylesheetStatus::NoSection,
            Err(err) => StylesheetStatus::Malformed {
                reason: err.to_string(),
            },
        },
        Err(err) => StylesheetStatus::Unreadable {
            reason: err.to_string(),
        },
    };
    StylesheetReport { path, status }
}

fn should_skip_file(path: &Path, options: &DiscoverOptions) -> bool {
    if !options.include_node_modules
        && path
            .components()
            .any(|component| component.as_os_str() == "node_modules")
    {
        return true;
    }

    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase());
    !ext.as_deref().is_some_and(is_stylesheet_extension)
}

fn is_stylesheet_extension(ext: &str) -> bool {
    matches!(ext, "css" | "pcss" | "postcss")
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet, DiscoverError> {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| DiscoverError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| DiscoverError::InvalidGlob {
        pattern: patterns.join(", "),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{DiscoverError, DiscoverOptions, StylesheetStatus, discover};
    use std::fs;

    const TOKENS: &str = "@theme {\n  --c: red;\n}\n.dark-theme {\n  --c: black;\n}\n";

    fn options_for(base: &std::path::Path) -> DiscoverOptions {
        DiscoverOptions {
            base_path: base.to_path_buf(),
            respect_gitignore: false,
            ..DiscoverOptions::default()
        }
    }

    #[test]
    fn reports_sections_per_stylesheet() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("styles")).expect("mkdir");
        fs::write(dir.path().join("styles/tokens.css"), TOKENS).expect("write");
        fs::write(dir.path().join("styles/plain.css"), ".a { color: red; }\n").expect("write");
        fs::write(dir.path().join("styles/broken.css"), "}\n").expect("write");
        fs::write(dir.path().join("styles/notes.txt"), TOKENS).expect("write");

        let reports = discover(&["**/*".to_string()], &[], &options_for(dir.path()))
            .expect("discover should succeed");

        assert_eq!(reports.len(), 3);
        let by_name = |name: &str| {
            reports
                .iter()
                .find(|report| report.path.ends_with(name))
                .map(|report| report.status.clone())
                .expect("report present")
        };
        match by_name("tokens.css") {
            StylesheetStatus::Section { section } => {
                assert_eq!(section.span.start_line, 1);
                assert_eq!(section.span.end_line, 6);
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(by_name("plain.css"), StylesheetStatus::NoSection);
        assert!(matches!(
            by_name("broken.css"),
            StylesheetStatus::Malformed { .. }
        ));
    }

    #[test]
    fn honours_ignore_patterns_and_node_modules() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("node_modules/pkg")).expect("mkdir");
        fs::create_dir_all(dir.path().join("generated")).expect("mkdir");
        fs::write(dir.path().join("node_modules/pkg/a.css"), TOKENS).expect("write");
        fs::write(dir.path().join("generated/b.css"), TOKENS).expect("write");
        fs::write(dir.path().join("c.css"), TOKENS).expect("write");

        let reports = discover(
            &["**/*.css".to_string()],
            &["generated/**".to_string()],
            &options_for(dir.path()),
        )
        .expect("discover should succeed");

        assert_eq!(reports.len(), 1);
        assert!(reports[0].path.ends_with("c.css"));
    }

    #[test]
    fn rejects_empty_and_invalid_patterns() {
        let options = DiscoverOptions::default();
        assert!(matches!(
            discover(&[], &[], &options),
            Err(DiscoverError::NoPatterns)
        ));
        assert!(matches!(
            discover(&["src/[".to_string()], &[], &options),
            Err(DiscoverError::InvalidGlob { .. })
        ));
    }
}
