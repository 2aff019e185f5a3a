use crate::config::Config;
use crate::document::Document;
use crate::locator::{TokenSection, locate, locate_in};
use crate::merge::{MergeError, Merger};
use crate::repository::{Repository, RepositoryError, ReviewRequest, Revision};
use crate::scanner::ScanError;
use crate::splice::SpliceError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Current,
    Incoming,
    Merged,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Current => "current",
            Side::Incoming => "incoming",
            Side::Merged => "merged",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no design token section in the {0} stylesheet")]
    SectionNotFound(Side),
    #[error("malformed {side} stylesheet: {source}")]
    Malformed {
        side: Side,
        #[source]
        source: ScanError,
    },
    #[error("{path} does not exist on {branch}")]
    MissingFile { branch: String, path: String },
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Splice(#[from] SpliceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub base_branch: String,
    pub head_branch: String,
    pub path: String,
    pub commit_message: String,
    pub review_title: String,
    pub review_body: String,
    pub verify_merged: bool,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_branch: config.repository.base_branch.clone(),
            head_branch: config.repository.branch.clone(),
            path: config.repository.path.clone(),
            commit_message: config.review.commit_message.clone(),
            review_title: config.review.title.clone(),
            review_body: config.review.body.clone(),
            verify_merged: config.merge.verify,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// The incoming section already matches the current one.
    UpToDate,
    /// The merge produced the current document again.
    Unchanged,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub branch: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub revision: Option<Revision>,
    pub review: Option<ReviewRequest>,
    pub review_created: bool,
}

#[derive(Debug, Default)]
struct BranchLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BranchLocks {
    fn handle(&self, branch: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(branch.to_string())
            .or_default()
            .clone()
    }
}

pub struct Syncer<R, M> {
    repository: R,
    merger: M,
    settings: SyncSettings,
    locks: BranchLocks,
}

fn section_of(document: &Document<'_>, side: Side) -> Result<TokenSection, SyncError> {
    locate_in(document)
        .map_err(|source| SyncError::Malformed { side, source })?
        .ok_or(SyncError::SectionNotFound(side))
}

impl<R: Repository, M: Merger> Syncer<R, M> {
    pub fn new(repository: R, merger: M, settings: SyncSettings) -> Self {
        Self {
            repository,
            merger,
            settings,
            locks: BranchLocks::default(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn run(&self, incoming_css: &str) -> Result<SyncReport, SyncError> {
        let settings = &self.settings;
        let head = settings.head_branch.as_str();
        let base = settings.base_branch.as_str();
        let path = settings.path.as_str();

        let lock = self.locks.handle(head);
        let _guard = lock.lock();

        if !self.repository.branch_exists(head)? {
            tracing::info!(%base, %head, "creating branch");
            self.repository.create_branch(base, head)?;
        }
        let current = self
            .repository
            .fetch(head, path)?
            .ok_or_else(|| SyncError::MissingFile {
                branch: head.to_string(),
                path: path.to_string(),
            })?;

        let current_doc = Document::parse(&current.content);
        let current_section = section_of(&current_doc, Side::Current)?;
        let incoming_section = section_of(&Document::parse(incoming_css), Side::Incoming)?;
        tracing::debug!(
            start = current_section.span.start_line,
            end = current_section.span.end_line,
            incoming_lines = incoming_section.span.line_count(),
            "located token sections"
        );

        let report = |status, revision, review: Option<ReviewRequest>, created| SyncReport {
            status,
            branch: head.to_string(),
            path: path.to_string(),
            start_line: current_section.span.start_line,
            end_line: current_section.span.end_line,
            revision,
            review,
            review_created: created,
        };

        if current_section.span.content == incoming_section.span.content {
            tracing::info!(%head, %path, "token section already up to date");
            return Ok(report(SyncStatus::UpToDate, None, None, false));
        }

        let merged = self
            .merger
            .merge(&current_section.span.content, &incoming_section.span.content)?;
        if settings.verify_merged {
            locate(&merged)
                .map_err(|source| SyncError::Malformed {
                    side: Side::Merged,
                    source,
                })?
                .ok_or(SyncError::SectionNotFound(Side::Merged))?;
        }

        let updated = current_doc.replace_range(
            current_section.span.start_line,
            current_section.span.end_line,
            &merged,
        )?;
        if updated == current.content {
            tracing::info!(%head, %path, "merge left the stylesheet unchanged");
            return Ok(report(SyncStatus::Unchanged, None, None, false));
        }

        let revision = self.repository.commit(
            head,
            path,
            &updated,
            Some(&current.revision),
            &settings.commit_message,
        )?;
        tracing::info!(%head, %path, revision = revision.short(), "committed merged tokens");

        let (review, created) = match self.repository.find_review(head, base)? {
            Some(review) => (review, false),
            None => {
                let review = self.repository.open_review(
                    head,
                    base,
                    &settings.review_title,
                    &settings.review_body,
                )?;
                tracing::info!(number = review.number, "opened review request");
                (review, true)
            }
        };

        Ok(report(
            SyncStatus::Updated,
            Some(revision),
            Some(review),
            created,
        ))
    }
}
