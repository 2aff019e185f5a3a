use crate::walk::walk_files;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// Optimistic concurrency token: SHA-256 of the file content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn of(content: &str) -> Self {
        Self(format!("{:x}", Sha256::digest(content.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVersion {
    pub content: String,
    pub revision: Revision,
}

impl FileVersion {
    pub fn new(content: String) -> Self {
        let revision = Revision::of(&content);
        Self { content, revision }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub number: u64,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("branch {0} does not exist")]
    MissingBranch(String),
    #[error("branch {0} already exists")]
    BranchExists(String),
    #[error("{path} on {branch} changed since revision {}", .expected.short())]
    Conflict {
        branch: String,
        path: String,
        expected: Revision,
    },
    #[error("invalid repository path {0}")]
    InvalidPath(String),
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait Repository {
    fn branch_exists(&self, branch: &str) -> Result<bool, RepositoryError>;

    /// Creates `to` with the content of `from`.
    fn create_branch(&self, from: &str, to: &str) -> Result<(), RepositoryError>;

    fn fetch(&self, branch: &str, path: &str) -> Result<Option<FileVersion>, RepositoryError>;

    /// Writes `content` when the stored revision still equals `expected`
    /// (`None` means the file must not exist yet).
    fn commit(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        expected: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, RepositoryError>;

    fn find_review(&self, head: &str, base: &str) -> Result<Option<ReviewRequest>, RepositoryError>;

    fn open_review(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<ReviewRequest, RepositoryError>;
}

fn check_expected(
    branch: &str,
    path: &str,
    stored: Option<&str>,
    expected: Option<&Revision>,
) -> Result<(), RepositoryError> {
    let current = stored.map(Revision::of);
    if current.as_ref() == expected {
        return Ok(());
    }
    Err(RepositoryError::Conflict {
        branch: branch.to_string(),
        path: path.to_string(),
        expected: expected
            .cloned()
            .unwrap_or_else(|| Revision(String::from("none"))),
    })
}

fn validate_path(path: &str) -> Result<(), RepositoryError> {
    let relative = Path::new(path);
    let valid = !path.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(RepositoryError::InvalidPath(path.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub branch: String,
    pub path: String,
    pub revision: Revision,
    pub message: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    branches: BTreeMap<String, BTreeMap<String, String>>,
    reviews: Vec<ReviewRequest>,
    commits: Vec<CommitRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(branch: &str, path: &str, content: &str) -> Self {
        let repository = Self::new();
        repository
            .state
            .lock()
            .branches
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
        repository
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        self.state.lock().commits.clone()
    }

    pub fn reviews(&self) -> Vec<ReviewRequest> {
        self.state.lock().reviews.clone()
    }

    /// Overwrites a file without a revision check, as an outside writer would.
    pub fn overwrite(&self, branch: &str, path: &str, content: &str) {
        self.state
            .lock()
            .branches
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
    }
}

impl Repository for MemoryRepository {
    fn branch_exists(&self, branch: &str) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().branches.contains_key(branch))
    }

    fn create_branch(&self, from: &str, to: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        if state.branches.contains_key(to) {
            return Err(RepositoryError::BranchExists(to.to_string()));
        }
        let files = state
            .branches
            .get(from)
            .cloned()
            .ok_or_else(|| RepositoryError::MissingBranch(from.to_string()))?;
        state.branches.insert(to.to_string(), files);
        Ok(())
    }

    fn fetch(&self, branch: &str, path: &str) -> Result<Option<FileVersion>, RepositoryError> {
        let state = self.state.lock();
        let files = state
            .branches
            .get(branch)
            .ok_or_else(|| RepositoryError::MissingBranch(branch.to_string()))?;
        Ok(files.get(path).cloned().map(FileVersion::new))
    }

    fn commit(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        expected: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, RepositoryError> {
        let mut state = self.state.lock();
        let files = state
            .branches
            .get_mut(branch)
            .ok_or_else(|| RepositoryError::MissingBranch(branch.to_string()))?;
        check_expected(branch, path, files.get(path).map(String::as_str), expected)?;
        files.insert(path.to_string(), content.to_string());
        let revision = Revision::of(content);
        state.commits.push(CommitRecord {
            branch: branch.to_string(),
            path: path.to_string(),
            revision: revision.clone(),
            message: message.to_string(),
        });
        Ok(revision)
    }

    fn find_review(&self, head: &str, base: &str) -> Result<Option<ReviewRequest>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .reviews
            .iter()
            .find(|review| review.head == head && review.base == base)
            .cloned())
    }

    fn open_review(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<ReviewRequest, RepositoryError> {
        let mut state = self.state.lock();
        let review = ReviewRequest {
            number: state.reviews.len() as u64 + 1,
            head: head.to_string(),
            base: base.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        };
        state.reviews.push(review.clone());
        Ok(review)
    }
}

#[derive(Debug, Serialize)]
struct CommitLogEntry<'a> {
    branch: &'a str,
    path: &'a str,
    revision: &'a Revision,
    message: &'a str,
}

/// Stores branches as directories:
///
/// ```text
/// <root>/branches/<branch>/<path>
/// <root>/reviews.json
/// <root>/commits.jsonl
/// ```
///
/// `<branch>` is a single directory name: `%` and `/` in branch names are
/// written as `%25` and `%2F`, so `feature/x` never nests under `feature`.
#[derive(Debug)]
pub struct DirRepository {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DirRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn branch_dir(&self, branch: &str) -> Result<PathBuf, RepositoryError> {
        validate_path(branch)?;
        Ok(self.root.join("branches").join(branch_dir_name(branch)))
    }

    fn file_path(&self, branch: &str, path: &str) -> Result<PathBuf, RepositoryError> {
        validate_path(path)?;
        Ok(self.branch_dir(branch)?.join(path))
    }

    fn reviews_path(&self) -> PathBuf {
        self.root.join("reviews.json")
    }

    fn load_reviews(&self) -> Result<Vec<ReviewRequest>, RepositoryError> {
        let path = self.reviews_path();
        match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| RepositoryError::Json {
                path: path.clone(),
                source,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(RepositoryError::Io { path, source }),
        }
    }

    fn append_commit_log(&self, entry: &CommitLogEntry<'_>) -> Result<(), RepositoryError> {
        let path = self.root.join("commits.jsonl");
        let mut line = serde_json::to_string(entry).map_err(|source| RepositoryError::Json {
            path: path.clone(),
            source,
        })?;
        line.push('\n');
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|source| RepositoryError::Io { path, source })
    }
}

fn branch_dir_name(branch: &str) -> String {
    branch.replace('%', "%25").replace('/', "%2F")
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RepositoryError + '_ {
    move |source| RepositoryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, RepositoryError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(RepositoryError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), RepositoryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(path, content).map_err(io_error(path))
}

impl Repository for DirRepository {
    fn branch_exists(&self, branch: &str) -> Result<bool, RepositoryError> {
        Ok(self.branch_dir(branch)?.is_dir())
    }

    fn create_branch(&self, from: &str, to: &str) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock();
        let source = self.branch_dir(from)?;
        let target = self.branch_dir(to)?;
        if !source.is_dir() {
            return Err(RepositoryError::MissingBranch(from.to_string()));
        }
        if target.exists() {
            return Err(RepositoryError::BranchExists(to.to_string()));
        }
        fs::create_dir_all(&target).map_err(io_error(&target))?;

        for file in walk_files(&source, false) {
            let file = file.map_err(|err| RepositoryError::Io {
                path: source.clone(),
                source: io::Error::other(err.to_string()),
            })?;
            let destination = target.join(&file.relative);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            fs::copy(&file.path, &destination).map_err(io_error(&destination))?;
        }
        Ok(())
    }

    fn fetch(&self, branch: &str, path: &str) -> Result<Option<FileVersion>, RepositoryError> {
        if !self.branch_exists(branch)? {
            return Err(RepositoryError::MissingBranch(branch.to_string()));
        }
        Ok(read_optional(&self.file_path(branch, path)?)?.map(FileVersion::new))
    }

    fn commit(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        expected: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, RepositoryError> {
        let _guard = self.write_lock.lock();
        if !self.branch_exists(branch)? {
            return Err(RepositoryError::MissingBranch(branch.to_string()));
        }
        let file = self.file_path(branch, path)?;
        let stored = read_optional(&file)?;
        check_expected(branch, path, stored.as_deref(), expected)?;
        write_file(&file, content)?;

        let revision = Revision::of(content);
        self.append_commit_log(&CommitLogEntry {
            branch,
            path,
            revision: &revision,
            message,
        })?;
        Ok(revision)
    }

    fn find_review(&self, head: &str, base: &str) -> Result<Option<ReviewRequest>, RepositoryError> {
        Ok(self
            .load_reviews()?
            .into_iter()
            .find(|review| review.head == head && review.base == base))
    }

    fn open_review(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<ReviewRequest, RepositoryError> {
        let _guard = self.write_lock.lock();
        let mut reviews = self.load_reviews()?;
        let review = ReviewRequest {
            number: reviews.iter().map(|review| review.number).max().unwrap_or(0) + 1,
            head: head.to_string(),
            base: base.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        };
        reviews.push(review.clone());

        let path = self.reviews_path();
        let text = serde_json::to_string_pretty(&reviews).map_err(|source| {
            RepositoryError::Json {
                path: path.clone(),
                source,
            }
        })?;
        write_file(&path, &text)?;
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DirRepository, MemoryRepository, Repository, RepositoryError, Revision, branch_dir_name,
    };
    use std::fs;

    #[test]
    fn revisions_are_content_hashes() {
        assert_eq!(Revision::of("a"), Revision::of("a"));
        assert_ne!(Revision::of("a"), Revision::of("b"));
        assert_eq!(Revision::of("").as_str().len(), 64);
        assert_eq!(Revision::of("a").short().len(), 12);
    }

    #[test]
    fn memory_commit_requires_the_read_revision() {
        let repo = MemoryRepository::with_file("main", "tokens.css", "old");
        let read = repo
            .fetch("main", "tokens.css")
            .expect("fetch")
            .expect("file exists");

        repo.overwrite("main", "tokens.css", "someone else");
        let err = repo
            .commit("main", "tokens.css", "new", Some(&read.revision), "update")
            .expect_err("stale revision");
        assert!(matches!(err, RepositoryError::Conflict { .. }));

        let fresh = repo.fetch("main", "tokens.css").expect("fetch").expect("file");
        let revision = repo
            .commit("main", "tokens.css", "new", Some(&fresh.revision), "update")
            .expect("commit");
        assert_eq!(revision, Revision::of("new"));
        assert_eq!(repo.commits().len(), 1);
    }

    #[test]
    fn memory_branches_copy_their_source() {
        let repo = MemoryRepository::with_file("main", "a.css", "x");
        assert!(!repo.branch_exists("tokens").expect("exists"));
        repo.create_branch("main", "tokens").expect("create");
        assert_eq!(
            repo.fetch("tokens", "a.css").expect("fetch").map(|v| v.content),
            Some("x".to_string())
        );
        assert!(matches!(
            repo.create_branch("main", "tokens"),
            Err(RepositoryError::BranchExists(_))
        ));
        assert!(matches!(
            repo.fetch("missing", "a.css"),
            Err(RepositoryError::MissingBranch(_))
        ));
    }

    #[test]
    fn memory_reviews_are_found_by_head_and_base() {
        let repo = MemoryRepository::new();
        assert_eq!(repo.find_review("tokens", "main").expect("find"), None);
        let opened = repo
            .open_review("tokens", "main", "Update tokens", "body")
            .expect("open");
        assert_eq!(opened.number, 1);
        assert_eq!(
            repo.find_review("tokens", "main").expect("find"),
            Some(opened)
        );
        assert_eq!(repo.find_review("tokens", "release").expect("find"), None);
    }

    #[test]
    fn dir_repository_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let main_file = dir.path().join("branches/main/src/styles/tokens.css");
        fs::create_dir_all(main_file.parent().expect("parent")).expect("mkdir");
        fs::write(&main_file, "old").expect("write");

        let repo = DirRepository::new(dir.path());
        repo.create_branch("main", "design/tokens").expect("create");
        let read = repo
            .fetch("design/tokens", "src/styles/tokens.css")
            .expect("fetch")
            .expect("copied file");
        assert_eq!(read.content, "old");

        repo.commit(
            "design/tokens",
            "src/styles/tokens.css",
            "new",
            Some(&read.revision),
            "Merge tokens",
        )
        .expect("commit");
        assert_eq!(fs::read_to_string(&main_file).expect("read"), "old");
        assert_eq!(
            fs::read_to_string(dir.path().join("branches/design%2Ftokens/src/styles/tokens.css"))
                .expect("read"),
            "new"
        );
        let log = fs::read_to_string(dir.path().join("commits.jsonl")).expect("log");
        assert!(log.contains("\"message\":\"Merge tokens\""));

        let err = repo
            .commit(
                "design/tokens",
                "src/styles/tokens.css",
                "newer",
                Some(&read.revision),
                "again",
            )
            .expect_err("stale revision");
        assert!(matches!(err, RepositoryError::Conflict { .. }));
    }

    #[test]
    fn dir_repository_persists_reviews() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = DirRepository::new(dir.path());
        repo.open_review("tokens", "main", "t", "b").expect("open");
        let second = repo.open_review("other", "main", "t", "b").expect("open");
        assert_eq!(second.number, 2);

        let reopened = DirRepository::new(dir.path());
        let found = reopened
            .find_review("tokens", "main")
            .expect("find")
            .expect("review");
        assert_eq!(found.number, 1);
    }

    #[test]
    fn dir_repository_rejects_escaping_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("branches/main")).expect("mkdir");
        let repo = DirRepository::new(dir.path());
        for path in ["../secret.css", "/etc/passwd", "a/../../b.css", ""] {
            assert!(matches!(
                repo.fetch("main", path),
                Err(RepositoryError::InvalidPath(_))
            ));
        }
    }

    #[test]
    fn branch_names_map_to_one_directory() {
        assert_eq!(branch_dir_name("main"), "main");
        assert_eq!(branch_dir_name("feature/x"), "feature%2Fx");
        assert_eq!(branch_dir_name("50%/off"), "50%25%2Foff");
        assert_ne!(branch_dir_name("a%2Fb"), branch_dir_name("a/b"));
    }

    #[test]
    fn nested_branch_name_stays_apart_from_its_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let main_file = dir.path().join("branches/main/a.css");
        fs::create_dir_all(main_file.parent().expect("parent")).expect("mkdir");
        fs::write(&main_file, "x").expect("write");
        let repo = DirRepository::new(dir.path());

        repo.create_branch("main", "main/next").expect("create");
        assert!(!dir.path().join("branches/main/next").exists());
        assert_eq!(
            repo.fetch("main", "next/a.css").expect("fetch"),
            None
        );
        assert_eq!(
            repo.fetch("main/next", "a.css")
                .expect("fetch")
                .map(|version| version.content),
            Some("x".to_string())
        );

        repo.commit("main/next", "a.css", "y", Some(&Revision::of("x")), "edit")
            .expect("commit");
        assert_eq!(fs::read_to_string(&main_file).expect("read"), "x");
    }

    #[test]
    fn branch_prefix_does_not_exist_on_its_own() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("branches/main")).expect("mkdir");
        let repo = DirRepository::new(dir.path());

        repo.create_branch("main", "feature/x").expect("create");
        assert!(repo.branch_exists("feature/x").expect("exists"));
        assert!(!repo.branch_exists("feature").expect("exists"));
        assert!(matches!(
            repo.fetch("feature", "a.css"),
            Err(RepositoryError::MissingBranch(_))
        ));
    }
}
