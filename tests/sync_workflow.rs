use std::fs;
use themesync::merge::MergeError;
use themesync::repository::{DirRepository, Repository, RepositoryError, Revision};
use themesync::sync::{SyncError, SyncSettings, SyncStatus, Syncer};
use themesync::{locate, replace_lines};

const TRACKED: &str = "@theme {
  --color-primary: #2563eb;
  --radius: 0.5rem;
}
:root {
  --background: white;
}
.dark-theme {
  --background: black;
}

.button { border-radius: var(--radius); }
";

const EXPORT: &str = "/* exported from the design tool */
@theme {
  --color-primary: #dc2626;
}
:root {
  --background: #fafafa;
}
.dark-theme {
  --background: #0a0a0a;
}
";

fn settings() -> SyncSettings {
    SyncSettings {
        base_branch: "main".to_string(),
        head_branch: "tokens".to_string(),
        path: "app/tokens.css".to_string(),
        commit_message: "Merge tokens".to_string(),
        review_title: "Tokens".to_string(),
        review_body: "Automated token merge".to_string(),
        verify_merged: true,
    }
}

fn seeded_repository(dir: &tempfile::TempDir) -> DirRepository {
    let file = dir.path().join("branches/main/app/tokens.css");
    fs::create_dir_all(file.parent().expect("parent")).expect("mkdir");
    fs::write(&file, TRACKED).expect("seed");
    DirRepository::new(dir.path())
}

/// Keeps the current declarations and swaps in the incoming primary colour.
fn recolor(current: &str, incoming: &str) -> Result<String, MergeError> {
    let color = incoming
        .lines()
        .find(|line| line.contains("--color-primary"))
        .ok_or(MergeError::Empty)?;
    Ok(current
        .lines()
        .map(|line| {
            if line.contains("--color-primary") {
                color
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

#[test]
fn locate_and_splice_the_documented_example() {
    let css = "@theme {\n  --color-primary: blue;\n}\n:root {\n  --background: white;\n}\n.unrelated { color: red; }\n.dark-theme {\n  --background: black;\n}\n.more-unrelated { color: green; }\n";
    let section = locate(css).expect("balanced").expect("section present");
    assert_eq!(section.anchors.theme, 1);
    assert_eq!(section.anchors.root, Some(4));
    assert_eq!(section.anchors.dark_theme, Some(8));
    assert_eq!(section.span.end_line, 10);
    assert!(section.span.content.contains(".unrelated"));

    let spliced = replace_lines(css, 1, 10, "@theme{}").expect("range valid");
    assert_eq!(spliced, "@theme{}\n.more-unrelated { color: green; }\n");
}

#[test]
fn sync_round_trip_through_a_directory_repository() {
    let dir = tempfile::tempdir().expect("tempdir");
    let syncer = Syncer::new(seeded_repository(&dir), recolor, settings());

    let first = syncer.run(EXPORT).expect("first sync");
    assert_eq!(first.status, SyncStatus::Updated);
    assert_eq!((first.start_line, first.end_line), (1, 10));
    assert!(first.review_created);

    let stored = syncer
        .repository()
        .fetch("tokens", "app/tokens.css")
        .expect("fetch")
        .expect("file on head branch");
    assert!(stored.content.contains("--color-primary: #dc2626;"));
    assert!(stored.content.contains("--radius: 0.5rem;"));
    assert!(stored.content.contains("--background: white;"));
    assert!(stored.content.ends_with(".button { border-radius: var(--radius); }\n"));
    assert_eq!(Some(stored.revision.clone()), first.revision);

    let base = syncer
        .repository()
        .fetch("main", "app/tokens.css")
        .expect("fetch")
        .expect("file on base branch");
    assert_eq!(base.content, TRACKED);

    let second = syncer.run(EXPORT).expect("second sync");
    assert_eq!(second.status, SyncStatus::Unchanged);

    let log = fs::read_to_string(dir.path().join("commits.jsonl")).expect("commit log");
    assert_eq!(log.lines().count(), 1);
}

#[test]
fn stale_revision_is_a_conflict() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repository = seeded_repository(&dir);
    let stale = Revision::of("not what is stored");
    let err = repository
        .commit("main", "app/tokens.css", "x", Some(&stale), "overwrite")
        .expect_err("revision mismatch");
    assert!(matches!(err, RepositoryError::Conflict { .. }));

    let syncer = Syncer::new(repository, recolor, settings());
    let err = syncer
        .run(".dark-theme {\n}\n")
        .expect_err("incoming has no @theme");
    assert!(matches!(err, SyncError::SectionNotFound(_)));
}
