use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WalkedFile {
    pub path: PathBuf,
    /// `path` relative to the walk root.
    pub relative: PathBuf,
}

/// Regular files under `root`, hidden ones included. With
/// `respect_ignore_files` off, `.gitignore` and `.ignore` rules are skipped
/// so every file comes back.
pub(crate) fn walk_files(
    root: &Path,
    respect_ignore_files: bool,
) -> impl Iterator<Item = Result<WalkedFile, ignore::Error>> + '_ {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .ignore(respect_ignore_files)
        .parents(respect_ignore_files)
        .git_ignore(respect_ignore_files)
        .git_global(respect_ignore_files)
        .git_exclude(respect_ignore_files);

    builder.build().filter_map(move |entry| match entry {
        Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
            let path = entry.into_path();
            let relative = path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            Some(Ok(WalkedFile { path, relative }))
        }
        Ok(_) => None,
        Err(err) => Some(Err(err)),
    })
}

#[cfg(test)]
mod tests {
    use super::walk_files;
    use std::fs;
    use std::path::PathBuf;

    fn relative_files(root: &std::path::Path, respect: bool) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walk_files(root, respect)
            .map(|file| file.expect("readable entry").relative)
            .collect();
        files.sort();
        files
    }

    #[test]
    fn lists_nested_and_hidden_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("a/b")).expect("mkdir");
        fs::write(dir.path().join("a/b/c.css"), "").expect("write");
        fs::write(dir.path().join(".hidden.css"), "").expect("write");

        assert_eq!(
            relative_files(dir.path(), false),
            vec![PathBuf::from(".hidden.css"), PathBuf::from("a/b/c.css")]
        );
    }

    #[test]
    fn ignore_files_apply_only_when_respected() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(".ignore"), "dist/\n").expect("write");
        fs::create_dir_all(dir.path().join("dist")).expect("mkdir");
        fs::write(dir.path().join("dist/out.css"), "").expect("write");
        fs::write(dir.path().join("app.css"), "").expect("write");

        assert_eq!(
            relative_files(dir.path(), true),
            vec![PathBuf::from(".ignore"), PathBuf::from("app.css")]
        );
        assert_eq!(
            relative_files(dir.path(), false),
            vec![
                PathBuf::from(".ignore"),
                PathBuf::from("app.css"),
                PathBuf::from("dist/out.css"),
            ]
        );
    }
}
