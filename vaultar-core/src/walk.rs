//! Recursive, exclusion-aware directory traversal feeding the ingestion
//! pipeline.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A single entry yielded by the walk: an absolute path and its metadata.
pub struct WalkEntry {
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// Recursive, exclusion-aware, depth-first directory traversal.
///
/// Directories that are byte-exact members of the exclusion set, or whose
/// last path component is `lost+found`, are pruned before descent — their
/// subtrees are never opened, so no spurious I/O error can surface for
/// them. A directory that fails to open is reported to `on_error` and the
/// walk continues with the next sibling.
pub struct FileWalker<'a> {
    roots: &'a [PathBuf],
    exclude: &'a HashSet<PathBuf>,
}

impl<'a> FileWalker<'a> {
    pub fn new(roots: &'a [PathBuf], exclude: &'a HashSet<PathBuf>) -> Self {
        Self { roots, exclude }
    }

    fn excluded(&self, path: &Path) -> bool {
        if self.exclude.contains(path) {
            return true;
        }
        path.file_name()
            .map(|n| n == "lost+found")
            .unwrap_or(false)
    }

    /// Walk every configured root, invoking `on_file` for every regular
    /// file (symlinks are yielded as themselves, never followed) and
    /// `on_error` for every directory that failed to open.
    pub fn walk(
        &self,
        mut on_file: impl FnMut(WalkEntry),
        mut on_error: impl FnMut(&Path, &std::io::Error),
    ) {
        for root in self.roots {
            let excl = self.exclude;
            let walker = WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| {
                    if !e.file_type().is_dir() {
                        return true;
                    }
                    !(excl.contains(e.path()) || e.file_name() == "lost+found")
                });

            for entry in walker {
                match entry {
                    Ok(e) => {
                        if self.excluded(e.path()) {
                            continue;
                        }
                        let ft = e.file_type();
                        if ft.is_file() {
                            match e.metadata() {
                                Ok(metadata) => on_file(WalkEntry {
                                    path: e.path().to_path_buf(),
                                    metadata,
                                }),
                                Err(err) => on_error(
                                    e.path(),
                                    &std::io::Error::new(std::io::ErrorKind::Other, err),
                                ),
                            }
                        }
                        // symlinks: yielded as themselves, never descended, never
                        // digested as file content.
                    }
                    Err(err) => {
                        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                        let io_err = err
                            .io_error()
                            .map(|e| std::io::Error::new(e.kind(), e.to_string()))
                            .unwrap_or_else(|| {
                                std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
                            });
                        on_error(&path, &io_err);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn excludes_directory_by_exact_path_and_prunes_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("keep")).unwrap();
        fs::create_dir_all(root.join("skip/nested")).unwrap();
        fs::write(root.join("keep/a.txt"), b"a").unwrap();
        fs::write(root.join("skip/b.txt"), b"b").unwrap();
        fs::write(root.join("skip/nested/c.txt"), b"c").unwrap();

        let mut exclude = HashSet::new();
        exclude.insert(root.join("skip"));
        let roots = vec![root.clone()];
        let walker = FileWalker::new(&roots, &exclude);

        let mut seen = Vec::new();
        walker.walk(|e| seen.push(e.path), |_, _| {});

        assert_eq!(seen, vec![root.join("keep/a.txt")]);
    }

    #[test]
    fn skips_lost_and_found() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("lost+found")).unwrap();
        fs::write(root.join("lost+found/orphan.txt"), b"x").unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();

        let exclude = HashSet::new();
        let roots = vec![root.clone()];
        let walker = FileWalker::new(&roots, &exclude);

        let mut seen = Vec::new();
        walker.walk(|e| seen.push(e.path), |_, _| {});

        assert_eq!(seen, vec![root.join("a.txt")]);
    }
}
