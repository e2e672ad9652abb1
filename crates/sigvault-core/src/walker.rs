//! Directory enumeration collaborator.
//!
//! The engine never walks the filesystem directly; it consumes a
//! [`DirectoryWalker`] so exclusion rules and platform quirks stay at the
//! edge. [`IgnoreWalker`] is the default implementation, built on the
//! `ignore` crate with gitignore-syntax exclude patterns.

use std::path::Path;

use ignore::WalkBuilder;

use crate::error::{Result, SigvaultError};

/// One enumerated entry, relative to the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// `/`-separated path relative to the root.
    pub rel_path: String,
    pub is_dir: bool,
}

/// Yields the files and subdirectories of a tree, exclusions already
/// applied. Output order is irrelevant to callers — snapshots are sets.
pub trait DirectoryWalker: Sync {
    fn walk(&self, root: &Path) -> Result<Vec<WalkEntry>>;
}

/// Default walker: no symlink following, hidden files included, explicit
/// exclude patterns in gitignore syntax.
#[derive(Debug, Clone, Default)]
pub struct IgnoreWalker {
    pub exclude_patterns: Vec<String>,
}

impl IgnoreWalker {
    pub fn new(exclude_patterns: Vec<String>) -> Self {
        IgnoreWalker { exclude_patterns }
    }

    fn build_excludes(&self, root: &Path) -> Result<ignore::gitignore::Gitignore> {
        let mut builder = ignore::gitignore::GitignoreBuilder::new(root);
        for pat in &self.exclude_patterns {
            builder.add_line(None, pat).map_err(|e| {
                SigvaultError::Config(format!("invalid exclude pattern '{pat}': {e}"))
            })?;
        }
        builder
            .build()
            .map_err(|e| SigvaultError::Config(format!("exclude matcher build failed: {e}")))
    }
}

impl DirectoryWalker for IgnoreWalker {
    fn walk(&self, root: &Path) -> Result<Vec<WalkEntry>> {
        let excludes = self.build_excludes(root)?;

        let mut builder = WalkBuilder::new(root);
        builder.follow_links(false);
        builder.hidden(false);
        builder.ignore(false);
        builder.git_global(false);
        builder.git_ignore(false);
        builder.git_exclude(false);
        builder.parents(false);
        builder.require_git(false);

        let mut entries = Vec::new();
        for result in builder.build() {
            let entry = result.map_err(|e| SigvaultError::Walk(e.to_string()))?;
            let path = entry.path();
            if path == root {
                continue;
            }
            let rel = path
                .strip_prefix(root)
                .map_err(|e| SigvaultError::Walk(e.to_string()))?;
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            if excludes.matched(rel, is_dir).is_ignore() {
                continue;
            }
            let rel_path = rel
                .to_str()
                .ok_or_else(|| {
                    SigvaultError::Walk(format!("non-UTF-8 path: {}", rel.display()))
                })?
                .replace(std::path::MAIN_SEPARATOR, "/");
            entries.push(WalkEntry { rel_path, is_dir });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn walks_files_and_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("file1"));
        touch(&tmp.path().join("dir1/subdir1/file_subdir1"));
        touch(&tmp.path().join("dir1/subdir1/.project"));

        let walker = IgnoreWalker::default();
        let mut entries = walker.walk(tmp.path()).unwrap();
        entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        let files: Vec<_> = entries
            .iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.rel_path.as_str())
            .collect();
        assert_eq!(
            files,
            vec!["dir1/subdir1/.project", "dir1/subdir1/file_subdir1", "file1"]
        );
        let dirs: Vec<_> = entries
            .iter()
            .filter(|e| e.is_dir)
            .map(|e| e.rel_path.as_str())
            .collect();
        assert_eq!(dirs, vec!["dir1", "dir1/subdir1"]);
    }

    #[test]
    fn exclude_patterns_apply() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("keep.txt"));
        touch(&tmp.path().join("skip.log"));

        let walker = IgnoreWalker::new(vec!["*.log".to_string()]);
        let entries = walker.walk(tmp.path()).unwrap();
        assert!(entries.iter().any(|e| e.rel_path == "keep.txt"));
        assert!(!entries.iter().any(|e| e.rel_path == "skip.log"));
    }
}
