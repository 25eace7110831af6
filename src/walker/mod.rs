//! Repository traversal with ignore rules and size/binary filters

use crate::error::{OracleError, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory patterns excluded from every walk, before .gitignore applies.
const HARDCODED_IGNORES: &[&str] = &["node_modules/", "dist/", "build/", ".git/", "*.min.js"];

/// Bytes inspected by the binary-content heuristic.
const BINARY_SNIFF_LEN: usize = 8192;

/// Fraction of non-text bytes above which a file is treated as binary.
const BINARY_RATIO: f64 = 0.30;

/// Walker options
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Maximum accepted file size in bytes; larger files are skipped.
    pub max_bytes: u64,
    /// Additional directory names to ignore (relative to the root).
    pub extra_ignore_dirs: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_bytes: 500 * 1024,
            extra_ignore_dirs: Vec::new(),
        }
    }
}

/// Enumerates candidate files under a repository root.
pub struct RepoWalker {
    root: PathBuf,
    matcher: Gitignore,
    options: WalkOptions,
}

impl RepoWalker {
    /// Create a walker rooted at `root`.
    ///
    /// The ignore matcher is seeded with the hardcoded patterns, extended by
    /// `options.extra_ignore_dirs`, then by `<root>/.gitignore` when present.
    /// A malformed or unreadable .gitignore downgrades to a warning.
    pub fn new(root: &Path, options: WalkOptions) -> Result<Self> {
        if !root.is_dir() {
            return Err(OracleError::InvalidRoot {
                path: root.to_path_buf(),
            });
        }

        let mut builder = GitignoreBuilder::new(root);
        for pattern in HARDCODED_IGNORES {
            builder
                .add_line(None, pattern)
                .map_err(|e| OracleError::Config(format!("Bad ignore pattern {pattern}: {e}")))?;
        }
        for dir in &options.extra_ignore_dirs {
            let pattern = format!("{}/", dir.trim_end_matches('/'));
            builder
                .add_line(None, &pattern)
                .map_err(|e| OracleError::Config(format!("Bad ignore dir {dir}: {e}")))?;
        }

        let gitignore = root.join(".gitignore");
        if gitignore.is_file() {
            if let Some(err) = builder.add(&gitignore) {
                tracing::warn!("Failed to read {}: {}", gitignore.display(), err);
            }
        }

        let matcher = builder
            .build()
            .map_err(|e| OracleError::Config(format!("Failed to build ignore matcher: {e}")))?;

        Ok(Self {
            root: root.to_path_buf(),
            matcher,
            options,
        })
    }

    /// Walk the repository and return accepted file paths, sorted ascending.
    ///
    /// Permission errors on individual entries are warnings; the walk only
    /// fails when the root itself is invalid.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        self.walk_dir(&self.root, &mut files);
        files.sort();
        Ok(files)
    }

    fn walk_dir(&self, dir: &Path, files: &mut Vec<PathBuf>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            // Symlinks and special files are never followed.
            if file_type.is_symlink() {
                continue;
            }

            if self.is_ignored(&path, file_type.is_dir()) {
                continue;
            }

            if file_type.is_dir() {
                self.walk_dir(&path, files);
            } else if file_type.is_file() {
                if self.accept_file(&path) {
                    files.push(path);
                }
            }
        }
    }

    /// Match the root-relative, forward-slash-normalized path.
    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let relative = match path.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) => return false,
        };
        self.matcher
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }

    fn accept_file(&self, path: &Path) -> bool {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                return false;
            }
        };

        if metadata.len() > self.options.max_bytes {
            tracing::warn!(
                "Skipping {} ({} bytes exceeds limit of {})",
                path.display(),
                metadata.len(),
                self.options.max_bytes
            );
            return false;
        }

        match is_binary(path) {
            Ok(true) => false,
            Ok(false) => true,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// NUL-byte / non-text-ratio heuristic over the first 8 KiB.
fn is_binary(path: &Path) -> std::io::Result<bool> {
    use std::io::Read;

    let mut buf = [0u8; BINARY_SNIFF_LEN];
    let mut file = fs::File::open(path)?;
    let n = file.read(&mut buf)?;
    if n == 0 {
        return Ok(false);
    }

    let sample = &buf[..n];
    if sample.contains(&0) {
        return Ok(true);
    }

    let non_text = sample
        .iter()
        .filter(|&&b| b < 0x08 || (0x0e..0x20).contains(&b) || b == 0x7f)
        .count();
    Ok(non_text as f64 / n as f64 > BINARY_RATIO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn discover(root: &Path, options: WalkOptions) -> Vec<String> {
        let walker = RepoWalker::new(root, options).unwrap();
        walker
            .discover()
            .unwrap()
            .into_iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn invalid_root_rejected() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let result = RepoWalker::new(&missing, WalkOptions::default());
        assert!(matches!(result, Err(OracleError::InvalidRoot { .. })));
    }

    #[test]
    fn output_is_sorted_and_skips_hardcoded_dirs() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/b.py", b"x = 1\n");
        touch(temp.path(), "src/a.py", b"y = 2\n");
        touch(temp.path(), "node_modules/pkg/index.js", b"module.exports = {}\n");
        touch(temp.path(), "dist/out.js", b"var x;\n");
        touch(temp.path(), "app.min.js", b"var y;\n");

        let files = discover(temp.path(), WalkOptions::default());
        assert_eq!(files, vec!["src/a.py", "src/b.py"]);
    }

    #[test]
    fn gitignore_extends_hardcoded_patterns() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), ".gitignore", b"*.log\nsecret/\n");
        touch(temp.path(), "keep.py", b"pass\n");
        touch(temp.path(), "noise.log", b"line\n");
        touch(temp.path(), "secret/key.py", b"pass\n");

        let files = discover(temp.path(), WalkOptions::default());
        assert_eq!(files, vec![".gitignore", "keep.py"]);
    }

    #[test]
    fn extra_ignore_dirs_apply() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "vendor/dep.py", b"pass\n");
        touch(temp.path(), "main.py", b"pass\n");

        let options = WalkOptions {
            extra_ignore_dirs: vec!["vendor".to_string()],
            ..Default::default()
        };
        let files = discover(temp.path(), options);
        assert_eq!(files, vec!["main.py"]);
    }

    #[test]
    fn max_bytes_boundary() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "exact.txt", &vec![b'a'; 100]);
        touch(temp.path(), "over.txt", &vec![b'a'; 101]);

        let options = WalkOptions {
            max_bytes: 100,
            ..Default::default()
        };
        let files = discover(temp.path(), options);
        assert_eq!(files, vec!["exact.txt"]);
    }

    #[test]
    fn binary_files_skipped_silently() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "data.bin", b"\x00\x01\x02\x03");
        touch(temp.path(), "text.txt", b"plain text\n");

        let files = discover(temp.path(), WalkOptions::default());
        assert_eq!(files, vec!["text.txt"]);
    }

    #[test]
    fn empty_repository_yields_empty_list() {
        let temp = TempDir::new().unwrap();
        let files = discover(temp.path(), WalkOptions::default());
        assert!(files.is_empty());
    }
}
