//! Shared fixtures for integration tests
#![allow(dead_code)]

use oracle::embedding::EmbeddingProvider;
use oracle::error::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const TEST_DIM: usize = 384;

/// Deterministic bag-of-tokens embedder: no model download, stable across
/// runs, and texts sharing tokens land closer in cosine space. Tracks how
/// often it was invoked so tests can assert the embedder was bypassed.
pub struct TestEmbedder {
    calls: AtomicUsize,
}

impl TestEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; TEST_DIM];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let idx = (hasher.finish() % TEST_DIM as u64) as usize;
            v[idx] += 1.0;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            v[0] = 1.0;
        }
        v
    }
}

impl EmbeddingProvider for TestEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::embed_one(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        TEST_DIM
    }

    fn model_name(&self) -> &str {
        "test-embedder"
    }
}

/// Write a file under the fixture repository, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Initialize a git repository with one commit over the current tree, so
/// incremental indexing has a checkpoint to diff against.
pub fn git_commit_all(root: &Path) {
    let git = |args: &[&str]| {
        let status = std::process::Command::new("git")
            .arg("-C")
            .arg(root)
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .expect("git is available in the test environment");
        assert!(status.success(), "git {args:?} failed");
    };

    if !root.join(".git").exists() {
        git(&["init", "-q"]);
        git(&["config", "user.email", "test@example.com"]);
        git(&["config", "user.name", "test"]);
    }
    git(&["add", "-A"]);
    git(&["commit", "-q", "-m", "checkpoint", "--allow-empty"]);
}
