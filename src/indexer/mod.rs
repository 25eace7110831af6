//! Build pipelines: full rebuilds and incremental updates
//!
//! walk → chunk → store → mirror into the lexical and vector indices.

use crate::chunking::{chunk_source, Chunk, GrammarRegistry};
use crate::embedding::{BatchEmbedder, BatchItem, EmbeddingProvider};
use crate::error::{OracleError, Result};
use crate::hash::content_digest;
use crate::index::{LexicalIndex, VectorIndex, VectorIndexParams};
use crate::store::ChunkStore;
use crate::walker::{RepoWalker, WalkOptions};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;

pub use crate::embedding::ProgressFn;

/// Embedding batch size during index builds.
const EMBED_BATCH_SIZE: usize = 32;

/// On-disk layout of the persisted state, rooted at the `.oracle` directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub db: PathBuf,
    pub lexical: PathBuf,
    pub vector: PathBuf,
}

impl IndexPaths {
    /// Standard layout under an index directory.
    pub fn new(index_dir: &Path) -> Self {
        Self {
            db: index_dir.join("index.db"),
            lexical: index_dir.join("bm25.tantivy"),
            vector: index_dir.join("vectors.usearch"),
        }
    }

    /// Same layout with an explicit database path.
    pub fn with_db(index_dir: &Path, db: PathBuf) -> Self {
        Self {
            db,
            ..Self::new(index_dir)
        }
    }
}

/// Options for a build run.
#[derive(Clone, Default)]
pub struct IndexOptions {
    pub walk: WalkOptions,
    /// Restrict the walk to a subdirectory of the repository.
    pub scope: Option<PathBuf>,
    pub progress: Option<Arc<ProgressFn>>,
}

/// Outcome of a build run.
#[derive(Debug, Default, Clone)]
pub struct IndexStats {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub chunks_created: usize,
    pub duration_ms: u64,
}

/// Orchestrates full and incremental index builds.
pub struct Indexer {
    registry: GrammarRegistry,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_params: VectorIndexParams,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, vector_params: VectorIndexParams) -> Result<Self> {
        Ok(Self {
            registry: GrammarRegistry::with_default_grammars()?,
            embedder,
            vector_params,
        })
    }

    /// Rebuild everything from scratch: truncate the store, re-chunk the
    /// repository, and rewrite both indices. Issues a fresh id generation.
    pub fn full_index(
        &self,
        repo_path: &Path,
        paths: &IndexPaths,
        options: &IndexOptions,
    ) -> Result<IndexStats> {
        let start = Instant::now();
        let mut stats = IndexStats::default();

        let store = ChunkStore::open(&paths.db)?;
        store.delete_all()?;

        let walk_root = match &options.scope {
            Some(scope) => repo_path.join(scope),
            None => repo_path.to_path_buf(),
        };
        // The engine's own state directory never feeds back into the index.
        let mut walk = options.walk.clone();
        walk.extra_ignore_dirs.push(".oracle".to_string());
        let walker = RepoWalker::new(&walk_root, walk)?;
        let files = walker.discover()?;
        stats.files_discovered = files.len();
        tracing::info!("Discovered {} candidate files", files.len());

        let mut chunks: Vec<Chunk> = Vec::new();
        for file in &files {
            let Some(registration) = self.registry.for_path(file) else {
                continue;
            };
            let rel_path = relative_path(repo_path, file);

            match std::fs::read_to_string(file) {
                Ok(content) => match chunk_source(&rel_path, &content, &registration) {
                    Ok(mut extracted) => {
                        stats.files_processed += 1;
                        chunks.append(&mut extracted);
                    }
                    Err(e) => {
                        stats.files_failed += 1;
                        tracing::warn!("Failed to chunk {rel_path}: {e}");
                    }
                },
                Err(e) => {
                    stats.files_failed += 1;
                    tracing::warn!("Failed to read {rel_path}: {e}");
                }
            }
        }

        stats.chunks_created = store.insert_batch(&chunks)?;
        self.build_indices(&store, paths, options.progress.as_deref())?;

        stats.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Full index complete: {} files, {} chunks, {}ms",
            stats.files_processed,
            stats.chunks_created,
            stats.duration_ms
        );
        Ok(stats)
    }

    /// Reindex only the files version control reports as changed since the
    /// last checkpoint, then rewrite both indices so retrieval never runs
    /// against stale state. Falls back to a full rebuild when change
    /// detection is unavailable.
    pub fn update_index(
        &self,
        repo_path: &Path,
        paths: &IndexPaths,
        options: &IndexOptions,
    ) -> Result<IndexStats> {
        let changed = match git_changed_paths(repo_path) {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!("Change detection unavailable ({e}); falling back to full index");
                return self.full_index(repo_path, paths, options);
            }
        };

        let start = Instant::now();
        let mut stats = IndexStats::default();
        stats.files_discovered = changed.len();

        let store = ChunkStore::open(&paths.db)?;

        let mut chunks: Vec<Chunk> = Vec::new();
        for rel_path in &changed {
            if let Some(scope) = &options.scope {
                let scope = scope.to_string_lossy().replace('\\', "/");
                let scope = scope.trim_end_matches('/');
                if rel_path.as_str() != scope && !rel_path.starts_with(&format!("{scope}/")) {
                    continue;
                }
            }

            let abs = repo_path.join(rel_path);
            let Some(registration) = self.registry.for_path(&abs) else {
                continue;
            };

            if !abs.exists() {
                // File removed since the checkpoint: drop its chunks.
                store.delete_by_file(rel_path)?;
                stats.files_processed += 1;
                continue;
            }

            let content = match std::fs::read_to_string(&abs) {
                Ok(content) => content,
                Err(e) => {
                    stats.files_failed += 1;
                    tracing::warn!("Failed to read {rel_path}: {e}");
                    continue;
                }
            };

            let file_hash = content_digest(content.as_bytes());
            let existing = store.list_by_file(rel_path)?;
            let needs_reindex = existing.is_empty()
                || existing.iter().any(|c| c.content_hash != file_hash);
            if !needs_reindex {
                continue;
            }

            match chunk_source(rel_path, &content, &registration) {
                Ok(mut extracted) => {
                    store.delete_by_file(rel_path)?;
                    stats.files_processed += 1;
                    chunks.append(&mut extracted);
                }
                Err(e) => {
                    stats.files_failed += 1;
                    tracing::warn!("Failed to chunk {rel_path}: {e}");
                }
            }
        }

        stats.chunks_created = store.insert_batch(&chunks)?;
        self.build_indices(&store, paths, options.progress.as_deref())?;

        stats.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Incremental update complete: {} changed files, {} chunks, {}ms",
            stats.files_processed,
            stats.chunks_created,
            stats.duration_ms
        );
        Ok(stats)
    }

    /// Rewrite the lexical and vector indices from the store's current rows.
    /// An embedding failure aborts the build; a zero vector is never an
    /// acceptable substitute.
    fn build_indices(
        &self,
        store: &ChunkStore,
        paths: &IndexPaths,
        progress: Option<&ProgressFn>,
    ) -> Result<()> {
        let records = store.list_all()?;

        let mut lexical = LexicalIndex::create(&paths.lexical)?;
        lexical.build(&records)?;

        let vector = VectorIndex::new(self.vector_params.clone())?;
        vector.reserve(records.len())?;

        let items: Vec<BatchItem> = records
            .iter()
            .map(|record| BatchItem {
                id: record.id as u64,
                text: record.content.clone(),
            })
            .collect();
        let batcher = BatchEmbedder::new(Arc::clone(&self.embedder), EMBED_BATCH_SIZE);
        batcher.run(&items, |id, embedding| vector.add(id, &embedding), progress)?;

        vector.save(&paths.vector)?;
        Ok(())
    }
}

fn relative_path(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Paths changed since the last version-control checkpoint: modifications
/// against HEAD plus untracked files, repository-relative.
fn git_changed_paths(repo_path: &Path) -> Result<Vec<String>> {
    let run = |args: &[&str]| -> Result<Vec<String>> {
        let output = Command::new("git")
            .arg("-C")
            .arg(repo_path)
            .args(args)
            .output()
            .map_err(|e| OracleError::io(e, "Failed to run git"))?;

        if !output.status.success() {
            return Err(OracleError::NotFound(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    };

    let mut changed = run(&["diff", "--name-only", "HEAD"])?;
    changed.extend(run(&["ls-files", "--others", "--exclude-standard"])?);
    changed.sort();
    changed.dedup();
    Ok(changed)
}
