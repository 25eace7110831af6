//! Tantivy BM25 index over the lexical projection of chunks

use crate::error::{OracleError, Result};
use crate::store::ChunkRecord;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// One BM25 search hit.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    /// Document key, `"<file_path>:<start_line>"`.
    pub id_str: String,
    pub file_path: String,
    pub symbol_name: String,
    pub start_line: usize,
    pub end_line: usize,
    /// BM25 relevance, descending across a result list.
    pub score: f32,
}

#[derive(Debug)]
struct Fields {
    id_str: Field,
    file_path: Field,
    symbol_name: Field,
    content: Field,
    start_line: Field,
    end_line: Field,
}

/// BM25 term index over chunk text and identifier fields.
///
/// The document key is the string `"<file_path>:<start_line>"`; the fusion
/// stage keeps these locators distinct from numeric vector ids and the
/// retriever resolves them back to chunk rows after fusion.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    /// Present only on handles opened for building; query-time handles are
    /// read-only and never take the directory's writer lock.
    writer: Option<IndexWriter>,
    fields: Fields,
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("fields", &self.fields)
            .field("writer", &self.writer.is_some())
            .finish_non_exhaustive()
    }
}

impl LexicalIndex {
    /// Create a fresh index at `path`, replacing whatever was there.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            std::fs::remove_dir_all(path).map_err(|e| {
                OracleError::io(e, format!("Failed to clear lexical index at {path:?}"))
            })?;
        }
        std::fs::create_dir_all(path).map_err(|e| {
            OracleError::io(e, format!("Failed to create lexical index dir {path:?}"))
        })?;

        let mut schema_builder = Schema::builder();
        let id_str = schema_builder.add_text_field("id_str", STRING | STORED);
        let file_path = schema_builder.add_text_field("file_path", STRING | STORED);
        let symbol_name = schema_builder.add_text_field("symbol_name", TEXT | STORED);
        let content = schema_builder.add_text_field("content", TEXT | STORED);
        let start_line = schema_builder.add_u64_field("start_line", STORED);
        let end_line = schema_builder.add_u64_field("end_line", STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_dir(path, schema)?;
        Self::assemble(index, true)
    }

    /// Open the persisted index. `NotFound` when nothing was saved at `path`,
    /// `Corrupt` when the on-disk state cannot be opened; both are answered
    /// by the orchestrator with a rebuild.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.join("meta.json").exists() {
            return Err(OracleError::NotFound(format!(
                "lexical index at {}",
                path.display()
            )));
        }

        let index = Index::open_in_dir(path)
            .map_err(|e| OracleError::Corrupt(format!("lexical index: {e}")))?;
        Self::assemble(index, false)
    }

    fn assemble(index: Index, writable: bool) -> Result<Self> {
        let schema = index.schema();
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| OracleError::Corrupt(format!("lexical index missing field {name}")))
        };
        let fields = Fields {
            id_str: field("id_str")?,
            file_path: field("file_path")?,
            symbol_name: field("symbol_name")?,
            content: field("content")?,
            start_line: field("start_line")?,
            end_line: field("end_line")?,
        };

        let writer = if writable {
            Some(index.writer(WRITER_HEAP_BYTES)?)
        } else {
            None
        };
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer,
            fields,
        })
    }

    fn writer(&mut self) -> Result<&mut IndexWriter> {
        self.writer.as_mut().ok_or_else(|| {
            OracleError::InternalInvariant("lexical index handle is read-only".to_string())
        })
    }

    /// The locator key for a chunk row.
    pub fn doc_key(record: &ChunkRecord) -> String {
        format!("{}:{}", record.file_path, record.start_line)
    }

    /// Index every chunk and commit. O(n) in document count.
    pub fn build(&mut self, records: &[ChunkRecord]) -> Result<()> {
        for record in records {
            let doc = doc!(
                self.fields.id_str => Self::doc_key(record),
                self.fields.file_path => record.file_path.clone(),
                self.fields.symbol_name => record.symbol_name.clone().unwrap_or_default(),
                self.fields.content => record.content.clone(),
                self.fields.start_line => record.start_line as u64,
                self.fields.end_line => record.end_line as u64,
            );
            self.writer()?.add_document(doc)?;
        }
        self.commit()
    }

    /// Commit pending writes and refresh the reader.
    pub fn commit(&mut self) -> Result<()> {
        self.writer()?.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// BM25 search over content and symbol names, score descending.
    /// Whitespace-only queries and `limit == 0` yield nothing.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.content, self.fields.symbol_name],
        );
        // Lenient parse: a question is free text, not query syntax.
        let (parsed, _errors) = parser.parse_query_lenient(query);

        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(addr)?;
            let text = |field: Field| {
                retrieved
                    .get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let line = |field: Field| {
                retrieved
                    .get_first(field)
                    .and_then(|v| v.as_u64())
                    .unwrap_or_default() as usize
            };

            hits.push(LexicalHit {
                id_str: text(self.fields.id_str),
                file_path: text(self.fields.file_path),
                symbol_name: text(self.fields.symbol_name),
                start_line: line(self.fields.start_line),
                end_line: line(self.fields.end_line),
                score,
            });
        }

        Ok(hits)
    }

    /// Number of indexed documents.
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::SymbolType;
    use crate::hash::content_digest;
    use tempfile::TempDir;

    fn record(id: i64, file_path: &str, name: &str, start_line: usize, content: &str) -> ChunkRecord {
        ChunkRecord {
            id,
            file_path: file_path.to_string(),
            symbol_name: Some(name.to_string()),
            symbol_type: SymbolType::Function,
            content_hash: content_digest(content.as_bytes()),
            content: content.to_string(),
            start_line,
            end_line: start_line + 2,
            language: "python".to_string(),
            indexed_at: 0,
        }
    }

    #[test]
    fn build_and_search() {
        let temp = TempDir::new().unwrap();
        let mut index = LexicalIndex::create(&temp.path().join("bm25")).unwrap();

        index
            .build(&[
                record(1, "auth.py", "authenticate", 1, "def authenticate(user):\n    check(user)"),
                record(2, "db.py", "connect", 1, "def connect(dsn):\n    open(dsn)"),
            ])
            .unwrap();

        let hits = index.search("authenticate", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id_str, "auth.py:1");
        assert_eq!(hits[0].file_path, "auth.py");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn doc_key_is_path_and_start_line() {
        let r = record(1, "src/a.py", "foo", 12, "def foo(): pass");
        assert_eq!(LexicalIndex::doc_key(&r), "src/a.py:12");
    }

    #[test]
    fn whitespace_query_yields_empty() {
        let temp = TempDir::new().unwrap();
        let mut index = LexicalIndex::create(&temp.path().join("bm25")).unwrap();
        index
            .build(&[record(1, "a.py", "foo", 1, "def foo(): pass")])
            .unwrap();

        assert!(index.search("", 10).unwrap().is_empty());
        assert!(index.search("   \t\n", 10).unwrap().is_empty());
    }

    #[test]
    fn zero_limit_yields_empty() {
        let temp = TempDir::new().unwrap();
        let mut index = LexicalIndex::create(&temp.path().join("bm25")).unwrap();
        index
            .build(&[record(1, "a.py", "foo", 1, "def foo(): pass")])
            .unwrap();

        assert!(index.search("foo", 0).unwrap().is_empty());
    }

    #[test]
    fn results_sorted_by_score_descending() {
        let temp = TempDir::new().unwrap();
        let mut index = LexicalIndex::create(&temp.path().join("bm25")).unwrap();

        index
            .build(&[
                record(1, "a.py", "parse", 1, "def parse(data):\n    parse_inner(data)\n    # parse parse parse"),
                record(2, "b.py", "helper", 1, "def helper():\n    parse()"),
            ])
            .unwrap();

        let hits = index.search("parse", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].id_str, "a.py:1");
    }

    #[test]
    fn save_load_roundtrip_preserves_topk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bm25");

        let in_memory_hits = {
            let mut index = LexicalIndex::create(&path).unwrap();
            index
                .build(&[
                    record(1, "a.py", "alpha", 1, "def alpha(): beta()"),
                    record(2, "b.py", "beta", 1, "def beta(): alpha()"),
                ])
                .unwrap();
            index.search("alpha", 10).unwrap()
        };

        let reopened = LexicalIndex::open(&path).unwrap();
        let reloaded_hits = reopened.search("alpha", 10).unwrap();

        assert_eq!(in_memory_hits.len(), reloaded_hits.len());
        for (a, b) in in_memory_hits.iter().zip(&reloaded_hits) {
            assert_eq!(a.id_str, b.id_str);
            assert!((a.score - b.score).abs() < 1e-6);
        }
    }

    #[test]
    fn open_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = LexicalIndex::open(&temp.path().join("absent")).unwrap_err();
        assert!(err.is_rebuildable());
        assert!(matches!(err, OracleError::NotFound(_)));
    }

    #[test]
    fn open_garbage_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bm25");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("meta.json"), b"not json").unwrap();

        let err = LexicalIndex::open(&path).unwrap_err();
        assert!(err.is_rebuildable());
        assert!(matches!(err, OracleError::Corrupt(_)));
    }

    #[test]
    fn empty_build_reloads_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bm25");
        {
            let mut index = LexicalIndex::create(&path).unwrap();
            index.build(&[]).unwrap();
        }
        let reopened = LexicalIndex::open(&path).unwrap();
        assert!(reopened.is_empty());
        assert!(reopened.search("anything", 10).unwrap().is_empty());
    }

    #[test]
    fn absent_symbol_name_indexed_as_empty_string() {
        let temp = TempDir::new().unwrap();
        let mut index = LexicalIndex::create(&temp.path().join("bm25")).unwrap();

        let mut r = record(1, "a.py", "unused", 1, "x = compute()");
        r.symbol_name = None;
        index.build(&[r]).unwrap();

        let hits = index.search("compute", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol_name, "");
    }
}
