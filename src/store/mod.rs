//! Durable chunk storage with migrations
//!
//! Single-writer SQLite store in WAL mode; readers see consistent
//! snapshots while a build is writing.

use crate::chunking::{Chunk, SymbolType};
use crate::error::{OracleError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::path::Path;

/// Batches at or above this row count get a WAL truncate afterwards.
const WAL_TRUNCATE_THRESHOLD: usize = 500;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// One persisted chunk row. Field meanings match [`Chunk`]; `id` and
/// `indexed_at` are assigned on insert.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub symbol_type: SymbolType,
    pub content: String,
    pub content_hash: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub indexed_at: i64,
}

/// An ordered schema migration.
struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial chunk schema",
    sql: r#"
    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL,
        symbol_name TEXT,
        symbol_type TEXT NOT NULL,
        content TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        language TEXT NOT NULL,
        indexed_at INTEGER NOT NULL
    );

    CREATE INDEX idx_chunks_file_path ON chunks(file_path);
    CREATE INDEX idx_chunks_content_hash ON chunks(content_hash);
    CREATE INDEX idx_chunks_symbol_name ON chunks(symbol_name);
    CREATE INDEX idx_chunks_language ON chunks(language);
    "#,
}];

/// Transactional row store owning chunk rows and their ids.
pub struct ChunkStore {
    pool: DbPool,
}

impl ChunkStore {
    /// Open (or create) the store at `db_path` and apply pending migrations.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OracleError::io(e, format!("Failed to create store directory {parent:?}"))
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| OracleError::Config(format!("Failed to create connection pool: {e}")))?;

        {
            let conn = pool
                .get()
                .map_err(|e| OracleError::Config(format!("Failed to get connection: {e}")))?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| OracleError::Config(format!("Failed to get connection: {e}")))
    }

    /// Apply migrations above the recorded user version, each atomically with
    /// its bookkeeping row. A failing migration aborts, leaving the store at
    /// the last fully-applied version.
    fn migrate(&self) -> Result<()> {
        let mut conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current = self.user_version()?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.description
            );
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
                params![migration.version],
            )?;
            tx.pragma_update(None, "user_version", migration.version)?;
            tx.commit()?;
        }

        Ok(())
    }

    /// The store's numeric schema version.
    pub fn user_version(&self) -> Result<i64> {
        let conn = self.conn()?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Insert all chunks in one atomic transaction and return how many rows
    /// were written. Ids are assigned in iteration order.
    pub fn insert_batch(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let indexed_at = chrono::Utc::now().timestamp();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks
                    (file_path, symbol_name, symbol_type, content, content_hash,
                     start_line, end_line, language, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.file_path,
                    chunk.symbol_name,
                    chunk.symbol_type.as_str(),
                    chunk.content,
                    chunk.content_hash,
                    chunk.start_line as i64,
                    chunk.end_line as i64,
                    chunk.language,
                    indexed_at,
                ])?;
            }
        }
        tx.commit()?;

        if chunks.len() >= WAL_TRUNCATE_THRESHOLD {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
        }

        Ok(chunks.len())
    }

    /// Remove every chunk row.
    pub fn delete_all(&self) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM chunks", [])?;
        Ok(removed)
    }

    /// Remove all chunks for one file path.
    pub fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM chunks WHERE file_path = ?1",
            params![file_path],
        )?;
        Ok(removed)
    }

    /// All chunks for one file, ordered by start line.
    pub fn list_by_file(&self, file_path: &str) -> Result<Vec<ChunkRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_path, symbol_name, symbol_type, content, content_hash,
                    start_line, end_line, language, indexed_at
             FROM chunks WHERE file_path = ?1 ORDER BY start_line",
        )?;
        let rows = stmt.query_map(params![file_path], record_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// At most one chunk with the given content hash.
    pub fn get_by_hash(&self, content_hash: &str) -> Result<Option<ChunkRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_path, symbol_name, symbol_type, content, content_hash,
                    start_line, end_line, language, indexed_at
             FROM chunks WHERE content_hash = ?1 LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![content_hash], record_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Resolve a lexical locator to its chunk row.
    pub fn get_by_location(&self, file_path: &str, start_line: usize) -> Result<Option<ChunkRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_path, symbol_name, symbol_type, content, content_hash,
                    start_line, end_line, language, indexed_at
             FROM chunks WHERE file_path = ?1 AND start_line = ?2 LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![file_path, start_line as i64], record_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Distinct file paths, ascending.
    pub fn list_file_paths(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT file_path FROM chunks ORDER BY file_path")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Full scan in id order; used to rebuild the lexical and vector indices.
    pub fn list_all(&self) -> Result<Vec<ChunkRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_path, symbol_name, symbol_type, content, content_hash,
                    start_line, end_line, language, indexed_at
             FROM chunks ORDER BY id",
        )?;
        let rows = stmt.query_map([], record_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Batched lookup for result hydration. Returned order is unspecified.
    pub fn get_many(&self, ids: &[i64]) -> Result<Vec<ChunkRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, file_path, symbol_name, symbol_type, content, content_hash,
                    start_line, end_line, language, indexed_at
             FROM chunks WHERE id IN ({placeholders})"
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), record_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Number of chunk rows.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    let symbol_type: String = row.get(3)?;
    Ok(ChunkRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        symbol_name: row.get(2)?,
        symbol_type: SymbolType::from_str(&symbol_type),
        content: row.get(4)?,
        content_hash: row.get(5)?,
        start_line: row.get::<_, i64>(6)? as usize,
        end_line: row.get::<_, i64>(7)? as usize,
        language: row.get(8)?,
        indexed_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::content_digest;
    use tempfile::TempDir;

    fn chunk(file_path: &str, name: &str, start_line: usize) -> Chunk {
        let content = format!("def {name}():\n    pass");
        Chunk {
            file_path: file_path.to_string(),
            symbol_name: Some(name.to_string()),
            symbol_type: SymbolType::Function,
            content_hash: content_digest(content.as_bytes()),
            content,
            start_line,
            end_line: start_line + 1,
            language: "python".to_string(),
        }
    }

    fn open_store(temp: &TempDir) -> ChunkStore {
        ChunkStore::open(&temp.path().join("index.db")).unwrap()
    }

    #[test]
    fn open_applies_migrations() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        assert_eq!(store.user_version().unwrap(), 1);
    }

    #[test]
    fn reopen_is_idempotent() {
        let temp = TempDir::new().unwrap();
        {
            let store = open_store(&temp);
            store.insert_batch(&[chunk("a.py", "foo", 1)]).unwrap();
        }
        let store = open_store(&temp);
        assert_eq!(store.user_version().unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn ids_are_monotonic_in_insertion_order() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store
            .insert_batch(&[
                chunk("a.py", "one", 1),
                chunk("a.py", "two", 10),
                chunk("b.py", "three", 1),
            ])
            .unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(all[0].symbol_name.as_deref(), Some("one"));
        assert_eq!(all[2].symbol_name.as_deref(), Some("three"));
    }

    #[test]
    fn insert_batch_roundtrips_fields() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let input = chunk("src/a.py", "foo", 3);
        store.insert_batch(std::slice::from_ref(&input)).unwrap();

        let rows = store.list_all().unwrap();
        let row = &rows[0];
        assert_eq!(row.file_path, input.file_path);
        assert_eq!(row.symbol_name, input.symbol_name);
        assert_eq!(row.symbol_type, input.symbol_type);
        assert_eq!(row.content, input.content);
        assert_eq!(row.content_hash, input.content_hash);
        assert_eq!(row.start_line, input.start_line);
        assert_eq!(row.end_line, input.end_line);
        assert_eq!(row.language, input.language);
        assert!(row.indexed_at > 0);
    }

    #[test]
    fn delete_by_file_removes_only_that_file() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store
            .insert_batch(&[chunk("a.py", "one", 1), chunk("b.py", "two", 1)])
            .unwrap();

        assert_eq!(store.delete_by_file("a.py").unwrap(), 1);
        let paths = store.list_file_paths().unwrap();
        assert_eq!(paths, vec!["b.py"]);
    }

    #[test]
    fn delete_all_clears_table() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store
            .insert_batch(&[chunk("a.py", "one", 1), chunk("b.py", "two", 1)])
            .unwrap();
        assert_eq!(store.delete_all().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn get_by_hash_returns_at_most_one() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let c = chunk("a.py", "foo", 1);
        store.insert_batch(&[c.clone(), chunk("b.py", "bar", 1)]).unwrap();

        let found = store.get_by_hash(&c.content_hash).unwrap().unwrap();
        assert_eq!(found.content_hash, c.content_hash);
        assert!(store.get_by_hash("no-such-hash").unwrap().is_none());
    }

    #[test]
    fn get_by_location_resolves_lexical_ids() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store.insert_batch(&[chunk("a.py", "foo", 7)]).unwrap();

        let found = store.get_by_location("a.py", 7).unwrap().unwrap();
        assert_eq!(found.symbol_name.as_deref(), Some("foo"));
        assert!(store.get_by_location("a.py", 8).unwrap().is_none());
    }

    #[test]
    fn get_many_fetches_requested_rows() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store
            .insert_batch(&[
                chunk("a.py", "one", 1),
                chunk("a.py", "two", 10),
                chunk("a.py", "three", 20),
            ])
            .unwrap();

        let all = store.list_all().unwrap();
        let wanted = vec![all[0].id, all[2].id];
        let fetched = store.get_many(&wanted).unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().all(|r| wanted.contains(&r.id)));

        assert!(store.get_many(&[]).unwrap().is_empty());
        assert!(store.get_many(&[99999]).unwrap().is_empty());
    }

    #[test]
    fn list_by_file_orders_by_start_line() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store
            .insert_batch(&[chunk("a.py", "late", 30), chunk("a.py", "early", 2)])
            .unwrap();

        let rows = store.list_by_file("a.py").unwrap();
        assert_eq!(rows[0].symbol_name.as_deref(), Some("early"));
        assert_eq!(rows[1].symbol_name.as_deref(), Some("late"));
    }
}
