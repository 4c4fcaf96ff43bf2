//! `fts` — SQLite FTS5 evidence index.
//!
//! Passages are stored in an FTS5 virtual table and ranked with SQLite's
//! built-in `bm25()`. A side table of SHA-256 content hashes makes every
//! insert idempotent, so re-importing a corpus is a no-op.
//!
//! ## Storage layout
//! ```text
//! {index_dir}/
//! └── evidence.db      # SQLite — passage_hashes + passages (fts5)
//! ```
//!
//! All methods are blocking; async callers go through
//! [`Retriever::retrieve`](super::Retriever::retrieve), which runs them under
//! `spawn_blocking`.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use text_splitter::MarkdownSplitter;
use tracing::{debug, info, warn};

use super::RetrievalError;

/// SQLite database file name inside the index directory.
pub const DB_FILENAME: &str = "evidence.db";

/// Schema version stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Default approximate characters per imported passage.
pub const DEFAULT_CHUNK_SIZE: usize = 1200;

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub title: String,
    pub text: String,
    /// Negated BM25 rank: higher is more relevant.
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct EvidenceStore {
    dir: PathBuf,
    db_path: PathBuf,
}

impl EvidenceStore {
    /// Open (or create) the index under `index_dir`. Safe to call repeatedly.
    pub fn open(index_dir: &Path) -> Result<Self, RetrievalError> {
        fs::create_dir_all(index_dir).map_err(|e| {
            RetrievalError::Index(format!("cannot create {}: {e}", index_dir.display()))
        })?;
        let store = Self { dir: index_dir.to_path_buf(), db_path: index_dir.join(DB_FILENAME) };
        store.init_db()?;
        Ok(store)
    }

    pub fn root_dir(&self) -> &Path {
        &self.dir
    }

    /// Insert one passage. Returns `false` when identical text is already
    /// indexed or the text is blank.
    pub fn add_passage(&self, title: &str, text: &str) -> Result<bool, RetrievalError> {
        let added = self.add_passages([(title, text)])?;
        Ok(added == 1)
    }

    /// Insert many passages in one transaction; returns how many were new.
    pub fn add_passages<'a, I>(&self, passages: I) -> Result<usize, RetrievalError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut conn = self.open_conn()?;
        let tx = conn.transaction().map_err(|e| index_err("begin tx", e))?;
        let mut added = 0;
        for (title, text) in passages {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let hash = sha256_hex(text);
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO passage_hashes (content_hash) VALUES (?1)",
                    params![hash],
                )
                .map_err(|e| index_err("insert hash", e))?;
            if inserted == 0 {
                continue;
            }
            tx.execute(
                "INSERT INTO passages (title, text, content_hash) VALUES (?1, ?2, ?3)",
                params![title, text, hash],
            )
            .map_err(|e| index_err("insert passage", e))?;
            added += 1;
        }
        tx.commit().map_err(|e| index_err("commit", e))?;
        debug!(added, "evidence passages indexed");
        Ok(added)
    }

    /// Index every `.txt` / `.md` file directly under `dir`, split into
    /// Markdown-aware chunks of roughly `chunk_size` characters. The file
    /// stem becomes the passage title. Returns the number of new passages.
    pub fn import_dir(&self, dir: &Path, chunk_size: usize) -> Result<usize, RetrievalError> {
        if chunk_size == 0 {
            return Err(RetrievalError::Index("chunk_size must be > 0".into()));
        }
        let entries = fs::read_dir(dir)
            .map_err(|e| RetrievalError::Index(format!("cannot read {}: {e}", dir.display())))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| {
                p.is_file()
                    && p.extension().and_then(|e| e.to_str()).is_some_and(|e| e == "txt" || e == "md")
            })
            .collect();
        paths.sort();

        let splitter = MarkdownSplitter::new(chunk_size);
        let mut total = 0;
        for path in paths {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable corpus file");
                    continue;
                }
            };
            let title = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
            let chunks: Vec<&str> = splitter.chunks(&content).collect();
            total += self.add_passages(chunks.into_iter().map(|chunk| (title.as_str(), chunk)))?;
        }
        info!(dir = %dir.display(), added = total, "corpus imported");
        Ok(total)
    }

    /// BM25-ranked search. Query terms are OR-ed, so long natural-language
    /// queries still match partially. Returns an empty list (not an error) on
    /// blank queries and FTS5 syntax errors.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, RetrievalError> {
        let match_expr = escape_fts5_query(query);
        if match_expr.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT title, text, bm25(passages) AS rank
                 FROM passages
                 WHERE passages MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(|e| index_err("prepare search", e))?;

        let hits: Result<Vec<Passage>, rusqlite::Error> = stmt
            .query_map(params![match_expr, top_k as i64], |row| {
                Ok(Passage { title: row.get(0)?, text: row.get(1)?, score: -row.get::<_, f64>(2)? })
            })
            .and_then(|rows| rows.collect());
        match hits {
            Ok(hits) => Ok(hits),
            Err(e) if e.to_string().contains("fts5: syntax error") => {
                warn!(error = %e, "fts5 syntax error, returning empty results");
                Ok(Vec::new())
            }
            Err(e) => Err(index_err("execute search", e)),
        }
    }

    /// Number of indexed passages.
    pub fn len(&self) -> Result<usize, RetrievalError> {
        let conn = self.open_conn()?;
        conn.query_row("SELECT COUNT(*) FROM passage_hashes", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(|e| index_err("count", e))
    }

    pub fn is_empty(&self) -> Result<bool, RetrievalError> {
        self.len().map(|n| n == 0)
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn init_db(&self) -> Result<(), RetrievalError> {
        let conn = self.open_conn()?;
        let version: Option<i64> = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .optional()
            .map_err(|e| index_err("read user_version", e))?;
        match version.unwrap_or(0) {
            0 => init_schema(&conn),
            SCHEMA_VERSION => Ok(()),
            other => Err(RetrievalError::Index(format!(
                "unsupported schema version {other} in {}",
                self.db_path.display()
            ))),
        }
    }

    /// WAL lets many concurrent searches proceed alongside an import.
    fn open_conn(&self) -> Result<Connection, RetrievalError> {
        let conn = Connection::open(&self.db_path).map_err(|e| {
            RetrievalError::Index(format!("open {}: {e}", self.db_path.display()))
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| index_err("set journal_mode WAL", e))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| index_err("set busy_timeout", e))?;
        Ok(conn)
    }
}

fn init_schema(conn: &Connection) -> Result<(), RetrievalError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS passage_hashes (
            content_hash TEXT PRIMARY KEY
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS passages USING fts5(
            title UNINDEXED,
            text,
            content_hash UNINDEXED
        );

        PRAGMA user_version = 1;
        ",
    )
    .map_err(|e| index_err("initialize schema", e))
}

fn index_err(what: &str, e: rusqlite::Error) -> RetrievalError {
    RetrievalError::Index(format!("{what}: {e}"))
}

/// Lowercase hex SHA-256 of `content`, the dedup key for passages.
fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Turn free text into an FTS5 `MATCH` expression.
///
/// FTS5 has its own query language (`"`, `(`, `AND`, `NEAR`…), so every
/// whitespace token is wrapped in double quotes with inner quotes doubled,
/// and tokens are OR-ed. Tokens without any alphanumeric character are
/// dropped.
pub fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|tok| tok.chars().any(char::is_alphanumeric))
        .map(|tok| format!("\"{}\"", tok.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, EvidenceStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = EvidenceStore::open(&temp.path().join("index")).expect("open evidence store");
        (temp, store)
    }

    #[test]
    fn open_creates_db() {
        let (_temp, store) = make_store();
        assert!(store.root_dir().join(DB_FILENAME).exists());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn reopen_keeps_schema() {
        let (_temp, store) = make_store();
        store.add_passage("t", "hello world").unwrap();
        let again = EvidenceStore::open(store.root_dir()).unwrap();
        assert_eq!(again.len().unwrap(), 1);
    }

    #[test]
    fn dedup_by_hash() {
        let (_temp, store) = make_store();
        assert!(store.add_passage("a", "The Geragos scandal was a 1990s legal dispute.").unwrap());
        assert!(!store.add_passage("b", "  The Geragos scandal was a 1990s legal dispute. ").unwrap());
        assert!(!store.add_passage("c", "   ").unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn search_ranks_relevant_first() {
        let (_temp, store) = make_store();
        store
            .add_passages([
                ("geragos", "The Geragos scandal was a 1990s legal dispute."),
                ("teletoon", "Teletoon is a Canadian television channel."),
            ])
            .unwrap();
        let hits = store.search("scandal that took place in the 1990s", 5).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].title, "geragos");
    }

    #[test]
    fn search_handles_fts_syntax_characters() {
        let (_temp, store) = make_store();
        store.add_passage("t", "Nick Jr. Too launched on 24 April 2006").unwrap();
        let hits = store.search("\"Nick Jr.\" AND (Too) NEAR launched?", 3).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.search("", 3).unwrap().is_empty());
        assert!(store.search("?? --", 3).unwrap().is_empty());
    }

    #[test]
    fn escape_quotes_and_ors() {
        assert_eq!(escape_fts5_query("a \"b\" c?"), "\"a\" OR \"\"\"b\"\"\" OR \"c?\"");
        assert_eq!(escape_fts5_query("  "), "");
    }

    #[test]
    fn import_dir_reads_text_files() {
        let (temp, store) = make_store();
        let corpus = temp.path().join("corpus");
        fs::create_dir_all(&corpus).unwrap();
        fs::write(corpus.join("tall_birds.md"), "# Tall Birds\n\nTall Birds formed in Issaquah.").unwrap();
        fs::write(corpus.join("notes.txt"), "Issaquah is in Washington.").unwrap();
        fs::write(corpus.join("image.png"), "not text").unwrap();
        let added = store.import_dir(&corpus, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(added, 2);
        assert_eq!(store.import_dir(&corpus, DEFAULT_CHUNK_SIZE).unwrap(), 0);
        assert!(store.import_dir(&corpus, 0).is_err());
    }
}
