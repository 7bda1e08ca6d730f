use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use docshelf_core::error::{Error, Result};
use docshelf_core::types::{DocId, Document, IndexState, IndexStatus};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS docs(
  id               INTEGER PRIMARY KEY,
  path             TEXT NOT NULL UNIQUE,
  fingerprint      TEXT NOT NULL,
  snippet          TEXT NOT NULL DEFAULT '',
  tags             TEXT NOT NULL DEFAULT '[]',
  caption          TEXT,
  has_embedding    INTEGER NOT NULL DEFAULT 0,
  state            TEXT NOT NULL,
  embedding_failed INTEGER NOT NULL DEFAULT 0,
  retries          INTEGER NOT NULL DEFAULT 0,
  last_indexed     TEXT
);
CREATE INDEX IF NOT EXISTS idx_docs_fingerprint ON docs(fingerprint);
";

const PAGE_SIZE: usize = 64;

/// Durable document table. Single writer-of-record for the library; the
/// indices are reconciled against it, never the other way around.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    /// Open (or create) the store at `path`. WAL with `synchronous=FULL`
    /// so every write is on disk before the call returns.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(Error::storage)?;
        Self::init(conn, Some(path))
    }

    /// In-memory store, used by tests and ephemeral tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::storage)?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<&Path>) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").map_err(Error::storage)?;
        conn.pragma_update(None, "synchronous", "FULL").map_err(Error::storage)?;
        conn.execute_batch(SCHEMA).map_err(Error::storage)?;
        if let Some(p) = path {
            debug!(path = %p.display(), "opened metadata store");
        }
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::Storage("metadata store lock poisoned".into()))
    }

    pub fn upsert(&self, doc: &Document) -> Result<()> {
        let conn = self.lock()?;
        let tags = serde_json::to_string(&doc.tags).map_err(Error::storage)?;
        conn.execute(
            "INSERT INTO docs(id, path, fingerprint, snippet, tags, caption,
                              has_embedding, state, embedding_failed, retries, last_indexed)
             VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
             ON CONFLICT(id) DO UPDATE SET
               path=excluded.path, fingerprint=excluded.fingerprint,
               snippet=excluded.snippet, tags=excluded.tags, caption=excluded.caption,
               has_embedding=excluded.has_embedding, state=excluded.state,
               embedding_failed=excluded.embedding_failed, retries=excluded.retries,
               last_indexed=excluded.last_indexed",
            params![
                doc.id.as_u64() as i64,
                doc.path.to_string_lossy().into_owned(),
                doc.fingerprint,
                doc.snippet,
                tags,
                doc.caption,
                doc.has_embedding,
                doc.state.as_str(),
                doc.embedding_failed,
                doc.retries,
                doc.last_indexed.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(Error::storage)?;
        Ok(())
    }

    pub fn get(&self, id: DocId) -> Result<Option<Document>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, path, fingerprint, snippet, tags, caption, has_embedding,
                    state, embedding_failed, retries, last_indexed
             FROM docs WHERE id=?1",
            params![id.as_u64() as i64],
            row_to_document,
        )
        .optional()
        .map_err(Error::storage)
    }

    pub fn delete(&self, id: DocId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM docs WHERE id=?1", params![id.as_u64() as i64])
            .map_err(Error::storage)?;
        Ok(())
    }

    pub fn find_by_path(&self, path: &Path) -> Result<Option<Document>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, path, fingerprint, snippet, tags, caption, has_embedding,
                    state, embedding_failed, retries, last_indexed
             FROM docs WHERE path=?1",
            params![path.to_string_lossy().into_owned()],
            row_to_document,
        )
        .optional()
        .map_err(Error::storage)
    }

    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Document>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, path, fingerprint, snippet, tags, caption, has_embedding,
                    state, embedding_failed, retries, last_indexed
             FROM docs WHERE fingerprint=?1 ORDER BY id LIMIT 1",
            params![fingerprint],
            row_to_document,
        )
        .optional()
        .map_err(Error::storage)
    }

    pub fn set_state(&self, id: DocId, state: IndexState) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE docs SET state=?2 WHERE id=?1",
            params![id.as_u64() as i64, state.as_str()],
        )
        .map_err(Error::storage)?;
        Ok(())
    }

    /// Path-only update used on rename; nothing else about the document
    /// changes.
    pub fn set_path(&self, id: DocId, path: &Path) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE docs SET path=?2 WHERE id=?1",
            params![id.as_u64() as i64, path.to_string_lossy().into_owned()],
        )
        .map_err(Error::storage)?;
        Ok(())
    }

    pub fn mark_embedding_failed(&self, id: DocId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE docs SET embedding_failed=1, has_embedding=0 WHERE id=?1",
            params![id.as_u64() as i64],
        )
        .map_err(Error::storage)?;
        Ok(())
    }

    /// Increment the retry counter and return the new value.
    pub fn bump_retry(&self, id: DocId) -> Result<u32> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE docs SET retries=retries+1 WHERE id=?1",
            params![id.as_u64() as i64],
        )
        .map_err(Error::storage)?;
        conn.query_row(
            "SELECT retries FROM docs WHERE id=?1",
            params![id.as_u64() as i64],
            |row| row.get::<_, u32>(0),
        )
        .map_err(Error::storage)
    }

    /// Documents that were mid-flight at crash time and need re-scanning.
    pub fn pending_or_stale(&self) -> Result<Vec<Document>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, path, fingerprint, snippet, tags, caption, has_embedding,
                        state, embedding_failed, retries, last_indexed
                 FROM docs WHERE state IN ('pending','stale') ORDER BY id",
            )
            .map_err(Error::storage)?;
        let rows = stmt.query_map([], row_to_document).map_err(Error::storage)?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(row.map_err(Error::storage)?);
        }
        Ok(docs)
    }

    /// Documents whose stored path lies under `root`. Used by the polling
    /// scanner to detect deletions.
    pub fn paths_under(&self, root: &Path) -> Result<Vec<(DocId, PathBuf)>> {
        // LIKE wildcards in the root itself must match literally.
        let escaped = root
            .to_string_lossy()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let prefix = format!("{escaped}%");
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, path FROM docs WHERE path LIKE ?1 ESCAPE '\\' ORDER BY id")
            .map_err(Error::storage)?;
        let rows = stmt
            .query_map(params![prefix], |row| {
                let id: i64 = row.get(0)?;
                let path: String = row.get(1)?;
                Ok((DocId(id as u64), PathBuf::from(path)))
            })
            .map_err(Error::storage)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(Error::storage)?);
        }
        Ok(out)
    }

    /// Observable status for an id. Absent rows are indistinguishable from
    /// never-seen, so they report `Unseen`; rows mid-removal report `Gone`.
    pub fn status(&self, id: DocId) -> Result<IndexStatus> {
        Ok(match self.get(id)? {
            None => IndexStatus::Unseen,
            Some(doc) if doc.embedding_failed => IndexStatus::IndexFailed,
            Some(doc) => match doc.state {
                IndexState::Pending => IndexStatus::Pending,
                IndexState::Indexed => IndexStatus::Indexed,
                IndexState::Stale => IndexStatus::Stale,
                IndexState::Deleting => IndexStatus::Gone,
                IndexState::IndexFailed => IndexStatus::IndexFailed,
            },
        })
    }

    /// Paged snapshot iterator in id order. Pages are fetched lazily, so a
    /// concurrent mutation may or may not be reflected, but never breaks
    /// the iteration.
    pub fn iter_all(&self) -> DocumentIter<'_> {
        DocumentIter { store: self, last: None, buf: VecDeque::new(), done: false }
    }

    fn page_after(&self, last: Option<i64>) -> Result<Vec<(i64, Document)>> {
        let conn = self.lock()?;
        let sql = match last {
            Some(_) => {
                "SELECT id, path, fingerprint, snippet, tags, caption, has_embedding,
                        state, embedding_failed, retries, last_indexed
                 FROM docs WHERE id > ?1 ORDER BY id LIMIT ?2"
            }
            None => {
                "SELECT id, path, fingerprint, snippet, tags, caption, has_embedding,
                        state, embedding_failed, retries, last_indexed
                 FROM docs WHERE ?1 IS NULL ORDER BY id LIMIT ?2"
            }
        };
        let mut stmt = conn.prepare(sql).map_err(Error::storage)?;
        let rows = stmt
            .query_map(params![last, PAGE_SIZE as i64], |row| {
                let raw: i64 = row.get(0)?;
                Ok((raw, row_to_document(row)?))
            })
            .map_err(Error::storage)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(Error::storage)?);
        }
        Ok(out)
    }
}

pub struct DocumentIter<'a> {
    store: &'a MetadataStore,
    last: Option<i64>,
    buf: VecDeque<Document>,
    done: bool,
}

impl Iterator for DocumentIter<'_> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() && !self.done {
            match self.store.page_after(self.last) {
                Ok(page) => {
                    if page.len() < PAGE_SIZE {
                        self.done = true;
                    }
                    for (raw, doc) in page {
                        self.last = Some(raw);
                        self.buf.push_back(doc);
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.buf.pop_front().map(Ok)
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let raw_id: i64 = row.get(0)?;
    let path: String = row.get(1)?;
    let tags_json: String = row.get(4)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let state_text: String = row.get(7)?;
    let state = IndexState::parse(&state_text).unwrap_or(IndexState::Pending);
    let last_indexed: Option<String> = row.get(10)?;
    let last_indexed = last_indexed
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc));
    Ok(Document {
        id: DocId(raw_id as u64),
        path: PathBuf::from(path),
        fingerprint: row.get(2)?,
        snippet: row.get(3)?,
        tags,
        caption: row.get(5)?,
        has_embedding: row.get(6)?,
        state,
        embedding_failed: row.get(8)?,
        retries: row.get(9)?,
        last_indexed,
    })
}
