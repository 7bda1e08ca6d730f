use std::cmp::Ordering;
use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexWriter, TantivyDocument, Term};
use tracing::debug;

use docshelf_core::error::{Error, Result};
use docshelf_core::traits::{LexicalFields, LexicalIndexer};
use docshelf_core::types::{DocId, SearchHit, SourceKind};

use crate::tokenizer::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Inverted index over text, tags, and caption, keyed by document id.
pub struct LexicalIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    id_field: tantivy::schema::Field,
    text_field: tantivy::schema::Field,
    tags_field: tantivy::schema::Field,
    caption_field: tantivy::schema::Field,
    path_field: tantivy::schema::Field,
}

impl LexicalIndex {
    /// Open the index directory, creating it (and the schema) on first use.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::lexical)?;
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir).map_err(Error::lexical)?
        } else {
            Index::create_in_dir(dir, build_schema()).map_err(Error::lexical)?
        };
        register_tokenizer(&index);
        let schema = index.schema();
        let id_field = schema.get_field("id").map_err(Error::lexical)?;
        let text_field = schema.get_field("text").map_err(Error::lexical)?;
        let tags_field = schema.get_field("tags").map_err(Error::lexical)?;
        let caption_field = schema.get_field("caption").map_err(Error::lexical)?;
        let path_field = schema.get_field("path").map_err(Error::lexical)?;
        let writer = index.writer(WRITER_HEAP_BYTES).map_err(Error::lexical)?;
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            id_field,
            text_field,
            tags_field,
            caption_field,
            path_field,
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>> {
        self.writer.lock().map_err(|_| Error::Lexical("index writer lock poisoned".into()))
    }
}

impl LexicalIndexer for LexicalIndex {
    /// Replace all postings for `id` with postings for `fields`. The delete
    /// and the add land in the same commit, so a concurrent reader sees the
    /// document either entirely old or entirely new.
    fn index(&self, id: DocId, fields: &LexicalFields) -> Result<()> {
        let mut writer = self.writer()?;
        writer.delete_term(Term::from_field_u64(self.id_field, id.as_u64()));
        let mut document = doc!(
            self.id_field => id.as_u64(),
            self.text_field => fields.text.clone(),
            self.path_field => fields.path.clone(),
        );
        for tag in &fields.tags {
            document.add_text(self.tags_field, tag);
        }
        if let Some(caption) = &fields.caption {
            document.add_text(self.caption_field, caption);
        }
        writer.add_document(document).map_err(Error::lexical)?;
        writer.commit().map_err(Error::lexical)?;
        debug!(%id, "lexically indexed");
        Ok(())
    }

    fn remove(&self, id: DocId) -> Result<()> {
        let mut writer = self.writer()?;
        writer.delete_term(Term::from_field_u64(self.id_field, id.as_u64()));
        writer.commit().map_err(Error::lexical)?;
        debug!(%id, "removed from lexical index");
        Ok(())
    }

    /// Rewrite the document under a new path from its stored fields; the
    /// searchable postings are re-derived from the same text, so matches
    /// are unaffected. A missing id is a no-op.
    fn update_path(&self, id: DocId, path: &str) -> Result<()> {
        let reader = self.index.reader().map_err(Error::lexical)?;
        let searcher = reader.searcher();
        let query = TermQuery::new(
            Term::from_field_u64(self.id_field, id.as_u64()),
            IndexRecordOption::Basic,
        );
        let top = searcher.search(&query, &TopDocs::with_limit(1)).map_err(Error::lexical)?;
        let Some((_, addr)) = top.into_iter().next() else {
            return Ok(());
        };
        let stored: TantivyDocument = searcher.doc(addr).map_err(Error::lexical)?;
        let mut document = TantivyDocument::default();
        document.add_u64(self.id_field, id.as_u64());
        for field in [self.text_field, self.tags_field, self.caption_field] {
            for value in stored.get_all(field) {
                if let Some(text) = value.as_str() {
                    document.add_text(field, text);
                }
            }
        }
        document.add_text(self.path_field, path);
        let mut writer = self.writer()?;
        writer.delete_term(Term::from_field_u64(self.id_field, id.as_u64()));
        writer.add_document(document).map_err(Error::lexical)?;
        writer.commit().map_err(Error::lexical)?;
        debug!(%id, path, "lexical path updated");
        Ok(())
    }

    /// BM25 search over text, tags, and caption. Ties are broken by the
    /// smaller document id so repeated queries return identical orderings.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let reader = self.index.reader().map_err(Error::lexical)?;
        let searcher = reader.searcher();
        let parser = QueryParser::for_index(
            &self.index,
            vec![self.text_field, self.tags_field, self.caption_field],
        );
        let (parsed, _errors) = parser.parse_query_lenient(query);
        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(Error::lexical)?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let stored: TantivyDocument = searcher.doc(addr).map_err(Error::lexical)?;
            if let Some(raw) = stored.get_first(self.id_field).and_then(|v| v.as_u64()) {
                hits.push(SearchHit { id: DocId(raw), score, source: SourceKind::Lexical });
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
