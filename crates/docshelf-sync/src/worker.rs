use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use docshelf_core::config::SyncConfig;
use docshelf_core::error::{Error, Result};
use docshelf_core::fingerprint::{doc_id_for_path, fingerprint_file};
use docshelf_core::traits::{Extractor, LexicalFields, LexicalIndexer, VectorIndexer};
use docshelf_core::types::{DocId, Document, IndexState, IndexStatus, ReconciliationEvent};
use docshelf_meta::MetadataStore;

const SNIPPET_CHARS: usize = 512;
const DONE_CHANNEL_CAPACITY: usize = 64;

struct PendingEntry {
    event: ReconciliationEvent,
    deadline: Instant,
}

/// The reconciliation worker for one library root.
///
/// The metadata store is the writer-of-record; both indices are only ever
/// written from here, so per-path serialization is enough to keep the
/// three stores consistent.
pub struct Synchronizer {
    meta: Arc<MetadataStore>,
    lexical: Arc<dyn LexicalIndexer>,
    vector: Arc<dyn VectorIndexer>,
    extractor: Arc<dyn Extractor>,
    config: SyncConfig,
}

impl Synchronizer {
    pub fn new(
        meta: Arc<MetadataStore>,
        lexical: Arc<dyn LexicalIndexer>,
        vector: Arc<dyn VectorIndexer>,
        extractor: Arc<dyn Extractor>,
        config: SyncConfig,
    ) -> Self {
        Self { meta, lexical, vector, extractor, config }
    }

    pub fn status(&self, id: DocId) -> Result<IndexStatus> {
        self.meta.status(id)
    }

    /// Event loop: absorb raw events into the debounce map, and once a
    /// path has been quiet for its window, dispatch it to a spawned task.
    /// At most one task per path is in flight; a path whose window closes
    /// while it is still in flight has its deadline pushed back.
    ///
    /// Closing the channel stops the loop after in-flight work finishes;
    /// still-debouncing entries are dropped (the next scan replays them).
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ReconciliationEvent>) {
        let (done_tx, mut done_rx) = mpsc::channel::<PathBuf>(DONE_CHANNEL_CAPACITY);
        let mut pending: HashMap<PathBuf, PendingEntry> = HashMap::new();
        let mut inflight: HashSet<PathBuf> = HashSet::new();
        let mut open = true;

        while open || !inflight.is_empty() {
            let next = pending.values().map(|e| e.deadline).min();
            tokio::select! {
                received = rx.recv(), if open => match received {
                    Some(event) => self.absorb(&mut pending, event),
                    None => {
                        open = false;
                        pending.clear();
                    }
                },
                finished = done_rx.recv() => {
                    if let Some(path) = finished {
                        inflight.remove(&path);
                    }
                }
                _ = async {
                    if let Some(deadline) = next {
                        sleep_until(deadline).await;
                    }
                }, if next.is_some() => {}
            }

            let now = Instant::now();
            let due: Vec<PathBuf> = pending
                .iter()
                .filter(|(_, e)| e.deadline <= now)
                .map(|(p, _)| p.clone())
                .collect();
            for path in due {
                if inflight.contains(&path) {
                    if let Some(entry) = pending.get_mut(&path) {
                        entry.deadline = now + Duration::from_millis(self.config.debounce_ms);
                    }
                    continue;
                }
                if let Some(entry) = pending.remove(&path) {
                    inflight.insert(path.clone());
                    let this = Arc::clone(&self);
                    let done = done_tx.clone();
                    tokio::spawn(async move {
                        if let Err(error) = this.reconcile(entry.event).await {
                            warn!(path = %path.display(), %error, "reconciliation failed");
                        }
                        let _ = done.send(path).await;
                    });
                }
            }
        }
        debug!("synchronizer stopped");
    }

    fn absorb(&self, pending: &mut HashMap<PathBuf, PendingEntry>, event: ReconciliationEvent) {
        let now = Instant::now();
        let debounce = Duration::from_millis(self.config.debounce_ms);
        // Deletes wait longer so the matching create of a cross-directory
        // move can arrive and settle as a rename first.
        let delete_window = Duration::from_millis(self.config.delete_window_ms);
        match event {
            ReconciliationEvent::Renamed { from, to } => {
                pending.remove(&from);
                pending.insert(
                    to.clone(),
                    PendingEntry {
                        event: ReconciliationEvent::Renamed { from, to },
                        deadline: now + debounce,
                    },
                );
            }
            ReconciliationEvent::Deleted(path) => {
                match pending.remove(&path) {
                    // Created then deleted inside the window: nothing to do.
                    Some(PendingEntry { event: ReconciliationEvent::Created(_), .. }) => {}
                    _ => {
                        pending.insert(
                            path.clone(),
                            PendingEntry {
                                event: ReconciliationEvent::Deleted(path),
                                deadline: now + delete_window,
                            },
                        );
                    }
                }
            }
            ReconciliationEvent::Created(path) => {
                let event = match pending.remove(&path) {
                    // Delete then create of the same path settles as a modify.
                    Some(PendingEntry { event: ReconciliationEvent::Deleted(_), .. }) => {
                        ReconciliationEvent::Modified(path.clone())
                    }
                    _ => ReconciliationEvent::Created(path.clone()),
                };
                pending.insert(path, PendingEntry { event, deadline: now + debounce });
            }
            ReconciliationEvent::Modified(path) => {
                let event = match pending.remove(&path) {
                    // A modify right after a create is still a create.
                    Some(PendingEntry { event: created @ ReconciliationEvent::Created(_), .. }) => {
                        created
                    }
                    _ => ReconciliationEvent::Modified(path.clone()),
                };
                pending.insert(path, PendingEntry { event, deadline: now + debounce });
            }
        }
    }

    /// Apply one settled event against the three stores.
    pub async fn reconcile(&self, event: ReconciliationEvent) -> Result<()> {
        match event {
            ReconciliationEvent::Created(path) | ReconciliationEvent::Modified(path) => {
                self.upsert_path(&path).await
            }
            ReconciliationEvent::Deleted(path) => self.remove_path(&path),
            ReconciliationEvent::Renamed { from, to } => self.rename_path(&from, &to).await,
        }
    }

    /// Re-enqueue documents that were mid-flight when the process last
    /// stopped. Pending and stale rows are re-extracted; rows whose file
    /// is gone are removed outright.
    pub async fn recover(&self) -> Result<()> {
        let work = self.meta.pending_or_stale()?;
        if !work.is_empty() {
            info!(count = work.len(), "recovering interrupted documents");
        }
        for doc in work {
            if doc.path.exists() {
                self.extract_and_index(doc).await?;
            } else {
                self.remove_path(&doc.path)?;
            }
        }
        Ok(())
    }

    async fn upsert_path(&self, path: &Path) -> Result<()> {
        let fingerprint = match fingerprint_file(path) {
            Ok(fp) => fp,
            Err(error) => {
                // The file vanished between the event and now; the delete
                // event or the next scan settles it.
                debug!(path = %path.display(), %error, "file unreadable, skipping");
                return Ok(());
            }
        };

        if let Some(existing) = self.meta.find_by_path(path)? {
            if existing.fingerprint == fingerprint && existing.state == IndexState::Indexed {
                debug!(id = %existing.id, "content unchanged");
                return Ok(());
            }
            let mut doc = existing;
            doc.fingerprint = fingerprint;
            doc.state = IndexState::Stale;
            doc.retries = 0;
            self.meta.upsert(&doc)?;
            return self.extract_and_index(doc).await;
        }

        // A new path carrying content we already hold, whose recorded file
        // is gone, is a move observed as bare create + delete.
        if let Some(moved) = self.meta.find_by_fingerprint(&fingerprint)? {
            if !moved.path.exists() {
                info!(id = %moved.id, from = %moved.path.display(), to = %path.display(),
                    "rename resolved by fingerprint");
                return self.apply_rename(&moved, path);
            }
        }

        let id = doc_id_for_path(path);
        let doc = Document::new(id, path.to_path_buf(), fingerprint);
        self.meta.upsert(&doc)?;
        self.extract_and_index(doc).await
    }

    fn remove_path(&self, path: &Path) -> Result<()> {
        let Some(doc) = self.meta.find_by_path(path)? else {
            return Ok(());
        };
        // Deleting is recorded first so a crash here leaves a row the next
        // scan finishes off, never a dangling index entry.
        self.meta.set_state(doc.id, IndexState::Deleting)?;
        self.lexical.remove(doc.id)?;
        self.vector.delete(doc.id)?;
        self.meta.delete(doc.id)?;
        info!(id = %doc.id, path = %path.display(), "document removed");
        Ok(())
    }

    async fn rename_path(&self, from: &Path, to: &Path) -> Result<()> {
        match self.meta.find_by_path(from)? {
            Some(doc) => self.apply_rename(&doc, to),
            // The source was never indexed; treat the destination as new.
            None => self.upsert_path(to).await,
        }
    }

    /// Path-only update: metadata and the lexical stored path change, the
    /// id, the postings, and the vector entry do not. The extractor is
    /// never invoked.
    fn apply_rename(&self, doc: &Document, to: &Path) -> Result<()> {
        self.meta.set_path(doc.id, to)?;
        self.lexical.update_path(doc.id, &to.to_string_lossy())?;
        debug!(id = %doc.id, to = %to.display(), "path updated");
        Ok(())
    }

    async fn extract_and_index(&self, mut doc: Document) -> Result<()> {
        let content = loop {
            match self.extractor.extract(&doc.path).await {
                Ok(content) => break content,
                Err(error) => {
                    let retries = self.meta.bump_retry(doc.id)?;
                    if retries >= self.config.max_extraction_retries {
                        warn!(id = %doc.id, %error, retries, "extraction failed, giving up");
                        self.meta.set_state(doc.id, IndexState::IndexFailed)?;
                        return Ok(());
                    }
                    // Exponential spacing so a transient collaborator
                    // failure is not hammered back-to-back.
                    let backoff = Duration::from_millis(
                        self.config.retry_backoff_ms.saturating_mul(1 << (retries - 1).min(6)),
                    );
                    debug!(id = %doc.id, %error, retries, ?backoff, "extraction failed, retrying");
                    sleep(backoff).await;
                }
            }
        };

        let fields = LexicalFields {
            text: content.text.clone(),
            tags: content.tags.clone(),
            caption: content.caption.clone(),
            path: doc.path.to_string_lossy().into_owned(),
        };
        self.lexical.index(doc.id, &fields)?;

        let had_embedding = doc.has_embedding;
        doc.has_embedding = false;
        doc.embedding_failed = false;
        match &content.embedding {
            Some(embedding) => match self.vector.insert(doc.id, embedding) {
                Ok(()) => doc.has_embedding = true,
                Err(Error::DimensionMismatch { expected, actual }) => {
                    // The document stays lexically searchable, but the
                    // previous revision's vector must not keep scoring.
                    warn!(id = %doc.id, expected, actual, "embedding rejected");
                    doc.embedding_failed = true;
                    if had_embedding {
                        self.vector.delete(doc.id)?;
                    }
                }
                Err(error) => return Err(error),
            },
            None => {
                // The new revision carries no embedding; drop any stale one.
                if had_embedding {
                    self.vector.delete(doc.id)?;
                }
            }
        }

        doc.snippet = snippet_of(&content.text);
        doc.tags = content.tags;
        doc.caption = content.caption;
        doc.state = IndexState::Indexed;
        doc.retries = 0;
        doc.last_indexed = Some(Utc::now());
        self.meta.upsert(&doc)?;
        info!(id = %doc.id, path = %doc.path.display(), "document indexed");
        Ok(())
    }
}

fn snippet_of(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}
