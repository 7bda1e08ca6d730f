use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};
use walkdir::WalkDir;

use docshelf_core::config::{LibraryConfig, SyncConfig};
use docshelf_core::error::Result;
use docshelf_core::fingerprint::fingerprint_file;
use docshelf_core::types::ReconciliationEvent;
use docshelf_meta::MetadataStore;

/// Fallback event source: periodically diffs the on-disk library tree
/// against the metadata store and emits the difference as ordinary
/// reconciliation events. Catches anything a native watcher missed, and
/// suffices on its own where no watcher adapter is wired up.
pub struct PollScanner {
    root: PathBuf,
    extensions: Vec<String>,
    period: Duration,
    meta: Arc<MetadataStore>,
}

impl PollScanner {
    pub fn new(library: &LibraryConfig, sync: &SyncConfig, meta: Arc<MetadataStore>) -> Self {
        Self {
            root: library.root_path(),
            extensions: library.extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            period: Duration::from_millis(sync.poll_interval_ms),
            meta,
        }
    }

    /// Scan on the configured interval until the event channel closes.
    pub async fn run(self, tx: mpsc::Sender<ReconciliationEvent>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.scan() {
                Ok(events) => {
                    for event in events {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Err(error) => warn!(%error, "library scan failed"),
            }
        }
    }

    /// One full diff of disk against the store: unknown files become
    /// `Created`, changed fingerprints become `Modified`, recorded paths
    /// missing from disk become `Deleted`.
    pub fn scan(&self) -> Result<Vec<ReconciliationEvent>> {
        let mut on_disk = HashSet::new();
        let mut events = Vec::new();

        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if !self.is_supported(&path) {
                continue;
            }
            match self.meta.find_by_path(&path)? {
                None => events.push(ReconciliationEvent::Created(path.clone())),
                Some(doc) => {
                    // An unreadable file is left to the next scan.
                    if let Ok(fingerprint) = fingerprint_file(&path) {
                        if fingerprint != doc.fingerprint {
                            events.push(ReconciliationEvent::Modified(path.clone()));
                        }
                    }
                }
            }
            on_disk.insert(path);
        }

        for (_, path) in self.meta.paths_under(&self.root)? {
            if !on_disk.contains(&path) {
                events.push(ReconciliationEvent::Deleted(path));
            }
        }

        if !events.is_empty() {
            debug!(count = events.len(), "scan found differences");
        }
        Ok(events)
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let lower = e.to_ascii_lowercase();
                self.extensions.iter().any(|x| *x == lower)
            })
            .unwrap_or(false)
    }
}
