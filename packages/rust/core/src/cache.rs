//! Analysis cache keyed by document handle.
//!
//! Holds completed [`AnalysisRecord`]s in memory, bounded by capacity with
//! least-recently-used eviction. When backed by [`Storage`], records are
//! written through on commit and reloaded on a memory miss, so a document
//! analyzed by an earlier process is not preprocessed again. Storage is keyed
//! by the stage-set fingerprint, so changing a stage's model or template
//! makes older analyses invisible.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use docent_shared::{AnalysisRecord, DocumentHandle, Result};
use docent_storage::Storage;

struct Persistence {
    storage: Arc<Storage>,
    fingerprint: String,
}

pub struct AnalysisCache {
    entries: HashMap<DocumentHandle, AnalysisRecord>,
    recency: VecDeque<DocumentHandle>,
    capacity: usize,
    persistence: Option<Persistence>,
}

impl AnalysisCache {
    /// An in-memory cache holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: VecDeque::new(),
            capacity: capacity.max(1),
            persistence: None,
        }
    }

    /// Write records through to `storage` under `fingerprint`.
    pub fn persist_to(mut self, storage: Arc<Storage>, fingerprint: impl Into<String>) -> Self {
        self.persistence = Some(Persistence {
            storage,
            fingerprint: fingerprint.into(),
        });
        self
    }

    pub fn get(&self, handle: &DocumentHandle) -> Option<&AnalysisRecord> {
        self.entries.get(handle)
    }

    pub fn contains(&self, handle: &DocumentHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a record is available for `handle`, loading it from storage on
    /// a memory miss. Storage read failures count as a miss.
    pub async fn lookup(&mut self, handle: &DocumentHandle) -> bool {
        if self.entries.contains_key(handle) {
            self.touch(handle);
            return true;
        }

        let Some(p) = &self.persistence else {
            return false;
        };

        match p.storage.get_analysis(handle.as_str(), &p.fingerprint).await {
            Ok(Some(record)) => {
                debug!(%handle, "analysis restored from storage");
                self.insert(handle.clone(), record);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(%handle, error = %e, "failed to read stored analysis");
                false
            }
        }
    }

    /// Store a complete record. A storage write failure is logged and the
    /// record is still cached in memory.
    pub async fn commit(&mut self, handle: &DocumentHandle, record: AnalysisRecord) {
        if let Some(p) = &self.persistence {
            if let Err(e) = p
                .storage
                .put_analysis(handle.as_str(), &p.fingerprint, &record)
                .await
            {
                warn!(%handle, error = %e, "failed to persist analysis");
            }
        }
        self.insert(handle.clone(), record);
    }

    /// Drop the record for `handle` from memory and storage.
    ///
    /// Returns whether anything was removed.
    pub async fn invalidate(&mut self, handle: &DocumentHandle) -> Result<bool> {
        let in_memory = self.entries.remove(handle).is_some();
        self.recency.retain(|h| h != handle);

        let stored = match &self.persistence {
            Some(p) => p.storage.delete_analysis(handle.as_str()).await? > 0,
            None => false,
        };

        Ok(in_memory || stored)
    }

    fn insert(&mut self, handle: DocumentHandle, record: AnalysisRecord) {
        if self.entries.contains_key(&handle) {
            self.touch(&handle);
        } else {
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self.recency.pop_front() else {
                    break;
                };
                debug!(handle = %oldest, "evicting analysis from memory");
                self.entries.remove(&oldest);
            }
            self.recency.push_back(handle.clone());
        }
        self.entries.insert(handle, record);
    }

    fn touch(&mut self, handle: &DocumentHandle) {
        if let Some(pos) = self.recency.iter().position(|h| h == handle) {
            if let Some(h) = self.recency.remove(pos) {
                self.recency.push_back(h);
            }
        }
    }
}
