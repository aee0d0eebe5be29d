//! Artifact History - Bounded, Newest-First Version List
//!
//! Entries keep their `id` for life. Saving with a known id moves the entry
//! to the front with new content; anything else inserts a fresh entry.
//! Entries past capacity are dropped silently: history is a convenience
//! cache, not an archive.
//!
//! Single writer. Every mutation through [`PersistentHistory`] rewrites the
//! whole list to its backend.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::Artifact;

pub const DEFAULT_CAPACITY: usize = 50;
pub const DEFAULT_TYPOGRAPHY: &str = "Inter";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "timestamp")]
    pub created_at_millis: i64,
    #[serde(rename = "code")]
    pub artifact: Artifact,
    /// Data URL (or link) of the source image preview
    #[serde(rename = "previewUrl", default)]
    pub thumbnail: String,
    #[serde(rename = "fontFamily", default = "default_typography")]
    pub typography: String,
}

fn default_typography() -> String { DEFAULT_TYPOGRAPHY.to_string() }

/// Content for an upsert; the store assigns id and timestamp
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub display_name: String,
    pub artifact: Artifact,
    pub thumbnail: String,
    pub typography: String,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Seed from a persisted list, keeping its order and the capacity cap
    pub fn with_entries(mut entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        entries.truncate(capacity);
        Self { entries, capacity }
    }

    pub fn upsert(&mut self, draft: EntryDraft, editing_id: Option<&str>) -> &[HistoryEntry] {
        self.upsert_at(draft, editing_id, Utc::now().timestamp_millis())
    }

    pub fn upsert_at(
        &mut self,
        draft: EntryDraft,
        editing_id: Option<&str>,
        now_millis: i64,
    ) -> &[HistoryEntry] {
        let existing = editing_id.and_then(|id| self.entries.iter().position(|e| e.id == id));
        let id = match existing {
            Some(index) => self.entries.remove(index).id,
            None => Uuid::new_v4().to_string(),
        };

        self.entries.insert(
            0,
            HistoryEntry {
                id,
                display_name: draft.display_name,
                created_at_millis: now_millis,
                artifact: draft.artifact,
                thumbnail: draft.thumbnail,
                typography: draft.typography,
            },
        );
        self.entries.truncate(self.capacity);
        &self.entries
    }

    /// Remove by id; unknown ids are a no-op
    pub fn remove(&mut self, id: &str) -> &[HistoryEntry] {
        self.entries.retain(|e| e.id != id);
        &self.entries
    }

    pub fn all(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// External storage for the serialized list
pub trait HistoryBackend {
    fn load(&self) -> Result<Option<String>, HistoryError>;
    fn save(&mut self, serialized: &str) -> Result<(), HistoryError>;
}

/// One JSON document on disk
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<String>, HistoryError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }

    fn save(&mut self, serialized: &str) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Readers never observe a partially written list
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process backend, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Option<String>,
}

impl MemoryBackend {
    pub fn new(data: Option<String>) -> Self {
        Self { data }
    }
}

impl HistoryBackend for MemoryBackend {
    fn load(&self) -> Result<Option<String>, HistoryError> {
        Ok(self.data.clone())
    }

    fn save(&mut self, serialized: &str) -> Result<(), HistoryError> {
        self.data = Some(serialized.to_string());
        Ok(())
    }
}

/// History store that writes through to a backend on every mutation
pub struct PersistentHistory {
    store: HistoryStore,
    backend: Box<dyn HistoryBackend>,
}

impl PersistentHistory {
    /// Load persisted history. Unparseable content starts an empty list.
    pub fn open(backend: Box<dyn HistoryBackend>, capacity: usize) -> Result<Self, HistoryError> {
        let entries = match backend.load()? {
            Some(raw) if !raw.trim().is_empty() => {
                match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(error = %e, "persisted history is malformed, starting empty");
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };
        info!(entries = entries.len(), capacity, "history loaded");
        Ok(Self {
            store: HistoryStore::with_entries(entries, capacity),
            backend,
        })
    }

    pub fn in_memory(capacity: usize) -> Self {
        Self {
            store: HistoryStore::new(capacity),
            backend: Box::new(MemoryBackend::default()),
        }
    }

    pub fn upsert(
        &mut self,
        draft: EntryDraft,
        editing_id: Option<&str>,
    ) -> Result<&HistoryEntry, HistoryError> {
        let mut next = self.store.clone();
        next.upsert(draft, editing_id);
        self.commit(next)?;
        let entry = &self.store.all()[0];
        info!(id = %entry.id, name = %entry.display_name, edited = editing_id.is_some(), "history entry saved");
        Ok(entry)
    }

    pub fn remove(&mut self, id: &str) -> Result<&[HistoryEntry], HistoryError> {
        if self.store.contains(id) {
            let mut next = self.store.clone();
            next.remove(id);
            self.commit(next)?;
            info!(id, "history entry deleted");
        }
        Ok(self.store.all())
    }

    pub fn all(&self) -> &[HistoryEntry] {
        self.store.all()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.store.get(id)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Save `next`, then make it current. On failure nothing changes.
    fn commit(&mut self, next: HistoryStore) -> Result<(), HistoryError> {
        self.backend.save(&next.to_json()?)?;
        self.store = next;
        Ok(())
    }
}
