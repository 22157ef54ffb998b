//! Fact store with file-based JSON persistence
//!
//! Directory layout:
//! ```text
//! ~/.factkeeper/store/
//! ├── facts/
//! │   ├── <uuid>.json
//! │   └── ...
//! └── markers/
//!     ├── <user-id>.json
//!     └── ...
//! ```
//!
//! Reads are served from memory. Every mutation is written to disk before
//! it becomes visible; files are replaced through a temporary file and a
//! rename so a marker or fact is never half-written.

use super::memory::InMemoryFactStore;
use super::types::*;
use super::FactStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// JSON-file backed fact store
pub struct FileFactStore {
    facts_dir: PathBuf,
    markers_dir: PathBuf,
    cache: InMemoryFactStore,
}

impl FileFactStore {
    /// Open (or create) a store at the given base directory
    pub async fn open(base_dir: PathBuf) -> Result<Self> {
        let facts_dir = base_dir.join("facts");
        let markers_dir = base_dir.join("markers");

        tokio::fs::create_dir_all(&facts_dir).await?;
        tokio::fs::create_dir_all(&markers_dir).await?;

        let facts = load_json_files::<FactRecord>(&facts_dir);
        let markers = load_json_files::<ProcessedMarker>(&markers_dir);
        tracing::debug!(
            facts = facts.len(),
            markers = markers.len(),
            dir = %base_dir.display(),
            "Loaded fact store"
        );

        Ok(Self {
            facts_dir,
            markers_dir,
            cache: InMemoryFactStore::from_parts(facts, markers),
        })
    }

    /// Default base directory (~/.factkeeper/store/)
    pub fn default_dir() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".factkeeper")
            .join("store")
    }

    fn fact_path(&self, id: &str) -> PathBuf {
        self.facts_dir.join(format!("{}.json", file_stem(id)))
    }

    fn marker_path(&self, user_id: &str) -> PathBuf {
        self.markers_dir.join(format!("{}.json", file_stem(user_id)))
    }

    async fn persist_fact(&self, record: &FactRecord) -> Result<()> {
        write_json(&self.fact_path(&record.id), record).await
    }
}

/// Map an identifier to a safe, collision-free file stem. Bytes outside
/// `[A-Za-z0-9-_.+]` are written as `%XX`, `%` included.
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'+') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

/// Write JSON atomically: temp file, then rename
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Load all JSON files from a directory, skipping unreadable ones
fn load_json_files<T: DeserializeOwned>(dir: &Path) -> Vec<T> {
    let mut items = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read directory {}: {}", dir.display(), e);
            }
            return items;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("Failed to parse {}: {}", path.display(), e),
            },
            Err(e) => tracing::warn!("Failed to read {}: {}", path.display(), e),
        }
    }

    items
}

#[async_trait]
impl FactStore for FileFactStore {
    async fn ping(&self) -> bool {
        tokio::fs::metadata(&self.facts_dir).await.is_ok()
            && tokio::fs::metadata(&self.markers_dir).await.is_ok()
    }

    async fn insert_fact(&self, fact: NewFact) -> Result<String> {
        let record = fact.into_record(uuid::Uuid::new_v4().to_string(), Utc::now());
        self.persist_fact(&record)
            .await
            .map_err(|e| Error::Store(format!("failed to write fact {}: {}", record.id, e)))?;
        let id = record.id.clone();
        self.cache.push_record(record).await;
        Ok(id)
    }

    async fn get_fact(&self, id: &str) -> Result<Option<FactRecord>> {
        self.cache.get_fact(id).await
    }

    async fn query_facts(&self, query: &FactQuery) -> Result<Vec<FactRecord>> {
        self.cache.query_facts(query).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: FactStatus,
        reviewed_by: &str,
    ) -> Result<FactRecord> {
        let previous = self
            .cache
            .get_fact(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("fact {id}")))?;
        let updated = self.cache.update_status(id, status, reviewed_by).await?;
        if let Err(e) = self.persist_fact(&updated).await {
            self.cache.replace_record(previous).await;
            return Err(Error::Store(format!("failed to write fact {id}: {e}")));
        }
        Ok(updated)
    }

    async fn mark_reprocessing_complete(&self, id: &str) -> Result<()> {
        let previous = self
            .cache
            .get_fact(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("fact {id}")))?;
        let updated = self.cache.clear_reprocess_flag(id).await?;
        if let Err(e) = self.persist_fact(&updated).await {
            self.cache.replace_record(previous).await;
            return Err(Error::Store(format!("failed to write fact {id}: {e}")));
        }
        Ok(())
    }

    async fn get_marker(&self, user_id: &str) -> Result<Option<ProcessedMarker>> {
        self.cache.get_marker(user_id).await
    }

    async fn upsert_marker(&self, marker: ProcessedMarker) -> Result<()> {
        write_json(&self.marker_path(&marker.user_id), &marker)
            .await
            .map_err(|e| Error::Store(format!("failed to write marker {}: {}", marker.user_id, e)))?;
        self.cache.upsert_marker(marker).await
    }

    async fn delete_marker(&self, user_id: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.marker_path(user_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.cache.delete_marker(user_id).await
    }
}
