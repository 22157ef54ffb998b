//! Transcript sources
//!
//! The pipeline and the reprocessor load a user's raw conversation export
//! through `TranscriptSource`. The directory source reads
//! `<dir>/<user_id>.json`; the memory source backs tests and callers that
//! already hold the document.

use super::normalizer::Conversation;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Where raw conversation exports come from
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Load the full conversation export for a user
    async fn load(&self, user_id: &str) -> Result<Vec<Conversation>>;

    /// List user ids that have a transcript, sorted
    async fn list_users(&self) -> Result<Vec<String>>;
}

/// Reads `<dir>/<user_id>.json` files
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the transcript file for a user
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{user_id}.json"))
    }
}

/// Parse a conversation export from a file on disk
pub async fn load_file(path: &Path) -> Result<Vec<Conversation>> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!(
                "transcript file {}",
                path.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&data)
        .map_err(|e| Error::Transcript(format!("{}: {}", path.display(), e)))
}

#[async_trait]
impl TranscriptSource for DirectorySource {
    async fn load(&self, user_id: &str) -> Result<Vec<Conversation>> {
        load_file(&self.path_for(user_id)).await
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "input directory {}",
                    self.dir.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let mut users = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                users.push(stem.to_string());
            }
        }
        users.sort();
        Ok(users)
    }
}

/// In-memory transcript source
#[derive(Default)]
pub struct MemorySource {
    transcripts: RwLock<HashMap<String, Vec<Conversation>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a user's transcript
    pub async fn insert(&self, user_id: impl Into<String>, conversations: Vec<Conversation>) {
        self.transcripts
            .write()
            .await
            .insert(user_id.into(), conversations);
    }
}

#[async_trait]
impl TranscriptSource for MemorySource {
    async fn load(&self, user_id: &str) -> Result<Vec<Conversation>> {
        self.transcripts
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("transcript for user {user_id}")))
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        let mut users: Vec<String> = self.transcripts.read().await.keys().cloned().collect();
        users.sort();
        Ok(users)
    }
}
