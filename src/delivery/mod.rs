// Text delivery and history persistence
//
// Pasting happens through a host-provided sink (the core never touches OS
// insertion mechanics); history goes to an append-only store. Both side
// effects are guarded by the session tracker at the call site.

use crate::context::TargetWindow;
use crate::session::WorkflowMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors from the paste/insert sink
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeliveryError {
    #[error("paste failed: {0}")]
    PasteFailed(String),
    #[error("target application is gone")]
    TargetGone,
}

/// Paste/insert service provided by the host
pub trait DeliverySink: Send + Sync {
    /// Insert text into the target application captured at recording start.
    fn paste_text(&self, target: Option<&TargetWindow>, text: &str) -> Result<(), DeliveryError>;

    /// Replace previously delivered text in place (undo-then-paste). Only
    /// called when the target is still foregrounded.
    fn replace_text(&self, target: &TargetWindow, text: &str) -> Result<(), DeliveryError>;

    /// Whether the target application is still the foreground app.
    fn is_target_foreground(&self, target: &TargetWindow) -> bool;
}

/// One delivered result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub mode: WorkflowMode,
    pub raw_text: String,
    pub output_text: String,
    pub created_at: String,
}

impl HistoryRecord {
    pub fn new(mode: WorkflowMode, raw_text: String, output_text: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mode,
            raw_text,
            output_text,
            created_at: crate::events::current_timestamp(),
        }
    }
}

/// Errors from the history store
#[derive(Debug, Error)]
pub enum HistoryStoreError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only history store
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryStoreError>;
}

/// History store backed by a JSONL file under the platform data dir
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default history location.
    pub fn at_default_path() -> Self {
        Self::new(crate::paths::history_path())
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryStoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        crate::debug!("[delivery] History record {} appended", record.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_history_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");
        let store = FileHistoryStore::new(path.clone());

        store
            .append(HistoryRecord::new(
                WorkflowMode::Dictate,
                "hi there".to_string(),
                "Hi there.".to_string(),
            ))
            .await
            .unwrap();
        store
            .append(HistoryRecord::new(
                WorkflowMode::Ask,
                "what is rust".to_string(),
                "A systems language.".to_string(),
            ))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: HistoryRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.mode, WorkflowMode::Dictate);
        assert_eq!(first.output_text, "Hi there.");

        let second: HistoryRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.mode, WorkflowMode::Ask);
    }

    #[test]
    fn test_history_record_has_unique_ids() {
        let a = HistoryRecord::new(WorkflowMode::Dictate, "a".into(), "A".into());
        let b = HistoryRecord::new(WorkflowMode::Dictate, "b".into(), "B".into());
        assert_ne!(a.id, b.id);
        assert!(!a.created_at.is_empty());
    }
}
