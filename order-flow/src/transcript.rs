use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::error::{FlowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One line of a conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only per-session conversation log
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<()>;

    /// The last `n` entries, oldest first.
    async fn last(&self, session_id: &str, n: usize) -> Result<Vec<ChatMessage>>;

    async fn last_assistant_message(&self, session_id: &str) -> Result<Option<String>> {
        let recent = self.last(session_id, 10).await?;
        Ok(recent
            .into_iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content))
    }
}

pub struct InMemoryTranscriptStore {
    transcripts: DashMap<String, Vec<ChatMessage>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self {
            transcripts: DashMap::new(),
        }
    }
}

impl Default for InMemoryTranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<()> {
        self.transcripts
            .entry(session_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn last(&self, session_id: &str, n: usize) -> Result<Vec<ChatMessage>> {
        Ok(self
            .transcripts
            .get(session_id)
            .map(|messages| tail(&messages, n))
            .unwrap_or_default())
    }
}

/// Transcripts kept as one JSON-lines file per session under `dir`
pub struct FileTranscriptStore {
    dir: PathBuf,
}

impl FileTranscriptStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(io_error)?;
        Ok(Self { dir })
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        let file_name: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.jsonl"))
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<()> {
        let mut line = serde_json::to_string(&message)
            .map_err(|e| FlowError::TranscriptError(e.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(session_id))
            .await
            .map_err(io_error)?;
        file.write_all(line.as_bytes()).await.map_err(io_error)?;
        Ok(())
    }

    async fn last(&self, session_id: &str, n: usize) -> Result<Vec<ChatMessage>> {
        let raw = match tokio::fs::read_to_string(self.path_for(session_id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };

        // A torn trailing line from an interrupted write is skipped
        let messages: Vec<ChatMessage> = raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        Ok(tail(&messages, n))
    }
}

fn tail(messages: &[ChatMessage], n: usize) -> Vec<ChatMessage> {
    messages[messages.len().saturating_sub(n)..].to_vec()
}

fn io_error(e: std::io::Error) -> FlowError {
    FlowError::TranscriptError(e.to_string())
}
