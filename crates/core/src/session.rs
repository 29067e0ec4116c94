use crate::error::RagError;
use crate::extractor::sha256_hex;
use crate::index::write_json_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SESSION_FILE_SUFFIX: &str = ".session.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Transcript of one chat thread. Owned by the caller and handed to
/// [`SessionStore::save`] explicitly; nothing is checkpointed behind its back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    pub fn generate_thread_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into());
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into());
    }

    fn push(&mut self, role: Role, content: String) {
        let at = Utc::now();
        self.messages.push(ChatMessage { role, content, at });
        self.updated_at = at;
    }
}

/// One JSON file per thread under a directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{SESSION_FILE_SUFFIX}", sha256_hex(thread_id.as_bytes())))
    }

    pub fn load(&self, thread_id: &str) -> Result<Option<ChatSession>, RagError> {
        let path = self.path_for(thread_id);
        if !path.exists() {
            return Ok(None);
        }
        let session: ChatSession = serde_json::from_slice(&fs::read(&path)?)?;
        if session.thread_id != thread_id {
            return Err(RagError::Storage(format!(
                "{} belongs to thread {}, not {thread_id}",
                path.display(),
                session.thread_id
            )));
        }
        Ok(Some(session))
    }

    pub fn load_or_create(&self, thread_id: &str) -> Result<ChatSession, RagError> {
        Ok(self
            .load(thread_id)?
            .unwrap_or_else(|| ChatSession::new(thread_id)))
    }

    pub fn save(&self, session: &ChatSession) -> Result<(), RagError> {
        write_json_atomic(&self.path_for(&session.thread_id), session)
    }

    pub fn delete(&self, thread_id: &str) -> Result<bool, RagError> {
        let path = self.path_for(thread_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    /// Thread ids of every saved session, sorted.
    pub fn list_threads(&self) -> Result<Vec<String>, RagError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut threads = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !is_session_file(&path) {
                continue;
            }
            let session: ChatSession = serde_json::from_slice(&fs::read(&path)?)?;
            threads.push(session.thread_id);
        }
        threads.sort();
        Ok(threads)
    }
}

fn is_session_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(SESSION_FILE_SUFFIX))
}
