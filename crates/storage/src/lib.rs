use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const STATE_SCHEMA_VERSION: u32 = 1;
const MAX_ID_LENGTH: usize = 128;

pub const DEFAULT_DOC_ID: &str = "editor-main";
pub const DEFAULT_TITLE: &str = "Untitled Design";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("{0}")]
    InvalidId(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Editor UI state kept for one document in one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorState {
    pub doc_id: String,
    pub title: String,
    pub content: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredState {
    session_id: String,
    #[serde(flatten)]
    state: EditorState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateEnvelope {
    version: u32,
    records: Vec<StoredState>,
}

/// Keyed by `(session_id, doc_id)`; records expire a day after their last save.
#[derive(Debug, Clone)]
pub struct EditorStateStore {
    root: PathBuf,
}

impl EditorStateStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs =
            ProjectDirs::from("dev", "Retext", "Retext").ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn save(
        &self,
        session_id: &str,
        doc_id: Option<&str>,
        title: Option<&str>,
        content: serde_json::Value,
    ) -> Result<EditorState, StorageError> {
        self.save_at(Utc::now(), session_id, doc_id, title, content)
    }

    pub fn load(
        &self,
        session_id: &str,
        doc_id: Option<&str>,
    ) -> Result<Option<EditorState>, StorageError> {
        self.load_at(Utc::now(), session_id, doc_id)
    }

    fn save_at(
        &self,
        now: DateTime<Utc>,
        session_id: &str,
        doc_id: Option<&str>,
        title: Option<&str>,
        content: serde_json::Value,
    ) -> Result<EditorState, StorageError> {
        let (session_id, doc_id) = normalize_key(session_id, doc_id)?;
        let title = match title.map(str::trim) {
            Some(title) if !title.is_empty() => title.to_owned(),
            _ => DEFAULT_TITLE.to_owned(),
        };
        let content = if content.is_object() || content.is_array() {
            content
        } else {
            serde_json::Value::Object(serde_json::Map::new())
        };

        let mut envelope = self.read_envelope()?;
        purge_expired(&mut envelope, now);

        let state = EditorState {
            doc_id: doc_id.clone(),
            title,
            content,
            updated_at: now,
            expires_at: now + Duration::days(1),
        };
        match envelope
            .records
            .iter_mut()
            .find(|record| record.session_id == session_id && record.state.doc_id == doc_id)
        {
            Some(record) => record.state = state.clone(),
            None => envelope.records.push(StoredState { session_id, state: state.clone() }),
        }

        self.write_envelope(&envelope)?;
        Ok(state)
    }

    fn load_at(
        &self,
        now: DateTime<Utc>,
        session_id: &str,
        doc_id: Option<&str>,
    ) -> Result<Option<EditorState>, StorageError> {
        let (session_id, doc_id) = normalize_key(session_id, doc_id)?;

        let mut envelope = self.read_envelope()?;
        if purge_expired(&mut envelope, now) > 0 {
            self.write_envelope(&envelope)?;
        }

        Ok(envelope
            .records
            .into_iter()
            .find(|record| record.session_id == session_id && record.state.doc_id == doc_id)
            .map(|record| record.state))
    }

    fn read_envelope(&self) -> Result<StateEnvelope, StorageError> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(StateEnvelope { version: STATE_SCHEMA_VERSION, records: Vec::new() });
        }

        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_envelope(&self, envelope: &StateEnvelope) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            StateEnvelope { version: STATE_SCHEMA_VERSION, records: envelope.records.clone() };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.state_path(), bytes)?;
        Ok(())
    }

    fn state_path(&self) -> PathBuf {
        self.root.join("editor-state.json")
    }
}

fn validate_id(value: &str, field: &str) -> Result<(), StorageError> {
    if value.is_empty() {
        return Err(StorageError::InvalidId(format!("{field} is required")));
    }
    if value.chars().count() > MAX_ID_LENGTH {
        return Err(StorageError::InvalidId(format!("{field} is too long")));
    }
    Ok(())
}

fn normalize_key(session_id: &str, doc_id: Option<&str>) -> Result<(String, String), StorageError> {
    let session_id = session_id.trim();
    let doc_id = doc_id.map(str::trim).filter(|id| !id.is_empty()).unwrap_or(DEFAULT_DOC_ID);

    validate_id(session_id, "sessionId")?;
    validate_id(doc_id, "docId")?;
    Ok((session_id.to_owned(), doc_id.to_owned()))
}

/// Drops records whose expiry has passed; returns how many went.
fn purge_expired(envelope: &mut StateEnvelope, now: DateTime<Utc>) -> usize {
    let before = envelope.records.len();
    envelope.records.retain(|record| record.state.expires_at > now);
    let removed = before - envelope.records.len();
    if removed > 0 {
        debug!(removed, "purged expired editor state");
    }
    removed
}
