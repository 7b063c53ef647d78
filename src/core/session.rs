// src/core/session.rs

//! Durable storage of completed (or cancelled) runs.
//!
//! Each session is one pretty-printed JSON file, `session_<id>.json`, in the
//! store directory. Files are written to a hidden temporary name first and
//! renamed into place, so a reader never sees a half-written session.

use crate::core::models::ResultTree;
use crate::core::orchestrator::RunEvent;
use crate::core::target::Target;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "session_";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{0}' not found")]
    NotFound(String),
    #[error("session '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("failed to write session '{id}': {source}")]
    WriteFailure { id: String, source: std::io::Error },
    #[error("invalid session id '{0}'")]
    InvalidId(String),
    #[error("session store I/O error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// One persisted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    /// Module name -> that module's result tree.
    pub results: BTreeMap<String, ResultTree>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
}

/// An entry of [`SessionStore::list`]. Unreadable files are listed rather
/// than skipped so the caller can offer to discard them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionListing {
    Valid(SessionSummary),
    Corrupt { id: String, reason: String },
}

impl SessionListing {
    pub fn id(&self) -> &str {
        match self {
            SessionListing::Valid(summary) => &summary.id,
            SessionListing::Corrupt { id, .. } => id,
        }
    }
}

#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    /// Base and counter of the last id issued by this store.
    last_issued: Mutex<Option<(String, u32)>>,
}

impl SessionStore {
    /// Opens (creating if needed) the store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SessionError::Io { path: dir.clone(), source })?;
        debug!(dir = %dir.display(), "Session store opened.");
        Ok(Self { dir, last_issued: Mutex::new(None) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{id}{FILE_SUFFIX}"))
    }

    /// Time-derived id, `YYYYMMDD_HHMMSS_ffffff`, with a `-NNN` suffix when the
    /// clock has not advanced since the last id or the file already exists.
    /// Ids issued by one store sort lexicographically in issue order.
    fn next_id(&self) -> String {
        let now_base = Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        let mut last = self.last_issued.lock().unwrap_or_else(PoisonError::into_inner);

        let (base, mut seq) = match last.as_ref() {
            Some((last_base, last_seq)) if *last_base >= now_base => (last_base.clone(), last_seq + 1),
            _ => (now_base, 0),
        };
        let format_id = |seq: u32| {
            if seq == 0 { base.clone() } else { format!("{base}-{seq:03}") }
        };
        while self.path_for(&format_id(seq)).exists() {
            seq += 1;
        }

        let id = format_id(seq);
        *last = Some((base, seq));
        id
    }

    /// Persists a run and returns its new id.
    pub fn save(
        &self,
        target: &Target,
        timestamp: DateTime<Utc>,
        results: BTreeMap<String, ResultTree>,
    ) -> Result<String, SessionError> {
        let id = self.next_id();
        let session = Session {
            id: id.clone(),
            target: target.as_str().to_string(),
            timestamp,
            results,
        };
        let json = serde_json::to_vec_pretty(&session).map_err(|e| SessionError::WriteFailure {
            id: id.clone(),
            source: std::io::Error::other(e),
        })?;

        let final_path = self.path_for(&id);
        let tmp_path = self.dir.join(format!(".{FILE_PREFIX}{id}{FILE_SUFFIX}.tmp"));
        let written = write_then_rename(&tmp_path, &final_path, &json);
        if let Err(source) = written {
            warn!(id = %id, error = %source, "Failed to save session.");
            let _ = fs::remove_file(&tmp_path);
            return Err(SessionError::WriteFailure { id, source });
        }

        info!(id = %id, target = %session.target, modules = session.results.len(), "Session saved.");
        Ok(id)
    }

    /// All stored sessions, most recent first.
    pub fn list(&self) -> Result<Vec<SessionListing>, SessionError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| SessionError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut listings = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(id) = file_name
                .to_str()
                .and_then(|name| name.strip_prefix(FILE_PREFIX))
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };

            let listing = match self.load(id) {
                Ok(session) => SessionListing::Valid(SessionSummary {
                    id: id.to_string(),
                    target: session.target,
                    timestamp: session.timestamp,
                }),
                Err(e) => {
                    warn!(id, error = %e, "Unreadable session in store.");
                    SessionListing::Corrupt { id: id.to_string(), reason: e.to_string() }
                }
            };
            listings.push(listing);
        }

        listings.sort_by(|a, b| b.id().cmp(a.id()));
        Ok(listings)
    }

    pub fn load(&self, id: &str) -> Result<Session, SessionError> {
        validate_id(id)?;
        let path = self.path_for(id);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id.to_string()));
            }
            Err(source) => return Err(SessionError::Io { path, source }),
        };
        serde_json::from_slice(&raw).map_err(|e| SessionError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Removes a session. Deleting an unknown id is reported as `NotFound`.
    pub fn delete(&self, id: &str) -> Result<(), SessionError> {
        validate_id(id)?;
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(id, "Session deleted.");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SessionError::NotFound(id.to_string())),
            Err(source) => Err(SessionError::Io { path, source }),
        }
    }

    /// Writes a stored session as pretty JSON to `dest`.
    pub fn export(&self, id: &str, dest: &Path) -> Result<(), SessionError> {
        let session = self.load(id)?;
        let json = serde_json::to_vec_pretty(&session).map_err(|e| SessionError::WriteFailure {
            id: id.to_string(),
            source: std::io::Error::other(e),
        })?;
        fs::write(dest, json).map_err(|source| SessionError::WriteFailure { id: id.to_string(), source })?;
        info!(id, dest = %dest.display(), "Session exported.");
        Ok(())
    }
}

fn write_then_rename(tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp_path, final_path)
}

/// Ids only ever contain digits, `_` and `-`; anything else (path separators
/// in particular) cannot name a session.
fn validate_id(id: &str) -> Result<(), SessionError> {
    let valid = !id.is_empty()
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid { Ok(()) } else { Err(SessionError::InvalidId(id.to_string())) }
}

/// Folds a run's event stream into the result map of a session.
///
/// A failed module is kept as a tree holding only its `"Error"` message, so
/// the saved session has one entry for every module that was started.
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    target: Target,
    started_at: DateTime<Utc>,
    results: BTreeMap<String, ResultTree>,
    terminated: Option<RunEvent>,
}

impl SessionBuilder {
    pub fn new(target: Target, started_at: DateTime<Utc>) -> Self {
        Self { target, started_at, results: BTreeMap::new(), terminated: None }
    }

    pub fn observe(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Started { .. } => {}
            RunEvent::Succeeded { module, result } => {
                self.results.insert(module.to_string(), result.clone());
            }
            RunEvent::Failed { module, error } => {
                self.results.insert(module.to_string(), ResultTree::error(error.as_str()));
            }
            RunEvent::Cancelled | RunEvent::Finished => self.terminated = Some(event.clone()),
        }
    }

    pub fn results(&self) -> &BTreeMap<String, ResultTree> {
        &self.results
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self.terminated, Some(RunEvent::Cancelled))
    }

    pub fn save(self, store: &SessionStore) -> Result<String, SessionError> {
        store.save(&self.target, self.started_at, self.results)
    }
}
