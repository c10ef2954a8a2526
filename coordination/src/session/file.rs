//! JSON-file session store. The whole ledger is rewritten on every mutation.
//!
//! A mutation is applied to a copy of the ledger, written to a sibling temp
//! file and renamed over the store. Memory is only updated once the rename
//! succeeds, so a failed write leaves both sides on the previous state.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::{
    lock, ActivityOutcome, ActivityRecord, SessionLedger, SessionRecord, SessionStore,
    SessionUpdate, StoreError,
};
use crate::types::ForecastQuestion;

/// File-backed store for CLI runs.
#[derive(Debug)]
pub struct JsonFileSessionStore {
    path: PathBuf,
    ledger: Mutex<SessionLedger>,
}

impl JsonFileSessionStore {
    /// Open a store at `path`, loading existing sessions if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let ledger = load_ledger(&path)?.unwrap_or_default();
        debug!(path = %path.display(), sessions = ledger.sessions.len(), "session store opened");
        Ok(Self {
            path,
            ledger: Mutex::new(ledger),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut SessionLedger) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut ledger = lock(&self.ledger)?;
        let mut next = ledger.clone();
        let out = f(&mut next)?;
        save_ledger(&next, &self.path)?;
        *ledger = next;
        Ok(out)
    }
}

/// Save a ledger as JSON, creating parent directories as needed. The file
/// is replaced atomically.
pub fn save_ledger(ledger: &SessionLedger, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec(ledger)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a ledger. A missing file is `Ok(None)`.
pub fn load_ledger(path: &Path) -> Result<Option<SessionLedger>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&json)?))
}

impl SessionStore for JsonFileSessionStore {
    fn create_session(&self, question: &ForecastQuestion) -> Result<String, StoreError> {
        self.mutate(|ledger| Ok(ledger.create(question)))
    }

    fn update_session(&self, id: &str, update: SessionUpdate) -> Result<(), StoreError> {
        self.mutate(|ledger| ledger.update(id, update))
    }

    fn log_activity(
        &self,
        id: &str,
        stage: &str,
        outcome: ActivityOutcome,
    ) -> Result<(), StoreError> {
        self.mutate(|ledger| ledger.log(id, stage, outcome))
    }

    fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(lock(&self.ledger)?.get(id))
    }

    fn list_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(lock(&self.ledger)?.recent(limit))
    }

    fn activities(&self, id: &str) -> Result<Vec<ActivityRecord>, StoreError> {
        Ok(lock(&self.ledger)?.activities_for(id))
    }
}
