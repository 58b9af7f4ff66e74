mod migrate;
mod reducer;

pub use migrate::{migrate_legacy_value, parse_legacy};
pub use reducer::reduce;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use seeker_types::{EventRecord, Session, SessionEvent, SessionId};

use crate::{Error, Result};

/// Event-sourced session persistence.
///
/// One append-only JSONL file per session under
/// `{state_dir}/sessions/{id}.events.jsonl`. The in-memory map only caches
/// log versions; snapshots are always derived by folding the log, so
/// reopening the store observes exactly what was written.
pub struct SessionStore {
    sessions_dir: PathBuf,
    versions: Mutex<HashMap<SessionId, u64>>,
}

impl SessionStore {
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self> {
        let sessions_dir = state_dir.as_ref().join("sessions");
        std::fs::create_dir_all(&sessions_dir)?;
        Ok(Self {
            sessions_dir,
            versions: Mutex::new(HashMap::new()),
        })
    }

    fn log_path(&self, id: SessionId) -> PathBuf {
        self.sessions_dir.join(format!("{id}.events.jsonl"))
    }

    pub fn exists(&self, id: SessionId) -> bool {
        self.log_path(id).exists()
    }

    /// Append `events` after an optimistic concurrency check.
    ///
    /// `expected_version` is the version the caller believes the log is at
    /// (0 for a new session). On mismatch nothing is written and the call
    /// fails with `ConcurrencyConflict`. Returns the new log version.
    pub fn append(
        &self,
        id: SessionId,
        events: Vec<SessionEvent>,
        expected_version: u64,
    ) -> Result<u64> {
        if events.is_empty() {
            return Err(Error::CorruptLog("empty append".to_string()));
        }

        // The lock spans check and write so concurrent appends within this
        // process serialize; the version check handles other writers.
        let mut versions = self.versions.lock().expect("version cache poisoned");
        let actual = match versions.get(&id) {
            Some(v) => *v,
            None => self.version_on_disk(id)?,
        };
        if actual != expected_version {
            return Err(Error::ConcurrencyConflict {
                expected: expected_version,
                actual,
            });
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(id))?;

        let mut version = actual;
        let now = Utc::now();
        for event in events {
            version += 1;
            let record = EventRecord::new(id, version, now, event);
            let line = serde_json::to_string(&record)?;
            writeln!(file, "{line}")?;
        }
        file.flush()?;

        versions.insert(id, version);
        Ok(version)
    }

    /// Current log version without folding (0 if the session has no log).
    pub fn version(&self, id: SessionId) -> Result<u64> {
        if let Some(v) = self.versions.lock().expect("version cache poisoned").get(&id) {
            return Ok(*v);
        }
        self.version_on_disk(id)
    }

    fn version_on_disk(&self, id: SessionId) -> Result<u64> {
        if !self.exists(id) {
            return Ok(0);
        }
        Ok(self.read_log(id)?.last().map(|r| r.version).unwrap_or(0))
    }

    /// Read and validate the full event log for one session.
    pub fn read_log(&self, id: SessionId) -> Result<Vec<EventRecord>> {
        let path = self.log_path(id);
        if !path.exists() {
            return Err(Error::SessionNotFound(id.to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: EventRecord = serde_json::from_str(line).map_err(|e| {
                Error::CorruptLog(format!("{}:{}: {e}", path.display(), line_no + 1))
            })?;
            if record.aggregate_id != id {
                return Err(Error::CorruptLog(format!(
                    "record for {} found in log of {id}",
                    record.aggregate_id
                )));
            }
            let expected = records.len() as u64 + 1;
            if record.version != expected {
                return Err(Error::CorruptLog(format!(
                    "version {} at position {expected}",
                    record.version
                )));
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Reconstruct the session snapshot by folding its log.
    pub fn load(&self, id: SessionId) -> Result<Session> {
        let records = self.read_log(id)?;
        reduce(&records)
    }

    /// Snapshots of all sessions in the store, newest first.
    ///
    /// Unreadable logs are skipped with a warning rather than failing the
    /// whole listing.
    pub fn list(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.sessions_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(id_str) = name.to_str().and_then(|n| n.strip_suffix(".events.jsonl")) else {
                continue;
            };
            let Ok(id) = id_str.parse::<SessionId>() else {
                continue;
            };
            match self.load(id) {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    tracing::warn!(session = %id, error = %err, "skipping unreadable session log");
                }
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Convert a legacy snapshot-shaped session file into an event log.
    ///
    /// Refuses to run when the session already has events.
    pub fn migrate_legacy(&self, legacy_path: impl AsRef<Path>) -> Result<SessionId> {
        let raw = std::fs::read_to_string(legacy_path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidLegacy(e.to_string()))?;
        let (id, events) = migrate_legacy_value(&value)?;

        if self.version(id)? != 0 {
            return Err(Error::AlreadyMigrated);
        }
        self.append(id, events, 0)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeker_types::{
        ResearchStartedPayload, SessionStatus, WorkerCompletedPayload, WorkerStartedPayload,
    };

    fn started(query: &str) -> SessionEvent {
        SessionEvent::ResearchStarted(ResearchStartedPayload {
            query: query.to_string(),
        })
    }

    #[test]
    fn append_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let id = SessionId::new();

        let v = store.append(id, vec![started("what is rust")], 0).unwrap();
        assert_eq!(v, 1);

        let session = store.load(id).unwrap();
        assert_eq!(session.query, "what is rust");
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.version, 1);
    }

    #[test]
    fn version_mismatch_is_conflict_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let id = SessionId::new();
        store.append(id, vec![started("q")], 0).unwrap();

        let err = store
            .append(
                id,
                vec![SessionEvent::WorkerStarted(WorkerStartedPayload {
                    worker: 1,
                    objective: "x".to_string(),
                })],
                0,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConcurrencyConflict {
                expected: 0,
                actual: 1
            }
        ));
        assert_eq!(store.version(id).unwrap(), 1);
    }

    #[test]
    fn versions_increase_strictly_by_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let id = SessionId::new();

        store.append(id, vec![started("q")], 0).unwrap();
        let v = store
            .append(
                id,
                vec![
                    SessionEvent::WorkerStarted(WorkerStartedPayload {
                        worker: 1,
                        objective: "a".to_string(),
                    }),
                    SessionEvent::WorkerCompleted(WorkerCompletedPayload {
                        worker: 1,
                        output: "done".to_string(),
                        sources: vec![],
                        facts: vec![],
                        cost: Default::default(),
                    }),
                ],
                1,
            )
            .unwrap();
        assert_eq!(v, 3);

        let log = store.read_log(id).unwrap();
        let versions: Vec<u64> = log.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[test]
    fn reopened_store_observes_prior_writes() {
        let dir = tempfile::tempdir().unwrap();
        let id = SessionId::new();
        {
            let store = SessionStore::open(dir.path()).unwrap();
            store.append(id, vec![started("persistent")], 0).unwrap();
        }
        let store = SessionStore::open(dir.path()).unwrap();
        assert_eq!(store.version(id).unwrap(), 1);
        assert_eq!(store.load(id).unwrap().query, "persistent");
    }

    #[test]
    fn load_missing_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load(SessionId::new()),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[test]
    fn list_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        for i in 0..3 {
            store
                .append(SessionId::new(), vec![started(&format!("q{i}"))], 0)
                .unwrap();
        }
        let sessions = store.list().unwrap();
        assert_eq!(sessions.len(), 3);
        for pair in sessions.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }
}
