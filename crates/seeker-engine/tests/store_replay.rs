//! Event-sourcing replay properties: close, reopen, identical snapshot.

use seeker_engine::SessionStore;
use seeker_types::{
    Cost, Fact, ResearchCompletedPayload, ResearchStartedPayload, SessionEvent, SessionId,
    SessionStatus, WorkerCompletedPayload, WorkerStartedPayload,
};

fn worker_pair(n: u32) -> Vec<SessionEvent> {
    vec![
        SessionEvent::WorkerStarted(WorkerStartedPayload {
            worker: n,
            objective: format!("objective {n}"),
        }),
        SessionEvent::WorkerCompleted(WorkerCompletedPayload {
            worker: n,
            output: format!("output {n}"),
            sources: vec![format!("https://source-{n}.example")],
            facts: vec![Fact::new(
                format!("fact {n}"),
                format!("https://source-{n}.example"),
                0.9,
            )],
            cost: Cost::new(100, 10, 0.001),
        }),
    ]
}

#[test]
fn fifty_events_survive_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = SessionId::new();

    let before = {
        let store = SessionStore::open(dir.path()).unwrap();
        let mut version = store
            .append(
                id,
                vec![SessionEvent::ResearchStarted(ResearchStartedPayload {
                    query: "replay test".to_string(),
                })],
                0,
            )
            .unwrap();

        // 24 worker pairs (48 events) + started + completed = 50 records.
        for n in 1..=24 {
            version = store.append(id, worker_pair(n), version).unwrap();
        }
        store
            .append(
                id,
                vec![SessionEvent::ResearchCompleted(ResearchCompletedPayload {
                    duration_ms: 5000,
                    source_count: 24,
                    cost: Cost::new(2400, 240, 0.024),
                })],
                version,
            )
            .unwrap();
        store.load(id).unwrap()
    };

    // Fresh store instance over the same directory.
    let store = SessionStore::open(dir.path()).unwrap();
    let after = store.load(id).unwrap();

    assert_eq!(after.version, 50);
    assert_eq!(
        serde_json::to_value(&before).unwrap(),
        serde_json::to_value(&after).unwrap()
    );
    assert_eq!(after.status, SessionStatus::Complete);
    assert_eq!(after.workers.len(), 24);
}

#[test]
fn loading_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();
    let id = SessionId::new();

    let version = store
        .append(
            id,
            vec![SessionEvent::ResearchStarted(ResearchStartedPayload {
                query: "idempotent".to_string(),
            })],
            0,
        )
        .unwrap();
    store.append(id, worker_pair(1), version).unwrap();

    let first = store.load(id).unwrap();
    let second = store.load(id).unwrap();
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[test]
fn failed_append_leaves_version_unchanged_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = SessionId::new();
    {
        let store = SessionStore::open(dir.path()).unwrap();
        store
            .append(
                id,
                vec![SessionEvent::ResearchStarted(ResearchStartedPayload {
                    query: "conflict".to_string(),
                })],
                0,
            )
            .unwrap();
        assert!(store.append(id, worker_pair(1), 7).is_err());
    }
    let store = SessionStore::open(dir.path()).unwrap();
    assert_eq!(store.version(id).unwrap(), 1);
}
