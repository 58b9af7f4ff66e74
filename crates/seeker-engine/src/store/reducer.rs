use seeker_types::{
    EventRecord, Session, SessionEvent, SessionStatus, Worker, WorkerStatus,
};

use crate::{Error, Result};

// NOTE: The reducer is a pure function of the record sequence. Anything
// nondeterministic (clocks, ids) comes from the records themselves, never
// from the environment, so replaying a log always yields the same snapshot.

/// Fold an ordered event log into a session snapshot.
///
/// The first record must be `ResearchStarted`; a session that reached a
/// terminal status accepts no further events.
pub fn reduce(records: &[EventRecord]) -> Result<Session> {
    let first = records
        .first()
        .ok_or_else(|| Error::CorruptLog("empty log".to_string()))?;

    let SessionEvent::ResearchStarted(start) = &first.event else {
        return Err(Error::CorruptLog(
            "first event is not research_started".to_string(),
        ));
    };

    let mut session = Session::new(first.aggregate_id, start.query.clone(), first.timestamp);
    session.status = SessionStatus::Running;
    session.version = first.version;

    for record in &records[1..] {
        if session.status.is_terminal() {
            return Err(Error::CorruptLog(format!(
                "event at version {} follows terminal status",
                record.version
            )));
        }
        apply(&mut session, record)?;
        session.version = record.version;
    }

    Ok(session)
}

fn apply(session: &mut Session, record: &EventRecord) -> Result<()> {
    match &record.event {
        SessionEvent::ResearchStarted(_) => {
            return Err(Error::CorruptLog(format!(
                "duplicate research_started at version {}",
                record.version
            )));
        }
        SessionEvent::PlanCreated(_) => {
            // The plan snapshot is informational; workers materialize from
            // their own start events.
        }
        SessionEvent::WorkerStarted(payload) => {
            if session.worker(payload.worker).is_none() {
                session
                    .workers
                    .push(Worker::new(payload.worker, payload.objective.clone()));
                session.workers.sort_by_key(|w| w.number);
            }
            let worker = session
                .worker_mut(payload.worker)
                .expect("worker just inserted");
            worker.status = WorkerStatus::Running;
            worker.started_at = Some(record.timestamp);
        }
        SessionEvent::WorkerCompleted(payload) => {
            session.cost.add(&payload.cost);
            for source in &payload.sources {
                if !session.sources.contains(source) {
                    session.sources.push(source.clone());
                }
            }
            let Some(worker) = session.worker_mut(payload.worker) else {
                return Err(Error::CorruptLog(format!(
                    "completion for unknown worker {}",
                    payload.worker
                )));
            };
            worker.status = WorkerStatus::Complete;
            worker.completed_at = Some(record.timestamp);
            worker.output = Some(payload.output.clone());
            worker.sources = payload.sources.clone();
            worker.facts = payload.facts.clone();
            worker.cost = payload.cost.clone();
        }
        SessionEvent::WorkerFailed(payload) => {
            let Some(worker) = session.worker_mut(payload.worker) else {
                return Err(Error::CorruptLog(format!(
                    "failure for unknown worker {}",
                    payload.worker
                )));
            };
            worker.status = WorkerStatus::Failed;
            worker.completed_at = Some(record.timestamp);
            worker.error = Some(payload.error.clone());
        }
        SessionEvent::ReportGenerated(payload) => {
            session.report = Some(payload.report.clone());
        }
        SessionEvent::ResearchCompleted(payload) => {
            session.status = SessionStatus::Complete;
            session.completed_at = Some(record.timestamp);
            // The completion event carries the authoritative total,
            // including orchestrator-level calls not tied to any worker.
            session.cost = payload.cost.clone();
        }
        SessionEvent::ResearchFailed(payload) => {
            session.status = SessionStatus::Failed;
            session.completed_at = Some(record.timestamp);
            session.error = Some(payload.error.clone());
        }
        SessionEvent::ResearchCancelled(payload) => {
            session.status = SessionStatus::Cancelled;
            session.completed_at = Some(record.timestamp);
            session.error = Some(format!("cancelled: {}", payload.reason));
        }
    }
    Ok(())
}
