//! End-to-end orchestrator runs against the scripted LLM and canned tools.
//!
//! `max_concurrency` is pinned to 1 so the scripted response queue lines up
//! with the call order deterministically.

use std::sync::Arc;
use std::time::Duration;

use seeker_engine::SessionStore;
use seeker_llm::Pricing;
use seeker_runtime::{CostTracker, EventBus, Orchestrator, RuntimeConfig};
use seeker_testing::{
    CannedSearchProvider, ScriptedChatClient, Scripted, StaticFetchTool, canned_registry,
    facts_json, gap_ranking_json, gaps_json, hit, no_contradictions_json, outline_json,
    perspectives_json, section_body, think_finalize_json, validations_json,
};
use seeker_types::{
    EventKind, EventSink, Mode, ProgressPayload, SessionId, SessionStatus, TaskKind,
};

struct World {
    config: RuntimeConfig,
    client: Arc<ScriptedChatClient>,
    store: Arc<SessionStore>,
    bus: Arc<EventBus>,
    session_id: SessionId,
    _tmp: tempfile::TempDir,
}

impl World {
    fn new(mode: Mode) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let config = RuntimeConfig {
            mode,
            max_concurrency: 1,
            state_dir: tmp.path().to_path_buf(),
            scheduler_backoff: Duration::from_millis(5),
            ..RuntimeConfig::default()
        };
        Self {
            config,
            client: ScriptedChatClient::new().into_arc(),
            store: Arc::new(SessionStore::open(tmp.path()).unwrap()),
            bus: Arc::new(EventBus::new()),
            session_id: SessionId::new(),
            _tmp: tmp,
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        let sink: Arc<dyn EventSink> = self.bus.clone();
        let tracker = CostTracker::new(self.session_id, Pricing::default(), sink.clone());
        let provider = CannedSearchProvider::new().with_default(vec![
            hit("Paris", "https://en.wikipedia.org/wiki/Paris", "Paris is the capital of France"),
            hit("France", "https://britannica.com/place/France", "Country in Europe"),
        ]);
        let registry = canned_registry(self.session_id, sink, provider, StaticFetchTool::new());
        Orchestrator::new(
            self.config.clone(),
            self.session_id,
            self.client.clone(),
            registry,
            self.store.clone(),
            self.bus.clone(),
            tracker,
        )
    }

    /// Script one full search worker: finalize, facts, no gaps.
    fn script_search_worker(&self, answer: &str, fact: (&str, &str, f64)) {
        self.client.push_text(think_finalize_json(answer));
        self.client.push_text(facts_json(&[fact]));
        self.client.push_text(gaps_json(&[]));
    }

    fn script_synthesis(&self, title: &str, headings: &[&str]) {
        self.client
            .push_text(outline_json(title, "Short abstract.", headings));
        for heading in headings {
            self.client.push_text(section_body(heading));
        }
    }
}

#[tokio::test]
async fn simple_factual_query_produces_report_with_answer() {
    let world = World::new(Mode::Fast);

    // Fast mode: no planner LLM call; one search worker; no analysis.
    world.script_search_worker(
        "Paris is the capital of France",
        (
            "Paris is the capital of France",
            "https://en.wikipedia.org/wiki/Paris",
            0.98,
        ),
    );
    world.script_synthesis(
        "The Capital of France",
        &["Overview", "History", "Geography", "Government"],
    );

    let mut stream = world.bus.subscribe_all();
    let orchestrator = world.orchestrator();
    let summary = orchestrator.run("What is the capital of France?").await.unwrap();

    assert_eq!(summary.status, SessionStatus::Complete);
    let report = summary.report.expect("report present");
    assert!(report.full_content.contains("Paris") || report.title.contains("France"));

    // The search agent itself used at most 3 LLM calls.
    // Call layout: 3 search + 1 outline + 4 sections.
    assert_eq!(world.client.call_count(), 8);
    assert_eq!(world.client.remaining(), 0);

    // ReportGenerated observed on the bus with the answer in the body.
    world.bus.close();
    let mut saw_report = false;
    while let Some(event) = stream.recv().await {
        if let ProgressPayload::ReportGenerated { report } = &event.payload {
            saw_report = true;
            assert!(report.full_content.contains("Paris"));
        }
    }
    assert!(saw_report);

    // The durable log folds to the same terminal state.
    let session = world.store.load(world.session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert!(session.report.is_some());
}

#[tokio::test]
async fn deep_query_builds_full_dag_and_multi_section_report() {
    let world = World::new(Mode::Deep);

    world.client.push_text(perspectives_json(&[
        "Basic fact writer",
        "Safety and regulators",
        "Industry deployment",
    ]));
    world.script_search_worker(
        "AVs are expanding",
        ("Waymo operates robotaxis", "https://waymo.com", 0.9),
    );
    world.script_search_worker(
        "Regulation varies by state",
        ("NHTSA oversees AV safety", "https://nhtsa.gov", 0.9),
    );
    world.script_search_worker(
        "Deployment is uneven",
        ("Cruise paused operations", "https://getcruise.com", 0.8),
    );
    // Analysis: validations, contradictions, low-importance gaps only.
    world
        .client
        .push_text(validations_json(&["supported", "weak", "supported"]));
    world.client.push_text(no_contradictions_json());
    world
        .client
        .push_text(gap_ranking_json(&[("minor detail", 0.2)]));
    world.script_synthesis(
        "Autonomous Vehicles in 2025",
        &["State of the Industry", "Safety", "Regulation", "Outlook"],
    );

    let mut stream = world.bus.subscribe_all();
    let orchestrator = world.orchestrator();
    let summary = orchestrator
        .run("State of autonomous vehicles in 2025")
        .await
        .unwrap();

    assert_eq!(summary.status, SessionStatus::Complete);
    let report = summary.report.unwrap();
    let headings = report
        .full_content
        .matches("\n## ")
        .count()
        + usize::from(report.full_content.starts_with("## "));
    assert!(headings >= 4, "expected >=4 section headings:\n{}", report.full_content);

    world.bus.close();
    let mut plan_checked = false;
    while let Some(event) = stream.recv().await {
        if let ProgressPayload::PlanCreated { perspectives, nodes, .. } = &event.payload {
            plan_checked = true;
            assert!(perspectives.len() >= 3);
            assert!(
                perspectives
                    .iter()
                    .any(|p| p.name.to_lowercase().contains("safety")
                        || p.name.to_lowercase().contains("regulator"))
            );
            let count = |kind: TaskKind| nodes.iter().filter(|n| n.kind == kind).count();
            assert_eq!(count(TaskKind::Root), 1);
            assert_eq!(count(TaskKind::Search), 3);
            assert_eq!(count(TaskKind::CrossValidate), 1);
            assert_eq!(count(TaskKind::FillGaps), 1);
            assert_eq!(count(TaskKind::Synthesize), 1);
        }
    }
    assert!(plan_checked);
}

#[tokio::test]
async fn cancellation_mid_search_emits_cancelled_and_no_report() {
    let world = World::new(Mode::Fast);
    world.client.push(Scripted::HangUntilCancelled);

    let mut stream = world.bus.subscribe_all();
    let orchestrator = Arc::new(world.orchestrator());

    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run("doomed query").await })
    };

    // Cancel right after the first worker starts.
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match stream.recv().await {
                Some(event) if event.kind() == EventKind::WorkerStarted => break,
                Some(_) => continue,
                None => panic!("bus closed early"),
            }
        }
    })
    .await;
    assert!(waited.is_ok(), "never saw WorkerStarted");
    orchestrator.cancel_with(seeker_types::CancelReason::UserInterrupt);

    // Cancellation must take effect promptly.
    let summary = tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("cancellation took too long")
        .unwrap()
        .unwrap();
    assert_eq!(summary.status, SessionStatus::Cancelled);
    assert_eq!(
        summary.cancel_reason,
        Some(seeker_types::CancelReason::UserInterrupt)
    );
    assert!(summary.report.is_none());

    world.bus.close();
    let mut saw_cancelled = false;
    while let Some(event) = stream.recv().await {
        match &event.payload {
            ProgressPayload::ResearchCancelled { reason } => {
                saw_cancelled = true;
                assert_eq!(*reason, seeker_types::CancelReason::UserInterrupt);
            }
            ProgressPayload::ReportGenerated { .. } => panic!("report after cancellation"),
            _ => {}
        }
    }
    assert!(saw_cancelled);

    let session = world.store.load(world.session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
}

#[tokio::test]
async fn all_search_workers_failing_fails_the_research() {
    let world = World::new(Mode::Fast);
    // Initial attempt + two retries, all fatally malformed.
    for _ in 0..3 {
        world.client.push(Scripted::Malformed);
    }

    let mut stream = world.bus.subscribe_all();
    let orchestrator = world.orchestrator();
    let err = orchestrator.run("impossible").await.unwrap_err();
    assert!(matches!(err, seeker_runtime::Error::NoSearchSucceeded));

    world.bus.close();
    let mut saw_failed = false;
    while let Some(event) = stream.recv().await {
        match &event.payload {
            ProgressPayload::ResearchFailed { error_kind, .. } => {
                saw_failed = true;
                assert_eq!(error_kind, "resource_exhausted");
            }
            ProgressPayload::ReportGenerated { .. } => panic!("report despite total failure"),
            _ => {}
        }
    }
    assert!(saw_failed);

    let session = world.store.load(world.session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.report.is_none());
}

#[tokio::test]
async fn gap_filling_runs_for_important_gaps() {
    let world = World::new(Mode::Deep);

    world
        .client
        .push_text(perspectives_json(&["Basic fact writer"]));
    // Two facts so the contradiction pass actually runs.
    world.client.push_text(think_finalize_json("initial answer"));
    world.client.push_text(facts_json(&[
        ("fact one", "https://one.example", 0.9),
        ("fact two", "https://one.example", 0.8),
    ]));
    world.client.push_text(gaps_json(&[]));
    world
        .client
        .push_text(validations_json(&["supported", "weak"]));
    world.client.push_text(no_contradictions_json());
    // One qualifying gap (importance >= 0.5) triggers one gap-fill search.
    world
        .client
        .push_text(gap_ranking_json(&[("missing cost data", 0.9)]));
    world.script_search_worker(
        "cost data found",
        ("costs fell 40%", "https://two.example", 0.85),
    );
    world.script_synthesis(
        "Report",
        &["Background", "Findings", "Costs", "Conclusion"],
    );

    let mut stream = world.bus.subscribe_all();
    let orchestrator = world.orchestrator();
    let summary = orchestrator.run("topic with gaps").await.unwrap();
    assert_eq!(summary.status, SessionStatus::Complete);

    world.bus.close();
    let mut started = 0;
    let mut completed = None;
    while let Some(event) = stream.recv().await {
        match &event.payload {
            ProgressPayload::GapFillingStarted { gap_count } => started = *gap_count,
            ProgressPayload::GapFillingComplete { new_facts } => completed = Some(*new_facts),
            _ => {}
        }
    }
    assert_eq!(started, 1);
    assert_eq!(completed, Some(1));

    // The gap-fill search ran as its own numbered worker.
    let session = world.store.load(world.session_id).unwrap();
    assert!(
        session
            .workers
            .iter()
            .any(|w| w.objective.starts_with("gap-filler-")),
        "workers: {:?}",
        session.workers.iter().map(|w| &w.objective).collect::<Vec<_>>()
    );
    // Gap-fill facts reached the final pool.
    assert!(session.sources.iter().any(|s| s == "https://two.example"));
}

#[tokio::test]
async fn empty_search_results_still_complete_the_iteration() {
    let world = World::new(Mode::Fast);
    // Think chooses a search; the canned provider returns nothing for it.
    world.client.push_text(seeker_testing::think_search_json(&["no results query"]));
    world.client.push_text(think_finalize_json("nothing found"));
    world.client.push_text(facts_json(&[]));
    world.client.push_text(gaps_json(&[]));
    world.script_synthesis("Empty", &["A", "B", "C", "D"]);

    // Custom orchestrator whose search provider has no results at all.
    let sink: Arc<dyn EventSink> = world.bus.clone();
    let tracker = CostTracker::new(world.session_id, Pricing::default(), sink.clone());
    let registry = canned_registry(
        world.session_id,
        sink,
        CannedSearchProvider::new(),
        StaticFetchTool::new(),
    );
    let orchestrator = Orchestrator::new(
        world.config.clone(),
        world.session_id,
        world.client.clone(),
        registry,
        world.store.clone(),
        world.bus.clone(),
        tracker,
    );

    let summary = orchestrator.run("obscure").await.unwrap();
    assert_eq!(summary.status, SessionStatus::Complete);

    let session = world.store.load(world.session_id).unwrap();
    let search_worker = &session.workers[0];
    assert_eq!(search_worker.facts.len(), 0);
}
