//! Agent behavior against the scripted LLM and canned tools.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use seeker_agents::{AnalysisAgent, PlannerAgent, SearchAgent, SynthesisAgent};
use seeker_testing::{
    CannedSearchProvider, CollectingSink, Scripted, ScriptedChatClient, StaticFetchTool,
    canned_registry, facts_json, gap_ranking_json, gaps_json, hit, outline_json,
    perspectives_json, section_body, think_finalize_json, think_search_json, validations_json,
};
use seeker_types::{
    EventKind, Fact, Mode, Perspective, ProgressPayload, SessionId, ValidationStatus,
};

fn world() -> (
    Arc<ScriptedChatClient>,
    Arc<CollectingSink>,
    Arc<seeker_tools::ToolRegistry>,
    SessionId,
) {
    let session_id = SessionId::new();
    let sink = CollectingSink::new();
    let provider = CannedSearchProvider::new().with_default(vec![
        hit("One", "https://one.example/a", "first snippet"),
        hit("Two", "https://two.example/b", "second snippet"),
    ]);
    let registry = canned_registry(
        session_id,
        sink.clone(),
        provider,
        StaticFetchTool::new().with_page("https://one.example/a", "page body text"),
    );
    (ScriptedChatClient::new().into_arc(), sink, registry, session_id)
}

#[tokio::test]
async fn search_agent_runs_think_act_observe_and_filters_facts() {
    let (client, sink, registry, session_id) = world();

    client.push_text(think_search_json(&["test query one", "test query two"]));
    client.push_text(think_finalize_json("the final answer"));
    client.push_text(facts_json(&[
        ("solid fact", "https://one.example/a", 0.9),
        ("shaky fact", "https://two.example/b", 0.1),
    ]));
    client.push_text(gaps_json(&[]));

    let agent = SearchAgent::new(client.clone(), registry, sink.clone(), session_id);
    let perspective = Perspective::basic_facts("testing");
    let outcome = agent
        .run(2, &perspective, &CancellationToken::new())
        .await
        .unwrap();

    // Low-confidence fact discarded.
    assert_eq!(outcome.facts.len(), 1);
    assert_eq!(outcome.facts[0].content, "solid fact");
    assert_eq!(outcome.answer, "the final answer");
    // Sources recorded from search hits.
    assert!(outcome.sources.iter().any(|s| s == "https://one.example/a"));

    assert_eq!(sink.count_of(EventKind::IterationStarted), 2);
    // Two queries fan out into two tool call/result pairs.
    assert_eq!(sink.count_of(EventKind::ToolCall), 2);
    assert_eq!(sink.count_of(EventKind::ToolResult), 2);

    // Streamed chunks are tagged with the worker number.
    let chunk_workers: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e.payload {
            ProgressPayload::LlmChunk { worker, .. } => Some(worker),
            _ => None,
        })
        .collect();
    assert!(!chunk_workers.is_empty());
    assert!(chunk_workers.iter().all(|w| *w == Some(2)));
}

#[tokio::test]
async fn search_agent_flushes_partial_results_on_cancellation() {
    let (client, sink, registry, session_id) = world();

    // First round completes normally but leaves gaps, so the agent loops;
    // the follow-up think hangs until cancelled.
    client.push_text(think_finalize_json("early answer"));
    client.push_text(facts_json(&[("confirmed early", "https://one.example/a", 0.8)]));
    client.push_text(gaps_json(&["what about costs?", "what about timelines?"]));
    client.push(Scripted::HangUntilCancelled);

    let cancel = CancellationToken::new();
    let agent = SearchAgent::new(client.clone(), registry, sink, session_id);
    let perspective = Perspective::basic_facts("partial");

    let cancel_in = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel_in.cancel();
    });

    let outcome = agent.run(1, &perspective, &cancel).await.unwrap();
    assert_eq!(outcome.facts.len(), 1);
    assert_eq!(outcome.facts[0].content, "confirmed early");
}

#[tokio::test]
async fn planner_prepends_default_perspective_and_builds_deep_dag() {
    let (client, _sink, registry, _session_id) = world();
    client.push_text(perspectives_json(&["Economics", "Engineering"]));

    let planner = PlannerAgent::new(client.clone(), registry);
    let plan = planner
        .plan("fusion power", None, Mode::Deep, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(plan.perspectives[0].name, Perspective::BASIC_FACTS_NAME);
    assert_eq!(plan.perspectives.len(), 3);
    assert_eq!(plan.search_nodes.len(), 3);
    assert!(plan.cross_validate_node.is_some());
}

#[tokio::test]
async fn planner_falls_back_to_template_on_discovery_failure() {
    let (client, _sink, registry, _session_id) = world();
    client.push(Scripted::Malformed);

    let planner = PlannerAgent::new(client, registry);
    let plan = planner
        .plan("obscure topic", None, Mode::Deep, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(plan.perspectives.len(), 3);
    assert_eq!(plan.perspectives[0].name, Perspective::BASIC_FACTS_NAME);
    assert!(plan.perspectives[1].focus.contains("obscure topic"));
}

#[tokio::test]
async fn planner_clamps_perspective_count_to_six() {
    let (client, _sink, registry, _session_id) = world();
    client.push_text(perspectives_json(&[
        "Basic fact writer",
        "P1",
        "P2",
        "P3",
        "P4",
        "P5",
        "P6",
        "P7",
    ]));

    let planner = PlannerAgent::new(client, registry);
    let plan = planner
        .plan("wide topic", None, Mode::Deep, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(plan.perspectives.len(), 6);
}

#[tokio::test]
async fn analysis_agent_produces_sorted_gaps_and_defaults_unmentioned_to_weak() {
    let (client, sink, _registry, session_id) = world();

    // Only fact 0 is mentioned; fact 1 defaults to weak.
    client.push_text(validations_json(&["supported"]));
    client.push_text(seeker_testing::no_contradictions_json());
    client.push_text(gap_ranking_json(&[("minor", 0.2), ("major", 0.9)]));

    let facts = vec![
        Fact::new("a", "https://one.example", 0.9),
        Fact::new("b", "https://two.example", 0.8),
    ];
    let agent = AnalysisAgent::new(client, sink.clone(), session_id);
    let analysis = agent
        .run("topic", &facts, &[], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(analysis.validated_facts[0].status, ValidationStatus::Supported);
    assert_eq!(analysis.validated_facts[1].status, ValidationStatus::Weak);
    // Gaps sorted descending by importance.
    assert_eq!(analysis.gaps[0].description, "major");
    assert!(analysis.source_quality.distinct_hosts >= 2);

    assert!(sink.has(EventKind::AnalysisStarted));
    assert!(sink.has(EventKind::CrossValidationComplete));
    assert!(sink.has(EventKind::AnalysisComplete));
}

#[tokio::test]
async fn synthesis_retries_an_empty_section_with_a_stricter_prompt() {
    let (client, sink, _registry, session_id) = world();

    client.push_text(outline_json("Title", "Summary.", &["A", "B", "C", "D"]));
    client.push_text(""); // section A fails once
    client.push_text(section_body("A"));
    client.push_text(section_body("B"));
    client.push_text(section_body("C"));
    client.push_text(section_body("D"));

    let sources = vec!["https://one.example/a".to_string()];
    let agent = SynthesisAgent::new(client.clone(), sink.clone(), session_id);
    let report = agent
        .run("topic", &[], None, &sources, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.title, "Title");
    assert_eq!(report.citations.len(), 1);
    assert!(report.full_content.contains("## A"));
    assert_eq!(client.remaining(), 0);

    // The retried call carries the tightened instruction.
    let calls = client.calls();
    let retried_prompt = &calls[2][0].content;
    assert!(retried_prompt.contains("IMPORTANT"));
    assert!(sink.has(EventKind::SynthesisComplete));
}
