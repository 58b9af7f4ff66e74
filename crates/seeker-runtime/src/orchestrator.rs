use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use seeker_agents::{
    AnalysisAgent, PlannerAgent, ResearchPlan, SearchAgent, SynthesisAgent, prompts,
};
use seeker_engine::{ContextManager, FoldingDirective, SessionStore, TaskDag, heuristic_counter};
use seeker_llm::{ChatClient, ChatMessage, ChatOptions};
use seeker_tools::ToolRegistry;
use seeker_types::{
    AnalysisResult, CancelReason, Cost, EventSink, Fact, GapFillOutcome, NodeId, Perspective,
    PlanCreatedPayload, ProgressPayload, Report, ReportGeneratedPayload, ResearchCancelledPayload,
    ResearchCompletedPayload, ResearchEvent, ResearchFailedPayload, ResearchStartedPayload,
    SessionEvent, SessionId, SessionStatus, TaskKind, TaskResult, TaskStatus,
    WorkerCompletedPayload, WorkerFailedPayload, WorkerStartedPayload,
};

use crate::{CostTracker, Error, EventBus, ReportSink, Result, RuntimeConfig};

/// Final accounting of one research run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub report: Option<Report>,
    pub cost: Cost,
    pub duration_ms: i64,
    pub source_count: usize,
    /// Present only when the run ended by cancellation.
    pub cancel_reason: Option<CancelReason>,
}

/// Everything a spawned task needs; cheap clones of shared handles.
#[derive(Clone)]
struct TaskContext {
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
    sink: Arc<dyn EventSink>,
    session_id: SessionId,
    config: RuntimeConfig,
    dag: Arc<TaskDag>,
    topic: String,
    perspectives: Arc<Vec<Perspective>>,
    search_nodes: Arc<Vec<(NodeId, usize)>>,
    worker_seq: Arc<AtomicU32>,
    updates: mpsc::UnboundedSender<SessionEvent>,
    cost: Arc<CostTracker>,
}

/// Drives one research session end to end: plan → schedule → analyze →
/// gap-fill → synthesize, with bounded parallelism, retries, downgrade and
/// cancellation.
///
/// The orchestrator exclusively owns the session while running; worker
/// tasks send domain events through a channel and only the orchestrator
/// loop appends to the store.
pub struct Orchestrator {
    config: RuntimeConfig,
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
    store: Arc<SessionStore>,
    bus: Arc<EventBus>,
    cost: Arc<CostTracker>,
    report_sink: Option<Arc<dyn ReportSink>>,
    session_id: SessionId,
    cancel: CancellationToken,
    cancel_reason: Mutex<Option<CancelReason>>,
    worker_seq: Arc<AtomicU32>,
    phase: Mutex<&'static str>,
}

impl Orchestrator {
    pub fn new(
        config: RuntimeConfig,
        session_id: SessionId,
        client: Arc<dyn ChatClient>,
        registry: Arc<ToolRegistry>,
        store: Arc<SessionStore>,
        bus: Arc<EventBus>,
        cost: Arc<CostTracker>,
    ) -> Self {
        Self {
            config,
            client,
            registry,
            store,
            bus,
            cost,
            report_sink: None,
            session_id,
            cancel: CancellationToken::new(),
            cancel_reason: Mutex::new(None),
            worker_seq: Arc::new(AtomicU32::new(0)),
            phase: Mutex::new("planning"),
        }
    }

    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = Some(sink);
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Token observed by every agent, tool call and sleep.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation with a reason; the first reason wins.
    pub fn cancel_with(&self, reason: CancelReason) {
        self.cancel_reason
            .lock()
            .expect("reason lock poisoned")
            .get_or_insert(reason);
        self.cancel.cancel();
    }

    fn cancel_reason(&self) -> CancelReason {
        self.cancel_reason
            .lock()
            .expect("reason lock poisoned")
            .unwrap_or(CancelReason::Unknown)
    }

    fn set_phase(&self, phase: &'static str) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    fn current_phase(&self) -> &'static str {
        *self.phase.lock().expect("phase lock poisoned")
    }

    fn emit(&self, payload: ProgressPayload) {
        self.bus
            .publish(ResearchEvent::new(self.session_id, payload));
    }

    fn append(&self, version: &mut u64, event: SessionEvent) -> Result<()> {
        *version = self.store.append(self.session_id, vec![event], *version)?;
        Ok(())
    }

    /// Run the full pipeline for `query`.
    pub async fn run(&self, query: &str) -> Result<RunSummary> {
        let started_at = Utc::now();
        let mut version = 0u64;
        self.append(
            &mut version,
            SessionEvent::ResearchStarted(ResearchStartedPayload {
                query: query.to_string(),
            }),
        )?;
        self.emit(ProgressPayload::ResearchStarted {
            query: query.to_string(),
        });

        let outcome = self.drive(query, &mut version).await;
        let duration_ms = (Utc::now() - started_at).num_milliseconds();
        let cost = self.cost.total();

        match outcome {
            Ok(report) => {
                let source_count = self
                    .store
                    .load(self.session_id)
                    .map(|s| s.sources.len())
                    .unwrap_or(0);
                self.append(
                    &mut version,
                    SessionEvent::ResearchCompleted(ResearchCompletedPayload {
                        duration_ms,
                        source_count,
                        cost: cost.clone(),
                    }),
                )?;
                self.emit(ProgressPayload::ResearchCompleted {
                    duration_ms,
                    source_count,
                    cost: cost.clone(),
                });
                Ok(RunSummary {
                    session_id: self.session_id,
                    status: SessionStatus::Complete,
                    report: Some(report),
                    cost,
                    duration_ms,
                    source_count,
                    cancel_reason: None,
                })
            }
            Err(err) if err.is_cancelled() || self.cancel.is_cancelled() => {
                let reason = self.cancel_reason();
                self.append(
                    &mut version,
                    SessionEvent::ResearchCancelled(ResearchCancelledPayload { reason }),
                )?;
                self.emit(ProgressPayload::ResearchCancelled { reason });
                Ok(RunSummary {
                    session_id: self.session_id,
                    status: SessionStatus::Cancelled,
                    report: None,
                    cost,
                    duration_ms,
                    source_count: 0,
                    cancel_reason: Some(reason),
                })
            }
            Err(err) => {
                self.append(
                    &mut version,
                    SessionEvent::ResearchFailed(ResearchFailedPayload {
                        error: err.to_string(),
                    }),
                )?;
                self.emit(ProgressPayload::ResearchFailed {
                    error_kind: err.kind_tag().to_string(),
                    message: err.to_string(),
                    failed_phase: self.current_phase().to_string(),
                });
                Err(err)
            }
        }
    }

    async fn drive(&self, query: &str, version: &mut u64) -> Result<Report> {
        self.set_phase("planning");
        let planner = PlannerAgent::new(self.client.clone(), self.registry.clone());
        let plan = planner
            .plan(query, None, self.config.mode, &self.cancel)
            .await?;
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(self.cancel_reason()));
        }

        self.append(
            version,
            SessionEvent::PlanCreated(PlanCreatedPayload {
                topic: plan.topic.clone(),
                perspectives: plan.perspectives.clone(),
                nodes: plan.dag.plan_nodes(),
            }),
        )?;
        self.emit(ProgressPayload::PlanCreated {
            topic: plan.topic.clone(),
            perspectives: plan.perspectives.clone(),
            nodes: plan.dag.plan_nodes(),
        });

        self.set_phase("scheduling");
        self.schedule(plan, version).await
    }

    /// The scheduling loop: dispatch ready tasks into a bounded pool,
    /// fold context when projected usage crosses the threshold, retry
    /// transient failures, downgrade the plan on permanent ones.
    async fn schedule(&self, plan: ResearchPlan, version: &mut u64) -> Result<Report> {
        let ResearchPlan {
            topic,
            perspectives,
            dag,
            search_nodes,
            synthesize_node,
            ..
        } = plan;
        let dag = Arc::new(dag.with_max_retries(self.config.max_retries));
        let perspectives = Arc::new(perspectives);
        let search_nodes = Arc::new(search_nodes);

        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel::<SessionEvent>();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut join_set: JoinSet<(NodeId, TaskKind, u32, Result<TaskResult>)> = JoinSet::new();
        let mut context = ContextManager::new(heuristic_counter())
            .with_budget(self.config.context_budget)
            .with_trigger_ratio(self.config.fold_trigger_ratio);

        let deadline = tokio::time::Instant::now() + self.config.session_timeout;

        loop {
            while let Ok(event) = updates_rx.try_recv() {
                self.append(version, event)?;
            }
            if self.cancel.is_cancelled() {
                break;
            }
            if dag.all_complete() && join_set.is_empty() {
                break;
            }

            self.maybe_fold(&mut context).await?;

            // Dispatch whatever is ready, bounded by the pool.
            for node in dag.ready_tasks() {
                if node.kind == TaskKind::Root {
                    dag.set_result(node.id, TaskResult::Empty)
                        .map_err(Error::Engine)?;
                    continue;
                }
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    break;
                };

                let worker = self.worker_seq.fetch_add(1, Ordering::SeqCst) + 1;
                dag.mark_running(node.id, worker).map_err(Error::Engine)?;
                self.append(
                    version,
                    SessionEvent::WorkerStarted(WorkerStartedPayload {
                        worker,
                        objective: node.description.clone(),
                    }),
                )?;
                self.emit(ProgressPayload::WorkerStarted {
                    worker,
                    objective: node.description.clone(),
                });

                let ctx = TaskContext {
                    client: self.client.clone(),
                    registry: self.registry.clone(),
                    sink: self.bus.clone(),
                    session_id: self.session_id,
                    config: self.config.clone(),
                    dag: dag.clone(),
                    topic: topic.clone(),
                    perspectives: perspectives.clone(),
                    search_nodes: search_nodes.clone(),
                    worker_seq: self.worker_seq.clone(),
                    updates: updates_tx.clone(),
                    cost: self.cost.clone(),
                };
                let child = self.cancel.child_token();
                let worker_timeout = self.config.worker_timeout;
                let retry_delay = retry_backoff(node.retries);

                join_set.spawn(async move {
                    let _permit = permit;
                    if !retry_delay.is_zero() {
                        tokio::select! {
                            _ = child.cancelled() => {}
                            _ = tokio::time::sleep(retry_delay) => {}
                        }
                    }
                    let kind = node.kind;
                    let id = node.id;
                    let result =
                        match tokio::time::timeout(worker_timeout, run_task(ctx, node, worker, &child))
                            .await
                        {
                            Ok(result) => result,
                            Err(_elapsed) => {
                                child.cancel();
                                Err(Error::WorkerTimeout)
                            }
                        };
                    (id, kind, worker, result)
                });
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                    let (node_id, kind, worker, result) =
                        joined.map_err(|e| Error::SynthesisFailed(format!("task panicked: {e}")))?;
                    self.handle_completion(
                        &dag, node_id, kind, worker, result, version, &mut context,
                    )?;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.cancel_with(CancelReason::Timeout);
                }
                _ = tokio::time::sleep(self.config.scheduler_backoff) => {}
            }
        }

        // Wind down in-flight work before deciding the outcome.
        join_set.abort_all();
        while join_set.join_next().await.is_some() {}
        while let Ok(event) = updates_rx.try_recv() {
            self.append(version, event)?;
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(self.cancel_reason()));
        }

        let any_search_completed = dag
            .nodes_of_kind(TaskKind::Search)
            .iter()
            .any(|n| n.status == TaskStatus::Complete);
        if !any_search_completed {
            self.set_phase("scheduling");
            return Err(Error::NoSearchSucceeded);
        }

        match dag.node(synthesize_node).and_then(|n| n.result) {
            Some(TaskResult::Report(report)) => {
                self.append(
                    version,
                    SessionEvent::ReportGenerated(ReportGeneratedPayload {
                        report: report.clone(),
                    }),
                )?;
                self.emit(ProgressPayload::ReportGenerated {
                    report: report.clone(),
                });
                if let Some(sink) = &self.report_sink {
                    if let Err(err) = sink.write_report(self.session_id, &report) {
                        tracing::warn!(error = %err, "report sink failed");
                    }
                }
                Ok(report)
            }
            _ => {
                self.set_phase("synthesis");
                let reason = dag
                    .node(synthesize_node)
                    .and_then(|n| n.error)
                    .unwrap_or_else(|| "synthesize node did not complete".to_string());
                Err(Error::SynthesisFailed(reason))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_completion(
        &self,
        dag: &Arc<TaskDag>,
        node_id: NodeId,
        kind: TaskKind,
        worker: u32,
        result: Result<TaskResult>,
        version: &mut u64,
        context: &mut ContextManager,
    ) -> Result<()> {
        match result {
            Ok(task_result) => {
                let (output, sources, facts, cost_prefix) = completion_payload(&task_result, worker);
                let cost = self.cost.cost_for_prefix(&cost_prefix);
                self.append(
                    version,
                    SessionEvent::WorkerCompleted(WorkerCompletedPayload {
                        worker,
                        output: output.clone(),
                        sources: sources.clone(),
                        facts: facts.clone(),
                        cost,
                    }),
                )?;
                self.emit(ProgressPayload::WorkerCompleted {
                    worker,
                    fact_count: facts.len(),
                    source_count: sources.len(),
                });
                context.observe(format!("worker-{worker}"), output);
                dag.set_result(node_id, task_result).map_err(Error::Engine)?;
                Ok(())
            }
            Err(err) if err.is_cancelled() => {
                // The main loop notices the token on its next pass.
                dag.fail(node_id, "cancelled").map_err(Error::Engine)?;
                Ok(())
            }
            Err(err) => {
                match dag.retry(node_id) {
                    Ok(attempt) => {
                        tracing::debug!(node = %node_id, attempt, error = %err, "retrying task");
                        self.emit(ProgressPayload::WorkerProgress {
                            worker,
                            message: format!("retry {attempt} after: {err}"),
                        });
                        Ok(())
                    }
                    Err(_) => {
                        self.append(
                            version,
                            SessionEvent::WorkerFailed(WorkerFailedPayload {
                                worker,
                                error: err.to_string(),
                            }),
                        )?;
                        self.emit(ProgressPayload::WorkerFailed {
                            worker,
                            error: err.to_string(),
                        });
                        dag.fail(node_id, err.to_string()).map_err(Error::Engine)?;
                        self.downgrade(dag, node_id, kind);
                        Ok(())
                    }
                }
            }
        }
    }

    /// The plan downgrades rather than crashes: missing perspectives are
    /// tolerated while at least one search branch can still deliver.
    fn downgrade(&self, dag: &Arc<TaskDag>, failed: NodeId, kind: TaskKind) {
        match kind {
            TaskKind::Search => {
                let any_viable = dag
                    .nodes_of_kind(TaskKind::Search)
                    .iter()
                    .any(|n| n.status != TaskStatus::Failed);
                if any_viable {
                    let _ = dag.release_dependents(failed);
                } else {
                    // Nothing left to synthesize from; fail the rest of
                    // the plan so the loop can terminate.
                    for node in dag.nodes() {
                        if !matches!(node.status, TaskStatus::Complete | TaskStatus::Failed) {
                            let _ = dag.fail(node.id, "no search branch succeeded");
                        }
                    }
                }
            }
            // Analysis and gap-filling are optional phases; downstream
            // nodes proceed without their results.
            TaskKind::CrossValidate | TaskKind::FillGaps => {
                let _ = dag.release_dependents(failed);
            }
            TaskKind::Synthesize | TaskKind::Root => {}
        }
    }

    /// Ask for a folding directive when projected usage crosses the
    /// threshold; fall back deterministically on invalid output.
    async fn maybe_fold(&self, context: &mut ContextManager) -> Result<()> {
        let projected = context.usage();
        if !context.should_fold(projected) {
            return Ok(());
        }

        let levels: Vec<String> = context
            .snapshot()
            .summaries
            .iter()
            .map(|s| format!("L{}", s.level))
            .collect();
        let prompt = prompts::folding_decision(
            projected,
            context.budget(),
            context.working_len(),
            &levels.join(","),
        );
        let options = ChatOptions::scoped("context/folding").with_max_tokens(100);

        let directive = match self
            .client
            .chat(&[ChatMessage::user(prompt)], &options, &self.cancel)
            .await
        {
            Ok(response) => FoldingDirective::parse(&response.message.content)
                .unwrap_or_else(|| context.fallback_directive(projected)),
            Err(seeker_llm::Error::Cancelled) => return Ok(()),
            Err(err) => {
                tracing::debug!(error = %err, "folding decision failed, using fallback");
                context.fallback_directive(projected)
            }
        };

        context.apply(directive).map_err(Error::Engine)
    }
}

fn retry_backoff(retries: u32) -> Duration {
    if retries == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(500).saturating_mul(2u32.saturating_pow(retries - 1))
    }
}

/// Worker payload pieces for the `WorkerCompleted` domain event.
fn completion_payload(result: &TaskResult, worker: u32) -> (String, Vec<String>, Vec<Fact>, String) {
    match result {
        TaskResult::Search(outcome) => (
            outcome.answer.clone(),
            outcome.sources.clone(),
            outcome.facts.clone(),
            format!("search/{worker}/"),
        ),
        TaskResult::Analysis(analysis) => (
            format!(
                "validated {} facts, {} contradictions, {} gaps",
                analysis.validated_facts.len(),
                analysis.contradictions.len(),
                analysis.gaps.len()
            ),
            Vec::new(),
            Vec::new(),
            "analysis/".to_string(),
        ),
        TaskResult::GapFill(outcome) => (
            format!(
                "filled {} gaps with {} new facts",
                outcome.gaps_filled,
                outcome.new_facts.len()
            ),
            outcome.sources.clone(),
            outcome.new_facts.clone(),
            "gapfill/".to_string(),
        ),
        TaskResult::Report(report) => (
            report.title.clone(),
            Vec::new(),
            Vec::new(),
            "synthesis/".to_string(),
        ),
        TaskResult::Empty => (String::new(), Vec::new(), Vec::new(), String::new()),
    }
}

/// Execute one task node. Runs on the worker pool.
async fn run_task(
    ctx: TaskContext,
    node: seeker_engine::TaskNode,
    worker: u32,
    cancel: &CancellationToken,
) -> Result<TaskResult> {
    match node.kind {
        TaskKind::Root => Ok(TaskResult::Empty),
        TaskKind::Search => run_search(&ctx, &node, worker, cancel).await,
        TaskKind::CrossValidate => run_analysis(&ctx, cancel).await,
        TaskKind::FillGaps => run_gap_fill(&ctx, cancel).await,
        TaskKind::Synthesize => run_synthesis(&ctx, cancel).await,
    }
}

async fn run_search(
    ctx: &TaskContext,
    node: &seeker_engine::TaskNode,
    worker: u32,
    cancel: &CancellationToken,
) -> Result<TaskResult> {
    let perspective = ctx
        .search_nodes
        .iter()
        .find(|(id, _)| *id == node.id)
        .and_then(|(_, index)| ctx.perspectives.get(*index))
        .cloned()
        .unwrap_or_else(|| Perspective::basic_facts(&ctx.topic));

    let agent = SearchAgent::new(
        ctx.client.clone(),
        ctx.registry.clone(),
        ctx.sink.clone(),
        ctx.session_id,
    );
    let outcome = agent.run(worker, &perspective, cancel).await?;
    Ok(TaskResult::Search(outcome))
}

/// Union of facts and gap questions across all completed search branches,
/// in node-id order.
fn completed_search_pool(dag: &TaskDag) -> (Vec<Fact>, Vec<String>, Vec<String>) {
    let mut facts: Vec<Fact> = Vec::new();
    let mut gaps = Vec::new();
    let mut sources: Vec<String> = Vec::new();
    for node in dag.nodes_of_kind(TaskKind::Search) {
        let Some(TaskResult::Search(outcome)) = node.result else {
            continue;
        };
        for fact in outcome.facts {
            if !facts.iter().any(|f| f.content == fact.content) {
                facts.push(fact);
            }
        }
        for source in outcome.sources {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        gaps.extend(outcome.gaps);
    }
    (facts, sources, gaps)
}

async fn run_analysis(ctx: &TaskContext, cancel: &CancellationToken) -> Result<TaskResult> {
    let (facts, _sources, gaps) = completed_search_pool(&ctx.dag);
    let agent = AnalysisAgent::new(ctx.client.clone(), ctx.sink.clone(), ctx.session_id);
    let analysis = agent.run(&ctx.topic, &facts, &gaps, cancel).await?;
    Ok(TaskResult::Analysis(analysis))
}

fn stored_analysis(dag: &TaskDag) -> Option<AnalysisResult> {
    dag.nodes_of_kind(TaskKind::CrossValidate)
        .into_iter()
        .find_map(|n| match n.result {
            Some(TaskResult::Analysis(analysis)) => Some(analysis),
            _ => None,
        })
}

/// The gap-filling sub-phase: one synthetic perspective per qualifying
/// gap, each handed to a fresh search agent with its own worker number.
async fn run_gap_fill(ctx: &TaskContext, cancel: &CancellationToken) -> Result<TaskResult> {
    let Some(analysis) = stored_analysis(&ctx.dag) else {
        return Ok(TaskResult::GapFill(GapFillOutcome::default()));
    };

    let qualifying: Vec<_> = analysis
        .gaps
        .iter()
        .filter(|g| g.importance >= ctx.config.gap_importance_threshold)
        .take(ctx.config.gap_fill_limit)
        .cloned()
        .collect();
    if qualifying.is_empty() {
        return Ok(TaskResult::GapFill(GapFillOutcome::default()));
    }

    let emit = |payload| ctx.sink.emit(ResearchEvent::new(ctx.session_id, payload));
    emit(ProgressPayload::GapFillingStarted {
        gap_count: qualifying.len(),
    });

    let mut outcome = GapFillOutcome::default();
    for (index, gap) in qualifying.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        emit(ProgressPayload::GapFillingProgress {
            gap_index: index,
            description: gap.description.clone(),
        });

        let perspective = Perspective {
            name: format!("gap-filler-{index}"),
            focus: gap.description.clone(),
            questions: if gap.suggested_queries.is_empty() {
                vec![gap.description.clone()]
            } else {
                gap.suggested_queries.clone()
            },
        };

        let worker = ctx.worker_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = ctx.updates.send(SessionEvent::WorkerStarted(WorkerStartedPayload {
            worker,
            objective: perspective.name.clone(),
        }));
        emit(ProgressPayload::WorkerStarted {
            worker,
            objective: perspective.name.clone(),
        });

        let agent = SearchAgent::new(
            ctx.client.clone(),
            ctx.registry.clone(),
            ctx.sink.clone(),
            ctx.session_id,
        );
        match agent.run(worker, &perspective, cancel).await {
            Ok(search) => {
                let cost = ctx.cost.cost_for_prefix(&format!("search/{worker}/"));
                let _ = ctx
                    .updates
                    .send(SessionEvent::WorkerCompleted(WorkerCompletedPayload {
                        worker,
                        output: search.answer.clone(),
                        sources: search.sources.clone(),
                        facts: search.facts.clone(),
                        cost,
                    }));
                emit(ProgressPayload::WorkerCompleted {
                    worker,
                    fact_count: search.facts.len(),
                    source_count: search.sources.len(),
                });
                outcome.gaps_filled += 1;
                for fact in search.facts {
                    if !outcome.new_facts.iter().any(|f| f.content == fact.content) {
                        outcome.new_facts.push(fact);
                    }
                }
                for source in search.sources {
                    if !outcome.sources.contains(&source) {
                        outcome.sources.push(source);
                    }
                }
            }
            Err(err) => {
                let _ = ctx
                    .updates
                    .send(SessionEvent::WorkerFailed(WorkerFailedPayload {
                        worker,
                        error: err.to_string(),
                    }));
                emit(ProgressPayload::WorkerFailed {
                    worker,
                    error: err.to_string(),
                });
                if err.is_cancelled() {
                    break;
                }
            }
        }
    }

    emit(ProgressPayload::GapFillingComplete {
        new_facts: outcome.new_facts.len(),
    });
    Ok(TaskResult::GapFill(outcome))
}

async fn run_synthesis(ctx: &TaskContext, cancel: &CancellationToken) -> Result<TaskResult> {
    let (mut facts, mut sources, _gaps) = completed_search_pool(&ctx.dag);
    let analysis = stored_analysis(&ctx.dag);

    // Fold in gap-fill results.
    for node in ctx.dag.nodes_of_kind(TaskKind::FillGaps) {
        if let Some(TaskResult::GapFill(outcome)) = node.result {
            for fact in outcome.new_facts {
                if !facts.iter().any(|f| f.content == fact.content) {
                    facts.push(fact);
                }
            }
            for source in outcome.sources {
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }
    }

    let agent = SynthesisAgent::new(ctx.client.clone(), ctx.sink.clone(), ctx.session_id);
    let report = agent
        .run(&ctx.topic, &facts, analysis.as_ref(), &sources, cancel)
        .await?;
    Ok(TaskResult::Report(report))
}
