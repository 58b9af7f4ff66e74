use seeker_types::{ProgressPayload, ResearchEvent};

/// One human-readable progress line per event, or `None` for events that
/// stay silent at the current verbosity.
pub fn line(event: &ResearchEvent, verbose: bool) -> Option<String> {
    match &event.payload {
        ProgressPayload::ResearchStarted { query } => Some(format!("research started: {query}")),
        ProgressPayload::PlanCreated { perspectives, .. } => {
            let names: Vec<&str> = perspectives.iter().map(|p| p.name.as_str()).collect();
            Some(format!("plan: {} perspectives ({})", names.len(), names.join(", ")))
        }
        ProgressPayload::WorkerStarted { worker, objective } => {
            Some(format!("worker {worker} started: {objective}"))
        }
        ProgressPayload::WorkerProgress { worker, message } if verbose => {
            Some(format!("worker {worker}: {message}"))
        }
        ProgressPayload::WorkerCompleted {
            worker,
            fact_count,
            source_count,
        } => Some(format!(
            "worker {worker} done: {fact_count} facts, {source_count} sources"
        )),
        ProgressPayload::WorkerFailed { worker, error } => {
            Some(format!("worker {worker} FAILED: {error}"))
        }
        ProgressPayload::IterationStarted { worker, iteration } if verbose => {
            Some(format!("worker {worker} iteration {iteration}"))
        }
        ProgressPayload::ToolCall { tool, worker, .. } if verbose => match worker {
            Some(w) => Some(format!("worker {w} → {tool}")),
            None => Some(format!("→ {tool}")),
        },
        ProgressPayload::ToolResult { tool, ok, summary, .. } if verbose => {
            Some(format!("← {tool} {} ({summary})", if *ok { "ok" } else { "err" }))
        }
        ProgressPayload::AnalysisStarted {} => Some("analysis started".to_string()),
        ProgressPayload::AnalysisComplete {
            validated,
            contradictions,
            gaps,
        } => Some(format!(
            "analysis done: {validated} validated, {contradictions} contradictions, {gaps} gaps"
        )),
        ProgressPayload::CrossValidationComplete {
            supported,
            weak,
            unsupported,
        } if verbose => Some(format!(
            "cross-validation: {supported} supported, {weak} weak, {unsupported} unsupported"
        )),
        ProgressPayload::GapFillingStarted { gap_count } => {
            Some(format!("filling {gap_count} knowledge gaps"))
        }
        ProgressPayload::GapFillingComplete { new_facts } => {
            Some(format!("gap filling done: {new_facts} new facts"))
        }
        ProgressPayload::SynthesisStarted {} => Some("writing report".to_string()),
        ProgressPayload::SynthesisProgress { section, written, total } if verbose => {
            Some(format!("section {}/{total}: {section}", written + 1))
        }
        ProgressPayload::ReportGenerated { report } => {
            Some(format!("report ready: {} ({} citations)", report.title, report.citations.len()))
        }
        ProgressPayload::CostUpdated { total, .. } if verbose => Some(format!(
            "cost: {} in / {} out tokens, ${:.4}",
            total.input_tokens, total.output_tokens, total.total_usd
        )),
        ProgressPayload::ResearchCompleted {
            duration_ms,
            source_count,
            cost,
        } => Some(format!(
            "research complete in {:.1}s: {source_count} sources, ${:.4}",
            *duration_ms as f64 / 1000.0,
            cost.total_usd
        )),
        ProgressPayload::ResearchFailed { message, failed_phase, .. } => {
            Some(format!("research FAILED during {failed_phase}: {message}"))
        }
        ProgressPayload::ResearchCancelled { reason } => {
            Some(format!("research cancelled ({reason})"))
        }
        _ => None,
    }
}
