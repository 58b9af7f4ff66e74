use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use seeker_engine::TaskDag;
use seeker_llm::{ChatClient, ChatMessage, ChatOptions};
use seeker_tools::ToolRegistry;
use seeker_types::{Mode, NodeId, Perspective, TaskKind};

use crate::{Result, ask_structured, prompts};

pub const MIN_PERSPECTIVES: usize = 1;
pub const MAX_PERSPECTIVES: usize = 6;
const MAX_SEED_QUESTIONS: usize = 5;

/// Output of the planner: the topic, the perspectives and the task graph,
/// with each search node mapped to the perspective it pursues.
pub struct ResearchPlan {
    pub topic: String,
    pub perspectives: Vec<Perspective>,
    pub dag: TaskDag,
    /// Search node → perspective index, in node-id order.
    pub search_nodes: Vec<(NodeId, usize)>,
    pub synthesize_node: NodeId,
    pub cross_validate_node: Option<NodeId>,
    pub fill_gaps_node: Option<NodeId>,
}

#[derive(Debug, Deserialize)]
struct PerspectivesResponse {
    perspectives: Vec<PerspectiveSpec>,
}

#[derive(Debug, Deserialize)]
struct PerspectiveSpec {
    name: String,
    #[serde(default)]
    focus: String,
    #[serde(default)]
    questions: Vec<String>,
}

/// Discovers expert perspectives and builds the task DAG.
pub struct PlannerAgent {
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
}

impl PlannerAgent {
    pub fn new(client: Arc<dyn ChatClient>, registry: Arc<ToolRegistry>) -> Self {
        Self { client, registry }
    }

    pub async fn plan(
        &self,
        topic: &str,
        hints: Option<&str>,
        mode: Mode,
        cancel: &CancellationToken,
    ) -> Result<ResearchPlan> {
        let perspectives = match mode {
            Mode::Fast => vec![Perspective::basic_facts(topic)],
            Mode::Deep => self.discover_perspectives(topic, hints, cancel).await,
        };
        build_plan(topic, perspectives, mode)
    }

    /// Perspective discovery with graceful degradation: a failed survey
    /// search means an empty survey, a failed or empty LLM response means
    /// the fixed fallback template.
    async fn discover_perspectives(
        &self,
        topic: &str,
        hints: Option<&str>,
        cancel: &CancellationToken,
    ) -> Vec<Perspective> {
        let survey = self.survey(topic, cancel).await;

        let prompt = prompts::perspective_discovery(topic, &survey, hints);
        let messages = [ChatMessage::user(prompt)];
        let options = ChatOptions::scoped("planner/perspectives").with_temperature(0.7);

        let response: Option<PerspectivesResponse> = ask_structured(
            self.client.as_ref(),
            &messages,
            &options,
            r#"{"perspectives": [{"name": "...", "focus": "...", "questions": ["..."]}]}"#,
            cancel,
        )
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "perspective discovery failed, using fallback");
            e
        })
        .ok();

        let mut perspectives: Vec<Perspective> = response
            .map(|r| {
                r.perspectives
                    .into_iter()
                    .filter(|p| !p.name.trim().is_empty())
                    .map(|p| Perspective {
                        focus: if p.focus.trim().is_empty() {
                            p.name.clone()
                        } else {
                            p.focus
                        },
                        name: p.name,
                        questions: p.questions.into_iter().take(MAX_SEED_QUESTIONS).collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if perspectives.is_empty() {
            return fallback_template(topic);
        }

        // Always include the broad-coverage default.
        if !perspectives
            .iter()
            .any(|p| p.name == Perspective::BASIC_FACTS_NAME)
        {
            perspectives.insert(0, Perspective::basic_facts(topic));
        }
        perspectives.truncate(MAX_PERSPECTIVES);
        perspectives
    }

    /// Title/snippet survey from a preliminary search; failures degrade to
    /// an empty survey rather than failing the plan.
    async fn survey(&self, topic: &str, cancel: &CancellationToken) -> String {
        let result = self
            .registry
            .invoke("search", json!({"query": topic}), None, cancel)
            .await;
        match result {
            Ok(value) => {
                let hits: Vec<seeker_tools::SearchResult> =
                    serde_json::from_value(value).unwrap_or_default();
                hits.iter()
                    .map(|h| format!("- {}: {}", h.title, h.snippet))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Err(err) => {
                tracing::debug!(error = %err, "survey search failed");
                String::new()
            }
        }
    }
}

/// Fixed 3-perspective template derived from the topic string.
pub fn fallback_template(topic: &str) -> Vec<Perspective> {
    vec![
        Perspective::basic_facts(topic),
        Perspective {
            name: "Context and stakeholders".to_string(),
            focus: format!("Who is affected by {topic} and in what context it matters"),
            questions: vec![
                format!("Who are the main actors involved in {topic}?"),
                format!("What is the historical context of {topic}?"),
                format!("Who benefits and who is harmed by {topic}?"),
            ],
        },
        Perspective {
            name: "Risks and open questions".to_string(),
            focus: format!("Criticisms, risks and unresolved debates around {topic}"),
            questions: vec![
                format!("What are the main criticisms of {topic}?"),
                format!("What risks does {topic} carry?"),
                format!("What remains unknown or contested about {topic}?"),
            ],
        },
    ]
}

/// Assemble the task graph for the chosen perspectives.
fn build_plan(topic: &str, mut perspectives: Vec<Perspective>, mode: Mode) -> Result<ResearchPlan> {
    debug_assert!(!perspectives.is_empty());
    perspectives.truncate(MAX_PERSPECTIVES);

    let dag = TaskDag::new();
    let root = dag
        .add_node(TaskKind::Root, format!("research: {topic}"), [])
        .expect("root has no deps");

    let mut search_nodes = Vec::new();
    for (index, perspective) in perspectives.iter().enumerate() {
        let id = dag
            .add_node(TaskKind::Search, perspective.name.clone(), [root])
            .expect("root exists");
        search_nodes.push((id, index));
    }

    let (cross_validate_node, fill_gaps_node, synthesize_node) = match mode {
        Mode::Fast => {
            let synth = dag
                .add_node(
                    TaskKind::Synthesize,
                    "write report",
                    search_nodes.iter().map(|(id, _)| *id),
                )
                .expect("search nodes exist");
            (None, None, synth)
        }
        Mode::Deep => {
            let cross = dag
                .add_node(
                    TaskKind::CrossValidate,
                    "cross-validate facts",
                    search_nodes.iter().map(|(id, _)| *id),
                )
                .expect("search nodes exist");
            let gaps = dag
                .add_node(TaskKind::FillGaps, "fill knowledge gaps", [cross])
                .expect("cross-validate exists");
            let synth = dag
                .add_node(TaskKind::Synthesize, "write report", [gaps])
                .expect("fill-gaps exists");
            (Some(cross), Some(gaps), synth)
        }
    };

    Ok(ResearchPlan {
        topic: topic.to_string(),
        perspectives,
        dag,
        search_nodes,
        synthesize_node,
        cross_validate_node,
        fill_gaps_node,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeker_types::TaskStatus;

    #[test]
    fn fallback_has_three_perspectives_with_default_first() {
        let perspectives = fallback_template("quantum computing");
        assert_eq!(perspectives.len(), 3);
        assert_eq!(perspectives[0].name, Perspective::BASIC_FACTS_NAME);
        assert!(perspectives[1].focus.contains("quantum computing"));
    }

    #[test]
    fn deep_plan_has_full_shape() {
        let plan = build_plan("t", fallback_template("t"), Mode::Deep).unwrap();
        let nodes = plan.dag.nodes();

        assert_eq!(
            nodes.iter().filter(|n| n.kind == TaskKind::Root).count(),
            1
        );
        assert_eq!(
            nodes.iter().filter(|n| n.kind == TaskKind::Search).count(),
            3
        );
        assert_eq!(
            nodes
                .iter()
                .filter(|n| n.kind == TaskKind::CrossValidate)
                .count(),
            1
        );
        assert_eq!(
            nodes.iter().filter(|n| n.kind == TaskKind::FillGaps).count(),
            1
        );
        assert_eq!(
            nodes
                .iter()
                .filter(|n| n.kind == TaskKind::Synthesize)
                .count(),
            1
        );

        // Every non-root node has at least one dependency.
        for node in &nodes {
            if node.kind != TaskKind::Root {
                assert!(!node.depends_on.is_empty(), "{:?} has no deps", node.kind);
            }
        }
    }

    #[test]
    fn synthesize_transitively_depends_on_all_searches() {
        let plan = build_plan("t", fallback_template("t"), Mode::Deep).unwrap();

        // Drive the plan forward: only after every search completes (via
        // cross-validate and fill-gaps) does synthesize become ready.
        let dag = &plan.dag;
        let root = dag.nodes_of_kind(TaskKind::Root)[0].id;
        dag.set_result(root, seeker_types::TaskResult::Empty).unwrap();

        for (id, _) in &plan.search_nodes {
            assert!(dag.node(plan.synthesize_node).unwrap().status == TaskStatus::Pending);
            dag.set_result(*id, seeker_types::TaskResult::Empty).unwrap();
        }
        dag.set_result(plan.cross_validate_node.unwrap(), seeker_types::TaskResult::Empty)
            .unwrap();
        dag.set_result(plan.fill_gaps_node.unwrap(), seeker_types::TaskResult::Empty)
            .unwrap();

        let ready: Vec<_> = dag.ready_tasks().iter().map(|n| n.id).collect();
        assert_eq!(ready, vec![plan.synthesize_node]);
    }

    #[test]
    fn fast_plan_collapses_to_three_nodes() {
        let plan = build_plan("t", vec![Perspective::basic_facts("t")], Mode::Fast).unwrap();
        let nodes = plan.dag.nodes();
        assert_eq!(nodes.len(), 3);
        assert!(plan.cross_validate_node.is_none());
        assert!(plan.fill_gaps_node.is_none());
    }
}
