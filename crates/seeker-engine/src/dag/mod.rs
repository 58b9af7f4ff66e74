use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use seeker_types::{NodeId, PlanNode, TaskKind, TaskResult, TaskStatus};

use crate::{Error, Result};

pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// One node of the task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: NodeId,
    pub kind: TaskKind,
    pub description: String,
    pub depends_on: BTreeSet<NodeId>,
    pub status: TaskStatus,
    /// Exclusively owned by the node once it is `Complete`.
    pub result: Option<TaskResult>,
    pub retries: u32,
    pub error: Option<String>,
    /// Worker number executing this node, once dispatched.
    pub worker: Option<u32>,
}

#[derive(Debug, Default)]
struct Graph {
    nodes: BTreeMap<NodeId, TaskNode>,
    next_id: u64,
    /// Lazily computed topological order, invalidated on structure change.
    topo: Option<Vec<NodeId>>,
}

/// Task graph with reader/writer locking.
///
/// All mutating operations take the exclusive lock; readers share. The
/// ready set is returned in topological order with a stable secondary sort
/// by node id so identical plans always dispatch identically.
pub struct TaskDag {
    inner: RwLock<Graph>,
    max_retries: u32,
}

impl Default for TaskDag {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskDag {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Graph::default()),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Add a node depending on `depends_on`, all of which must exist.
    pub fn add_node(
        &self,
        kind: TaskKind,
        description: impl Into<String>,
        depends_on: impl IntoIterator<Item = NodeId>,
    ) -> Result<NodeId> {
        let mut graph = self.inner.write().expect("dag lock poisoned");
        let deps: BTreeSet<NodeId> = depends_on.into_iter().collect();
        for dep in &deps {
            if !graph.nodes.contains_key(dep) {
                return Err(Error::UnknownNode(*dep));
            }
        }

        graph.next_id += 1;
        let id = NodeId(graph.next_id);
        graph.nodes.insert(
            id,
            TaskNode {
                id,
                kind,
                description: description.into(),
                depends_on: deps,
                status: TaskStatus::Pending,
                result: None,
                retries: 0,
                error: None,
                worker: None,
            },
        );
        graph.topo = None;
        Ok(id)
    }

    /// Add an edge `src -> dst` (dst depends on src). Rejects cycles.
    pub fn add_edge(&self, src: NodeId, dst: NodeId) -> Result<()> {
        let mut graph = self.inner.write().expect("dag lock poisoned");
        if !graph.nodes.contains_key(&src) {
            return Err(Error::UnknownNode(src));
        }
        if !graph.nodes.contains_key(&dst) {
            return Err(Error::UnknownNode(dst));
        }
        if src == dst || reaches(&graph.nodes, dst, src) {
            return Err(Error::Cycle { from: src, to: dst });
        }
        graph
            .nodes
            .get_mut(&dst)
            .expect("checked above")
            .depends_on
            .insert(src);
        graph.topo = None;
        Ok(())
    }

    /// Nodes whose dependencies are all complete, in dispatch order.
    ///
    /// Returned nodes are marked `Ready`; the caller transitions them to
    /// `Running` via [`TaskDag::mark_running`] when it dispatches them.
    pub fn ready_tasks(&self) -> Vec<TaskNode> {
        let mut graph = self.inner.write().expect("dag lock poisoned");
        let order = topo_order(&mut graph);

        let mut ready = Vec::new();
        for id in order {
            let node = &graph.nodes[&id];
            if node.status != TaskStatus::Pending && node.status != TaskStatus::Ready {
                continue;
            }
            let deps_met = node
                .depends_on
                .iter()
                .all(|dep| graph.nodes[dep].status == TaskStatus::Complete);
            if deps_met {
                ready.push(id);
            }
        }

        ready
            .into_iter()
            .map(|id| {
                let node = graph.nodes.get_mut(&id).expect("id from iteration");
                node.status = TaskStatus::Ready;
                node.clone()
            })
            .collect()
    }

    pub fn mark_running(&self, id: NodeId, worker: u32) -> Result<()> {
        let mut graph = self.inner.write().expect("dag lock poisoned");
        let node = graph.nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
        node.status = TaskStatus::Running;
        node.worker = Some(worker);
        Ok(())
    }

    /// Store the result payload and transition to `Complete`.
    pub fn set_result(&self, id: NodeId, result: TaskResult) -> Result<()> {
        let mut graph = self.inner.write().expect("dag lock poisoned");
        let node = graph.nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
        node.result = Some(result);
        node.status = TaskStatus::Complete;
        node.error = None;
        Ok(())
    }

    pub fn fail(&self, id: NodeId, error: impl Into<String>) -> Result<()> {
        let mut graph = self.inner.write().expect("dag lock poisoned");
        let node = graph.nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
        node.status = TaskStatus::Failed;
        node.error = Some(error.into());
        Ok(())
    }

    /// Reschedule a failed node if it has retry budget left.
    pub fn retry(&self, id: NodeId) -> Result<u32> {
        let mut graph = self.inner.write().expect("dag lock poisoned");
        let node = graph.nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
        if node.retries >= self.max_retries {
            return Err(Error::RetriesExhausted(id));
        }
        node.retries += 1;
        node.status = TaskStatus::Pending;
        node.error = None;
        node.worker = None;
        Ok(node.retries)
    }

    /// Remove a permanently failed node from every dependency set, letting
    /// the plan degrade instead of deadlocking. The node itself stays
    /// `Failed` in the graph.
    pub fn release_dependents(&self, failed: NodeId) -> Result<()> {
        let mut graph = self.inner.write().expect("dag lock poisoned");
        if !graph.nodes.contains_key(&failed) {
            return Err(Error::UnknownNode(failed));
        }
        for node in graph.nodes.values_mut() {
            node.depends_on.remove(&failed);
        }
        graph.topo = None;
        Ok(())
    }

    /// True when every node is `Complete` or `Failed`.
    pub fn all_complete(&self) -> bool {
        let graph = self.inner.read().expect("dag lock poisoned");
        graph
            .nodes
            .values()
            .all(|n| matches!(n.status, TaskStatus::Complete | TaskStatus::Failed))
    }

    pub fn node(&self, id: NodeId) -> Option<TaskNode> {
        self.inner
            .read()
            .expect("dag lock poisoned")
            .nodes
            .get(&id)
            .cloned()
    }

    /// Snapshot of every node, ordered by id.
    pub fn nodes(&self) -> Vec<TaskNode> {
        self.inner
            .read()
            .expect("dag lock poisoned")
            .nodes
            .values()
            .cloned()
            .collect()
    }

    /// All nodes of one kind, ordered by id.
    pub fn nodes_of_kind(&self, kind: TaskKind) -> Vec<TaskNode> {
        self.nodes().into_iter().filter(|n| n.kind == kind).collect()
    }

    /// Serializable plan view for `PlanCreated` events.
    pub fn plan_nodes(&self) -> Vec<PlanNode> {
        self.nodes()
            .into_iter()
            .map(|n| PlanNode {
                id: n.id,
                kind: n.kind,
                description: n.description,
                depends_on: n.depends_on.into_iter().collect(),
            })
            .collect()
    }
}

/// Is `to` reachable from `from` by following dependency edges backwards?
fn reaches(nodes: &BTreeMap<NodeId, TaskNode>, from: NodeId, to: NodeId) -> bool {
    let mut stack = vec![from];
    let mut seen = BTreeSet::new();
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(node) = nodes.get(&current) {
            stack.extend(node.depends_on.iter().copied());
        }
    }
    false
}

/// Kahn's algorithm over the BTreeMap; iteration order makes id the stable
/// tie-break within each frontier.
fn topo_order(graph: &mut Graph) -> Vec<NodeId> {
    if let Some(order) = &graph.topo {
        return order.clone();
    }

    let mut in_degree: BTreeMap<NodeId, usize> = graph
        .nodes
        .values()
        .map(|n| (n.id, n.depends_on.len()))
        .collect();
    let mut order = Vec::with_capacity(graph.nodes.len());
    let mut frontier: BTreeSet<NodeId> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();

    while let Some(id) = frontier.iter().next().copied() {
        frontier.remove(&id);
        order.push(id);
        for node in graph.nodes.values() {
            if node.depends_on.contains(&id) {
                let degree = in_degree.get_mut(&node.id).expect("node in map");
                *degree -= 1;
                if *degree == 0 {
                    frontier.insert(node.id);
                }
            }
        }
    }

    graph.topo = Some(order.clone());
    order
}
