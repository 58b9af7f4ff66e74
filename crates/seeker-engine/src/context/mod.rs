use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_TOKEN_BUDGET: usize = 40_000;
pub const DEFAULT_WORKING_CAPACITY: usize = 5;
pub const DEFAULT_TRIGGER_RATIO: f64 = 0.75;
const SUMMARY_LEVELS: usize = 4;

/// Granular condensation target size per turn.
const CONDENSED_TURN_TOKENS: usize = 60;
/// Deep consolidation target size per merged entry.
const CONSOLIDATED_TOKENS: usize = 200;

/// Injected token counter. The default is the whitespace-word heuristic
/// (`ceil(words * 4 / 3)`); swap in a real tokenizer without touching the
/// manager.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

pub fn heuristic_counter() -> TokenCounter {
    Arc::new(|text: &str| {
        let words = text.split_whitespace().count();
        words.div_ceil(3) + words
    })
}

/// One observed interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: u64,
    /// Short label such as `"think"`, `"observe"`, `"tool:search"`.
    pub label: String,
    pub content: String,
}

/// One summary at some level; level 0 is finest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub level: usize,
    pub content: String,
    pub token_count: usize,
    /// Turn ids this summary stands in for. A turn id belongs to at most
    /// one summary entry at any time.
    pub covered_turns: Vec<u64>,
}

/// Consolidated call history for one tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolMemory {
    pub calls: usize,
    pub notes: String,
}

/// Folding decision for the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FoldingDirective {
    /// Keep the latest turn in working memory, fold nothing.
    None,
    /// Compress the oldest working-memory turn into level 0.
    GranularCondensation,
    /// Fold levels 0..=level into a single entry one level up.
    DeepConsolidation { level: usize },
}

impl FoldingDirective {
    /// Parse the constrained-JSON directive an LLM returns. `None` means
    /// the text was not a valid directive and the caller should fall back.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim().trim_start_matches("```json").trim_matches('`').trim();
        serde_json::from_str(trimmed).ok()
    }
}

/// Read-only view handed to prompt assembly.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    /// Summaries coarsest first, so prompts read old → new.
    pub summaries: Vec<SummaryEntry>,
    /// Working-memory turns, oldest first.
    pub recent: Vec<Turn>,
    pub tool_notes: Vec<(String, ToolMemory)>,
}

impl ContextSnapshot {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.summaries {
            out.push_str(&format!("[summary L{}] {}\n", entry.level, entry.content));
        }
        for (tool, memory) in &self.tool_notes {
            out.push_str(&format!("[tool {tool} ×{}] {}\n", memory.calls, memory.notes));
        }
        for turn in &self.recent {
            out.push_str(&format!("[{}] {}\n", turn.label, turn.content));
        }
        out
    }
}

/// Multi-scale context folding.
///
/// Owns the summary levels exclusively; callers read through
/// [`ContextManager::snapshot`]. Every observed turn is represented in
/// exactly one place at all times: working memory or one summary entry.
pub struct ContextManager {
    counter: TokenCounter,
    budget: usize,
    trigger_ratio: f64,
    working_capacity: usize,
    working: VecDeque<Turn>,
    levels: Vec<Vec<SummaryEntry>>,
    tool_memory: BTreeMap<String, ToolMemory>,
    observed: BTreeSet<u64>,
    next_turn_id: u64,
}

impl ContextManager {
    pub fn new(counter: TokenCounter) -> Self {
        Self {
            counter,
            budget: DEFAULT_TOKEN_BUDGET,
            trigger_ratio: DEFAULT_TRIGGER_RATIO,
            working_capacity: DEFAULT_WORKING_CAPACITY,
            working: VecDeque::new(),
            levels: vec![Vec::new(); SUMMARY_LEVELS],
            tool_memory: BTreeMap::new(),
            observed: BTreeSet::new(),
            next_turn_id: 0,
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_working_capacity(mut self, capacity: usize) -> Self {
        self.working_capacity = capacity.max(1);
        self
    }

    pub fn with_trigger_ratio(mut self, ratio: f64) -> Self {
        self.trigger_ratio = ratio.clamp(0.1, 1.0);
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn working_len(&self) -> usize {
        self.working.len()
    }

    /// Record a new interaction. Overflowing the working-memory capacity
    /// condenses the oldest turn into level 0 so nothing is lost.
    pub fn observe(&mut self, label: impl Into<String>, content: impl Into<String>) -> u64 {
        self.next_turn_id += 1;
        let id = self.next_turn_id;
        self.observed.insert(id);
        self.working.push_back(Turn {
            id,
            label: label.into(),
            content: content.into(),
        });
        while self.working.len() > self.working_capacity {
            self.condense_oldest();
        }
        id
    }

    /// Fold consolidated tool-call history into the tool memory map.
    pub fn note_tool_call(&mut self, tool: &str, note: &str) {
        let memory = self.tool_memory.entry(tool.to_string()).or_default();
        memory.calls += 1;
        if !memory.notes.is_empty() {
            memory.notes.push_str("; ");
        }
        memory.notes.push_str(note);
        memory.notes = truncate_to_tokens(&memory.notes, CONSOLIDATED_TOKENS, &self.counter);
    }

    /// Current token usage across working memory, summaries and tool notes.
    pub fn usage(&self) -> usize {
        let count = &self.counter;
        let working: usize = self.working.iter().map(|t| count(&t.content)).sum();
        let summaries: usize = self
            .levels
            .iter()
            .flatten()
            .map(|e| e.token_count)
            .sum();
        let tools: usize = self.tool_memory.values().map(|m| count(&m.notes)).sum();
        working + summaries + tools
    }

    pub fn projected_usage(&self, next: &str) -> usize {
        self.usage() + (self.counter)(next)
    }

    /// Folding is triggered when projected usage crosses the ratio.
    pub fn should_fold(&self, projected: usize) -> bool {
        projected as f64 >= self.budget as f64 * self.trigger_ratio
    }

    /// Deterministic fallback when the LLM returns an invalid directive.
    pub fn fallback_directive(&self, projected: usize) -> FoldingDirective {
        if self.should_fold(projected) {
            FoldingDirective::GranularCondensation
        } else {
            FoldingDirective::None
        }
    }

    /// Apply a directive, then shrink until under budget.
    ///
    /// Fails with `BudgetExhausted` when over budget with nothing left to
    /// fold.
    pub fn apply(&mut self, directive: FoldingDirective) -> Result<()> {
        match directive {
            FoldingDirective::None => {}
            FoldingDirective::GranularCondensation => self.condense_oldest(),
            FoldingDirective::DeepConsolidation { level } => self.consolidate(level),
        }
        self.enforce_budget()
    }

    fn enforce_budget(&mut self) -> Result<()> {
        loop {
            let usage = self.usage();
            if usage <= self.budget {
                return Ok(());
            }
            if self.working.len() > 1 {
                self.condense_oldest();
                continue;
            }
            match self.deepest_foldable_level() {
                Some(level) => self.consolidate(level),
                None => {
                    return Err(Error::BudgetExhausted {
                        usage,
                        budget: self.budget,
                    });
                }
            }
        }
    }

    /// Deepest level that still has something to fold upward.
    fn deepest_foldable_level(&self) -> Option<usize> {
        (0..self.levels.len() - 1)
            .rev()
            .find(|&k| self.levels[..=k].iter().any(|l| !l.is_empty()))
            .filter(|&k| {
                // Folding must actually shrink something: more than one
                // entry below, or any entry not yet at the top.
                let entries: usize = self.levels[..=k].iter().map(Vec::len).sum();
                entries > 0 && (entries > 1 || k + 1 < self.levels.len())
            })
    }

    /// Compress the oldest working-memory turn into a level-0 entry.
    fn condense_oldest(&mut self) {
        let Some(turn) = self.working.pop_front() else {
            return;
        };
        let condensed = format!(
            "[turn {}] {}: {}",
            turn.id,
            turn.label,
            truncate_to_tokens(&turn.content, CONDENSED_TURN_TOKENS, &self.counter)
        );
        let token_count = (self.counter)(&condensed);
        self.levels[0].push(SummaryEntry {
            level: 0,
            content: condensed,
            token_count,
            covered_turns: vec![turn.id],
        });
    }

    /// Fold levels 0..=k into a single entry at level k+1 and clear them.
    fn consolidate(&mut self, level: usize) {
        let level = level.min(self.levels.len() - 2);
        let mut covered = Vec::new();
        let mut merged = String::new();
        for l in 0..=level {
            for entry in self.levels[l].drain(..) {
                covered.extend(entry.covered_turns);
                if !merged.is_empty() {
                    merged.push(' ');
                }
                merged.push_str(&entry.content);
            }
        }
        if covered.is_empty() {
            return;
        }
        covered.sort_unstable();

        // The turn-id roster survives truncation so every original turn
        // stays referenced somewhere in the summary text.
        let roster = format!(
            "[turns {}] ",
            covered
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        let body = truncate_to_tokens(&merged, CONSOLIDATED_TOKENS, &self.counter);
        let content = format!("{roster}{body}");
        let token_count = (self.counter)(&content);
        self.levels[level + 1].push(SummaryEntry {
            level: level + 1,
            content,
            token_count,
            covered_turns: covered,
        });
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let mut summaries = Vec::new();
        for level in self.levels.iter().rev() {
            summaries.extend(level.iter().cloned());
        }
        ContextSnapshot {
            summaries,
            recent: self.working.iter().cloned().collect(),
            tool_notes: self
                .tool_memory
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Every turn id ever observed.
    pub fn observed_turn_ids(&self) -> &BTreeSet<u64> {
        &self.observed
    }

    /// Union of turn ids across working memory and all summary levels.
    pub fn represented_turn_ids(&self) -> BTreeSet<u64> {
        let mut ids: BTreeSet<u64> = self.working.iter().map(|t| t.id).collect();
        for entry in self.levels.iter().flatten() {
            ids.extend(entry.covered_turns.iter().copied());
        }
        ids
    }
}

/// Keep roughly `target` tokens worth of leading words.
fn truncate_to_tokens(text: &str, target: usize, counter: &TokenCounter) -> String {
    if counter(text) <= target {
        return text.to_string();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    // 4 tokens ≈ 3 words under the heuristic counter.
    let keep = (target * 3 / 4).max(1).min(words.len());
    format!("{} …", words[..keep].join(" "))
}
