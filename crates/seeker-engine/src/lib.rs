//! State machinery for the seeker runtime.
//!
//! Three independent pieces, none of which touch the network:
//!
//! - [`store`]: event-sourced session persistence. State = fold(events);
//!   the JSONL log on disk is authoritative, snapshots are derived.
//! - [`context`]: multi-scale context folding keeping prompt size under a
//!   hard token budget.
//! - [`dag`]: the task graph the orchestrator schedules from.

pub mod context;
pub mod dag;
mod error;
pub mod store;

pub use context::{
    ContextManager, ContextSnapshot, FoldingDirective, SummaryEntry, TokenCounter, Turn,
    heuristic_counter,
};
pub use dag::{TaskDag, TaskNode};
pub use error::{Error, Result};
pub use store::{SessionStore, migrate_legacy_value, reduce};
