//! Schema types shared across the seeker workspace.
//!
//! This crate contains data only: the session/worker model, the research
//! domain objects (perspectives, facts, contradictions, gaps, reports), the
//! durable domain-event set and the streaming progress-event taxonomy.
//! Behavior lives in the engine and runtime crates.

mod cancel;
mod cost;
pub mod event;
mod research;
mod session;
mod task;

pub use cancel::*;
pub use cost::*;
pub use event::*;
pub use research::*;
pub use session::*;
pub use task::*;
