//! Runtime layer of seeker: the orchestrator that drives a research
//! session end to end, the event bus that streams progress to
//! subscribers, cost aggregation, configuration and the query classifier.
//!
//! Everything external is injected: the session store, the event bus, the
//! tool registry and the LLM client arrive as constructor arguments, never
//! as globals.

mod bus;
mod classifier;
mod config;
mod cost;
mod error;
mod orchestrator;
mod sink;

pub use bus::*;
pub use classifier::*;
pub use config::*;
pub use cost::*;
pub use error::*;
pub use orchestrator::*;
pub use sink::*;
