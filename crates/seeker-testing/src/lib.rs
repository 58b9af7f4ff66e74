//! Test doubles shared across the seeker workspace.
//!
//! Nothing here touches the network: the scripted chat client replays
//! canned responses, the canned tools serve fixed results, and the
//! collecting sink records every progress event for assertions.

mod llm;
mod scripts;
mod sink;
mod tools;

pub use llm::*;
pub use scripts::*;
pub use sink::*;
pub use tools::*;
