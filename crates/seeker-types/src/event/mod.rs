mod domain;
mod progress;

pub use domain::*;
pub use progress::*;
