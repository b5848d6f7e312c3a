pub mod batch;
pub mod calendar;
pub mod orchestrator;

pub use batch::*;
pub use orchestrator::*;
