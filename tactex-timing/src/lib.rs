mod deadline;
mod simulated;
mod timer;

pub use deadline::Deadline;
pub use simulated::SimulatedTimer;
pub use timer::{unix_timestamp, HighPrecisionTimer, Timer};
