pub mod actuator;
pub mod force;
pub mod numeric;
pub mod source;
pub mod worker;

pub use actuator::{ActuatorChannel, Command, SendOutcome, TapPhase};
pub use force::{ForceReading, ForceSampler, SamplePolicy};
pub use numeric::first_number;
pub use source::{spawn_reader, ChannelLines, LineEvent, LineFeed, LineSource};
pub use worker::SamplingWorker;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("serial write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("tap field {field} = {value} does not fit in one digit")]
    Encode { field: &'static str, value: u8 },
}

#[derive(Error, Debug)]
pub enum LineError {
    #[error("sensor line is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("serial read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("could not start sampling thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("a sampling window is already running")]
    AlreadySampling,

    #[error("no sampling window was started")]
    NotStarted,

    #[error("sampling worker has stopped")]
    Stopped,
}
