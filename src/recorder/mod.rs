pub mod commands;
pub mod controller;
pub mod probe;
pub mod state;


pub use controller::{ActivityRecorder, RecorderSnapshot};
pub use probe::{ActivityProbe, SyntheticProbe};
pub use state::{IntervalConfig, IntervalSample, RecorderState, RecorderStatus};
