//! Frame-differencing motion engine.
//!
//! A [`engine::MotionEngine`] pulls frames from a [`source::FrameSource`],
//! compares each one against the frame from the previous cycle and produces a
//! [`sink::CycleReport`]: the motion score, a normalized heatmap and the box
//! around the changed pixels. [`scheduler::run_scheduler`] drives the engine on
//! a fixed interval.

pub mod diff;
pub mod engine;
pub mod motion_box;
pub mod scheduler;
pub mod sink;
pub mod snapshot;
pub mod source;

pub use engine::{CycleOutcome, EngineError, EngineStatus, MotionEngine};
pub use motion_box::{MotionBox, MotionBoxTracker};
pub use sink::{CycleReport, MotionSink};
pub use source::{FrameSource, SourceError};
