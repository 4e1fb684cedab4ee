#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod control;
mod dejavu;
mod engine;
mod error;
mod grain;
mod history;
mod input;
mod output;
mod params;
mod snapshot;
mod tempo;
mod view;

// public, flat re-exports
pub use error::Error;

pub use engine::{Engine, EngineCommand, SAMPLE_RATE};

pub use control::{
    ButtonControl, ControlEvent, Controller, PotControl, SoftTakeover, LONG_PRESS_US,
};

pub use params::{
    GranParams, MacroMode, PlayMode, SharedParams, DEFAULT_RESOLUTION_INDEX, RESOLUTIONS,
};

pub use dejavu::{DejaVuRing, StepSnapshot};
pub use grain::{Grain, GrainPool};
pub use history::{FeedbackLine, HistoryBuffer};
pub use input::{InputProducer, INPUT_RING_SIZE};
pub use output::{OutputSink, VecSink, OUTPUT_BLOCK_FRAMES};
pub use snapshot::{FullParamSnapshot, SnapshotBank};
pub use tempo::{BeatClock, TriggerLine, DEFAULT_BEAT_INTERVAL_US};
pub use view::{EngineView, GrainCell};

// public mods
pub mod dsp;
