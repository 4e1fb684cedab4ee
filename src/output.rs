//! Audio output sinks.

use std::sync::{Arc, Mutex};

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Frames per output block handed to the sink.
pub const OUTPUT_BLOCK_FRAMES: usize = 128;

/// Where the engine delivers rendered audio. Implementations receive
/// interleaved stereo blocks of [`OUTPUT_BLOCK_FRAMES`] frames from the
/// audio thread, so `write_block` must not allocate or lock for long.
pub trait OutputSink: Send {
    /// Prepare the sink before the first block. Called once from the audio
    /// thread right after it starts.
    fn open(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Deliver one interleaved stereo block.
    fn write_block(&mut self, interleaved: &[i16]) -> Result<(), Error>;
}

// -------------------------------------------------------------------------------------------------

/// Sink that appends everything into a shared vec. Used in tests and for
/// offline rendering.
#[derive(Default)]
pub struct VecSink {
    samples: Arc<Mutex<Vec<i16>>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the collected samples.
    pub fn samples(&self) -> Arc<Mutex<Vec<i16>>> {
        Arc::clone(&self.samples)
    }
}

impl OutputSink for VecSink {
    fn write_block(&mut self, interleaved: &[i16]) -> Result<(), Error> {
        match self.samples.lock() {
            Ok(mut samples) => {
                samples.extend_from_slice(interleaved);
                Ok(())
            }
            Err(err) => Err(Error::OutputDeviceError(err.to_string().into())),
        }
    }
}
