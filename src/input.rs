//! Audio input feed into the engine.

use rb::{Producer, RbProducer, SpscRb};

// -------------------------------------------------------------------------------------------------

/// Capacity of the input ring in mono samples.
pub const INPUT_RING_SIZE: usize = 4096;

/// Create the SPSC sample ring between the input callback and the engine.
pub fn input_ring() -> SpscRb<i16> {
    SpscRb::new(INPUT_RING_SIZE)
}

// -------------------------------------------------------------------------------------------------

/// Producer half of the input ring, fed from an audio input callback.
pub struct InputProducer {
    producer: Producer<i16>,
    mono: Vec<i16>,
    dropped: u64,
    overruns: u64,
}

impl InputProducer {
    pub fn new(producer: Producer<i16>) -> Self {
        Self {
            producer,
            mono: Vec::with_capacity(INPUT_RING_SIZE),
            dropped: 0,
            overruns: 0,
        }
    }

    /// Downmix interleaved stereo frames to mono and push them into the
    /// ring. When the engine falls behind the newest samples are dropped,
    /// so an overrun glitches instead of stalling the input callback.
    pub fn push_interleaved(&mut self, frames: &[i16]) {
        self.mono.clear();
        for frame in frames.chunks_exact(2) {
            self.mono.push((frame[0] >> 1) + (frame[1] >> 1));
        }
        let mut written = 0;
        while written < self.mono.len() {
            match self.producer.write(&self.mono[written..]) {
                Ok(count) if count > 0 => written += count,
                _ => {
                    self.dropped += (self.mono.len() - written) as u64;
                    self.overruns += 1;
                    if self.overruns % 1000 == 1 {
                        log::warn!(
                            "Input ring overrun: {} samples dropped so far",
                            self.dropped
                        );
                    }
                    break;
                }
            }
        }
    }

    /// Total samples dropped due to ring overruns.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

// -------------------------------------------------------------------------------------------------
