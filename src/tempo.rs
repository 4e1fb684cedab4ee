//! Tap tempo and the dual trigger clocks.
//!
//! One clock fires grain triggers at the musical rate (the tapped beat
//! divided or multiplied by the resolution setting), the other tracks the
//! raw tapped beat for the beat indicator. Both rearm from the same tap so
//! they stay phase locked.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::params::RESOLUTIONS;

// -------------------------------------------------------------------------------------------------

/// Default beat interval, 120 BPM.
pub const DEFAULT_BEAT_INTERVAL_US: u64 = 500_000;
/// Tap intervals at or below this are ignored (above 6000 BPM).
pub const MIN_TAP_INTERVAL_US: u64 = 10_000;
/// Tap intervals at or above this are ignored (below 15 BPM).
pub const MAX_TAP_INTERVAL_US: u64 = 4_000_000;
/// How long the beat indicator stays lit after a raw beat.
pub const BEAT_INDICATOR_US: u64 = 20_000;

// -------------------------------------------------------------------------------------------------

/// Timestamped tap handoff from the control thread to the audio thread.
///
/// The control thread records the tap time, the audio thread takes it at
/// the start of its next block. A store/load pair on the flag with
/// release/acquire ordering publishes the timestamp word.
#[derive(Default)]
pub struct TriggerLine {
    time_us: AtomicU64,
    armed: AtomicBool,
}

impl TriggerLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tap. A second tap before the audio thread takes the first
    /// simply moves the timestamp forward.
    pub fn record(&self, time_us: u64) {
        self.time_us.store(time_us, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
    }

    /// Take the pending tap, if any.
    pub fn take(&self) -> Option<u64> {
        if self.armed.load(Ordering::Acquire) {
            let time_us = self.time_us.load(Ordering::Relaxed);
            self.armed.store(false, Ordering::Relaxed);
            Some(time_us)
        } else {
            None
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Tap tempo state and both trigger clocks. Owned by the audio thread.
pub struct BeatClock {
    beat_interval_us: u64,
    bpm: f32,
    last_tap_us: u64,
    next_musical_us: u64,
    next_raw_us: u64,
    indicator_until_us: u64,
}

impl BeatClock {
    pub fn new() -> Self {
        Self {
            beat_interval_us: DEFAULT_BEAT_INTERVAL_US,
            bpm: 60_000_000.0 / DEFAULT_BEAT_INTERVAL_US as f32,
            last_tap_us: 0,
            next_musical_us: 0,
            next_raw_us: 0,
            indicator_until_us: 0,
        }
    }

    /// Register a tap. The interval to the previous tap sets the tempo when
    /// it is plausible; either way both clocks rearm at the tap so the next
    /// trigger lands on it.
    pub fn tap(&mut self, time_us: u64) {
        if self.last_tap_us > 0 {
            let interval = time_us.saturating_sub(self.last_tap_us);
            if interval > MIN_TAP_INTERVAL_US && interval < MAX_TAP_INTERVAL_US {
                self.beat_interval_us = interval;
                self.bpm = 60_000_000.0 / interval as f32;
                log::debug!("Tap tempo set to {:.1} BPM", self.bpm);
            }
        }
        self.last_tap_us = time_us;
        self.next_musical_us = time_us;
        self.next_raw_us = time_us;
        self.indicator_until_us = time_us + BEAT_INDICATOR_US;
    }

    /// Poll the musical clock. Returns true when a grain trigger is due.
    /// Fires at most once per poll, so a long gap between polls slips
    /// rather than bursting.
    pub fn poll_trigger(&mut self, now_us: u64, resolution_index: u8) -> bool {
        if self.next_musical_us == 0 || now_us < self.next_musical_us {
            return false;
        }
        let resolution = RESOLUTIONS
            .get(resolution_index as usize)
            .copied()
            .unwrap_or(1.0);
        let period = (self.beat_interval_us as f32 / resolution) as u64;
        self.next_musical_us += period.max(1);
        true
    }

    /// Poll the raw beat clock and refresh the beat indicator.
    pub fn poll_beat(&mut self, now_us: u64) -> bool {
        if self.next_raw_us == 0 || now_us < self.next_raw_us {
            return false;
        }
        self.next_raw_us += self.beat_interval_us.max(1);
        self.indicator_until_us = now_us + BEAT_INDICATOR_US;
        true
    }

    /// True while the beat indicator should be lit.
    pub fn indicator_on(&self, now_us: u64) -> bool {
        now_us < self.indicator_until_us
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn beat_interval_us(&self) -> u64 {
        self.beat_interval_us
    }
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------
