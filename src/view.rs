//! Lock free view of the audio thread's state for display purposes.
//!
//! The audio thread refreshes the view once per output block; readers poll
//! it at whatever rate the display runs at. All fields are independent
//! single word atomics, so a reader may see values from two adjacent blocks
//! mixed, which is fine for visualization.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::{grain::GrainPool, params::PlayMode};

// -------------------------------------------------------------------------------------------------

/// Per voice display state.
#[derive(Default)]
pub struct GrainCell {
    active: AtomicBool,
    /// History buffer index the voice is reading.
    position: AtomicUsize,
    pitch_bits: AtomicU32,
}

impl GrainCell {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn position(&self) -> usize {
        self.position.load(Ordering::Relaxed)
    }

    pub fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch_bits.load(Ordering::Relaxed))
    }
}

// -------------------------------------------------------------------------------------------------

/// Snapshot of the engine state that a display or UI polls.
pub struct EngineView {
    bpm_bits: AtomicU32,
    active_grains: AtomicUsize,
    history_write_pos: AtomicUsize,
    history_ready: AtomicBool,
    beat_indicator: AtomicBool,
    trigger_indicator: AtomicBool,
    grains: [GrainCell; GrainPool::CAPACITY],
    /// Bumped whenever a parameter change should force a display redraw.
    epoch: AtomicU64,
}

impl EngineView {
    pub fn new() -> Self {
        Self {
            bpm_bits: AtomicU32::new(120.0f32.to_bits()),
            active_grains: AtomicUsize::new(0),
            history_write_pos: AtomicUsize::new(0),
            history_ready: AtomicBool::new(false),
            beat_indicator: AtomicBool::new(false),
            trigger_indicator: AtomicBool::new(false),
            grains: Default::default(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Publish the audio thread's state, once per output block.
    pub fn publish(
        &self,
        bpm: f32,
        pool: &GrainPool,
        mode: PlayMode,
        history_write_pos: usize,
        history_ready: bool,
        beat_indicator: bool,
        trigger_indicator: bool,
    ) {
        self.bpm_bits.store(bpm.to_bits(), Ordering::Relaxed);
        self.active_grains.store(pool.active_count(), Ordering::Relaxed);
        self.history_write_pos
            .store(history_write_pos, Ordering::Relaxed);
        self.history_ready.store(history_ready, Ordering::Relaxed);
        self.beat_indicator.store(beat_indicator, Ordering::Relaxed);
        self.trigger_indicator
            .store(trigger_indicator, Ordering::Relaxed);
        for (cell, grain) in self.grains.iter().zip(pool.grains().iter()) {
            cell.active.store(grain.is_active(), Ordering::Relaxed);
            if grain.is_active() {
                cell.position.store(grain.read_index(mode), Ordering::Relaxed);
                cell.pitch_bits
                    .store(grain.pitch().to_bits(), Ordering::Relaxed);
            }
        }
    }

    pub fn bpm(&self) -> f32 {
        f32::from_bits(self.bpm_bits.load(Ordering::Relaxed))
    }

    pub fn active_grains(&self) -> usize {
        self.active_grains.load(Ordering::Relaxed)
    }

    pub fn history_write_pos(&self) -> usize {
        self.history_write_pos.load(Ordering::Relaxed)
    }

    pub fn history_ready(&self) -> bool {
        self.history_ready.load(Ordering::Relaxed)
    }

    pub fn beat_indicator(&self) -> bool {
        self.beat_indicator.load(Ordering::Relaxed)
    }

    pub fn trigger_indicator(&self) -> bool {
        self.trigger_indicator.load(Ordering::Relaxed)
    }

    pub fn grains(&self) -> &[GrainCell; GrainPool::CAPACITY] {
        &self.grains
    }

    /// Force a display redraw.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::Relaxed);
    }

    /// Monotonic redraw epoch. A display remembers the last value it drew
    /// and redraws when it changes.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }
}

impl Default for EngineView {
    fn default() -> Self {
        Self::new()
    }
}
