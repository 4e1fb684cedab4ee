//! Déjà-vu sequencer: a 16 step ring of grain parameter snapshots.
//!
//! Each trigger either replays the snapshot stored at the current step or
//! captures a freshly jittered one, depending on the déjà-vu probability.
//! Replayed steps make the grain stream loop; fresh steps let it drift.

use rand::Rng;

// -------------------------------------------------------------------------------------------------

/// Effective grain parameters as captured at trigger time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSnapshot {
    /// Position in the history window, Q15.
    pub position_q15: i16,
    /// Grain size, Q15.
    pub size_q15: i16,
    /// Pitch in semitones.
    pub pitch: f32,
    /// Texture amount the step was captured with, Q15.
    pub texture_q15: i16,
}

impl Default for StepSnapshot {
    fn default() -> Self {
        Self {
            position_q15: 0,
            size_q15: 1000,
            pitch: 0.0,
            texture_q15: 0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Fixed ring of [`StepSnapshot`]s with a step cursor that wraps at the
/// full ring length. The loop length parameter truncates which steps are
/// addressed without moving the cursor itself.
pub struct DejaVuRing {
    steps: [StepSnapshot; Self::LENGTH],
    cursor: usize,
}

impl DejaVuRing {
    pub const LENGTH: usize = 16;

    pub fn new() -> Self {
        Self {
            steps: [StepSnapshot::default(); Self::LENGTH],
            cursor: 0,
        }
    }

    /// Resolve the current trigger's snapshot. When `replay` is set the
    /// stored step comes back verbatim, otherwise the live `base` params get
    /// a texture scaled random offset applied and the result both replaces
    /// the step and is returned. `loop_length` folds the cursor into the
    /// active loop.
    pub fn select<R: Rng>(
        &mut self,
        replay: bool,
        loop_length: usize,
        base: StepSnapshot,
        rng: &mut R,
    ) -> StepSnapshot {
        debug_assert!(loop_length >= 1 && loop_length <= Self::LENGTH);
        let step = self.cursor % loop_length.max(1);
        if replay {
            self.steps[step]
        } else {
            let texture = base.texture_q15 as i32;
            let position_q15 = (base.position_q15 as i32
                + ((texture * rng.random_range(-32767..=32767)) >> 14))
                .clamp(0, 32767) as i16;
            let size_q15 = (base.size_q15 as i32
                + ((texture * rng.random_range(-32767..=32767)) >> 15))
                .clamp(1000, 32767) as i16;
            let pitch = base.pitch
                + texture as f32 / 32767.0
                    * 5.0
                    * (rng.random_range(-32767..=32767) as f32 / 32767.0);
            let snapshot = StepSnapshot {
                position_q15,
                size_q15,
                pitch,
                texture_q15: base.texture_q15,
            };
            self.steps[step] = snapshot;
            snapshot
        }
    }

    /// Advance the step cursor by one trigger.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % Self::LENGTH;
    }

    /// Rewind the cursor to step zero.
    pub fn reset_step(&mut self) {
        self.cursor = 0;
    }

    /// Refill every step with random content, as done at startup and on a
    /// full randomize.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        for step in self.steps.iter_mut() {
            *step = StepSnapshot {
                position_q15: rng.random_range(0..32768) as i16,
                size_q15: rng.random_range(1000..32768) as i16,
                pitch: rng.random_range(-120..120) as f32 / 10.0,
                texture_q15: rng.random_range(0..32768) as i16,
            };
        }
    }
}

impl Default for DejaVuRing {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;

    #[test]
    fn replay_returns_the_stored_step() {
        let mut ring = DejaVuRing::new();
        let mut rng = SmallRng::seed_from_u64(7);
        let base = StepSnapshot {
            position_q15: 16000,
            size_q15: 12000,
            pitch: 3.0,
            texture_q15: 20000,
        };
        // capture a fresh snapshot at step 0, then replay it
        let fresh = ring.select(false, DejaVuRing::LENGTH, base, &mut rng);
        let replayed = ring.select(true, DejaVuRing::LENGTH, base, &mut rng);
        assert_eq!(fresh, replayed);
    }

    #[test]
    fn loop_length_folds_the_cursor() {
        let mut ring = DejaVuRing::new();
        let mut rng = SmallRng::seed_from_u64(7);
        let base = StepSnapshot::default();
        let first = ring.select(false, 4, base, &mut rng);
        for _ in 0..4 {
            ring.advance();
        }
        // cursor is at 4, but a loop of 4 folds it back onto step 0
        let replayed = ring.select(true, 4, base, &mut rng);
        assert_eq!(first, replayed);
    }

    #[test]
    fn cursor_wraps_at_ring_length() {
        let mut ring = DejaVuRing::new();
        for _ in 0..DejaVuRing::LENGTH {
            ring.advance();
        }
        assert_eq!(ring.cursor, 0);
    }

    #[test]
    fn zero_texture_captures_the_base_params() {
        let mut ring = DejaVuRing::new();
        let mut rng = SmallRng::seed_from_u64(3);
        let base = StepSnapshot {
            position_q15: 8000,
            size_q15: 5000,
            pitch: -6.0,
            texture_q15: 0,
        };
        let snapshot = ring.select(false, DejaVuRing::LENGTH, base, &mut rng);
        assert_eq!(snapshot, base);
    }

    #[test]
    fn fresh_snapshots_stay_in_range() {
        let mut ring = DejaVuRing::new();
        let mut rng = SmallRng::seed_from_u64(99);
        let base = StepSnapshot {
            position_q15: 16384,
            size_q15: 16384,
            pitch: 0.0,
            texture_q15: 32767,
        };
        for _ in 0..64 {
            let snapshot = ring.select(false, DejaVuRing::LENGTH, base, &mut rng);
            assert!(snapshot.position_q15 >= 0);
            assert!(snapshot.size_q15 >= 1000);
            assert!(snapshot.pitch.abs() <= 5.0);
            ring.advance();
        }
    }
}
