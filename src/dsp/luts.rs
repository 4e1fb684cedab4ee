//! Precomputed lookup tables for the granular engine.
//!
//! Every transcendental or division the per-sample and per-trigger paths
//! would otherwise need is replaced by a table built once at startup and
//! read back with linear interpolation. The two jitter tables are the only
//! non-deterministic ones; they are filled from the engine's RNG and only
//! need to be statistically uniform.

use rand::{rngs::SmallRng, Rng};

use crate::dsp::{Q15_ONE, Q16_ONE};

// -------------------------------------------------------------------------------------------------

pub const WINDOW_LUT_SIZE: usize = 128;
pub const PITCH_LUT_SIZE: usize = 257;
pub const PAN_LUT_SIZE: usize = 257;
pub const MIX_LUT_SIZE: usize = 256;
pub const FEEDBACK_LUT_SIZE: usize = 256;
pub const RECIPROCAL_LUT_SIZE: usize = 256;
pub const RANDOM_LUT_SIZE: usize = 256;
pub const RANDOM_PAN_LUT_SIZE: usize = 128;

/// Total pitch span covered by the pitch table, in semitones.
pub const PITCH_RANGE_SEMITONES: f32 = 48.0;
/// Pitch extremes, in semitones around unity.
pub const PITCH_MAX_SEMITONES: f32 = PITCH_RANGE_SEMITONES / 2.0;

/// Precomputed scale to map semitones to a pitch table index without a
/// division in the trigger path.
const PITCH_LUT_SCALE: f32 = (PITCH_LUT_SIZE - 1) as f32 / PITCH_RANGE_SEMITONES;

/// Feedback gains are generated in a sub-unity band so the feedback loop can
/// never run away.
const FEEDBACK_LUT_MIN: f32 = 0.1;
const FEEDBACK_LUT_RANGE: f32 = 0.5;

/// Shortest and longest grain the reciprocal table covers, in samples.
pub const MIN_GRAIN_LEN: usize = 512;
pub const MAX_GRAIN_LEN: usize = 32768;

/// Slowest and fastest grain playback speeds in Q16 (-24..+24 semitones).
pub const MIN_SPEED_Q16: i32 = 1 << 14;
pub const MAX_SPEED_Q16: i32 = 4 << 16;

// -------------------------------------------------------------------------------------------------

/// The deterministic lookup tables, built once at startup.
pub struct Luts {
    window_q15: [i16; WINDOW_LUT_SIZE],
    pitch_q16: [i32; PITCH_LUT_SIZE],
    pan_q15: [i16; PAN_LUT_SIZE],
    mix_q15: [i16; MIX_LUT_SIZE],
    feedback_q15: [i16; FEEDBACK_LUT_SIZE],
    reciprocal_q32: [u32; RECIPROCAL_LUT_SIZE],
}

impl Luts {
    pub fn new() -> Self {
        // Squared Hann window for the grain envelope.
        let mut window_q15 = [0; WINDOW_LUT_SIZE];
        for (i, value) in window_q15.iter_mut().enumerate() {
            let t = i as f32 / (WINDOW_LUT_SIZE - 1) as f32;
            let w = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos());
            *value = ((w * w) * Q15_ONE as f32) as i16;
        }

        // Exponential pitch-to-speed curve over the full semitone span.
        let mut pitch_q16 = [0; PITCH_LUT_SIZE];
        for (i, value) in pitch_q16.iter_mut().enumerate() {
            let s = (i as f32 / (PITCH_LUT_SIZE - 1) as f32) * PITCH_RANGE_SEMITONES
                - PITCH_MAX_SEMITONES;
            *value = ((s / 12.0).exp2() * Q16_ONE as f32) as i32;
        }

        // Quarter sine for equal-power panning.
        let mut pan_q15 = [0; PAN_LUT_SIZE];
        for (i, value) in pan_q15.iter_mut().enumerate() {
            let a = (i as f32 / (PAN_LUT_SIZE - 1) as f32) * (std::f32::consts::PI * 0.5);
            *value = (a.sin() * Q15_ONE as f32) as i16;
        }

        // Linear dry/wet mix gains.
        let mut mix_q15 = [0; MIX_LUT_SIZE];
        for (i, value) in mix_q15.iter_mut().enumerate() {
            *value = ((i as i32 * Q15_ONE as i32) / (MIX_LUT_SIZE - 1) as i32) as i16;
        }

        // Feedback gains, linear within the safe band.
        let mut feedback_q15 = [0; FEEDBACK_LUT_SIZE];
        for (i, value) in feedback_q15.iter_mut().enumerate() {
            let f = FEEDBACK_LUT_MIN
                + (i as f32 / (FEEDBACK_LUT_SIZE - 1) as f32) * FEEDBACK_LUT_RANGE;
            *value = (f * Q15_ONE as f32) as i16;
        }

        // Q32 reciprocals of grain lengths, used to turn a position within a
        // grain into a window table index without dividing.
        let mut reciprocal_q32 = [0; RECIPROCAL_LUT_SIZE];
        for (i, value) in reciprocal_q32.iter_mut().enumerate() {
            let len = MIN_GRAIN_LEN
                + ((MAX_GRAIN_LEN - MIN_GRAIN_LEN) * i) / (RECIPROCAL_LUT_SIZE - 1);
            *value = (((1u64 << 32) - 1) / len as u64) as u32;
        }

        Self {
            window_q15,
            pitch_q16,
            pan_q15,
            mix_q15,
            feedback_q15,
            reciprocal_q32,
        }
    }

    /// Window envelope gain at the given table index, clamped to the table.
    #[inline]
    pub fn window(&self, index: usize) -> i16 {
        self.window_q15[index.min(WINDOW_LUT_SIZE - 1)]
    }

    /// Map a pitch in semitones to a Q16 playback speed, with linear
    /// interpolation between table entries. Non-finite pitches are treated
    /// as unity; the result is clamped to the supported speed range.
    pub fn speed_for_pitch(&self, pitch: f32) -> i32 {
        let pitch = if pitch.is_finite() { pitch } else { 0.0 };
        let index_f = ((pitch + PITCH_MAX_SEMITONES) * PITCH_LUT_SCALE)
            .clamp(0.0, (PITCH_LUT_SIZE - 2) as f32);

        let index = index_f as usize;
        let frac_q8 = ((index_f - index as f32) * 256.0) as i32;
        let y0 = self.pitch_q16[index];
        let y1 = self.pitch_q16[index + 1];
        let speed = y0 + (((y1 - y0) * frac_q8) >> 8);
        speed.clamp(MIN_SPEED_Q16, MAX_SPEED_Q16)
    }

    /// Equal-power (left, right) Q15 gains for a pan position in `0..=1`
    /// (0 = full left, 1 = full right). The left gain reads the table at the
    /// mirrored index so the pair always sits on the same power curve.
    pub fn pan_gains(&self, pan: f32) -> (i16, i16) {
        let pan = if pan.is_finite() {
            pan.clamp(0.0, 1.0)
        } else {
            0.5
        };

        let index_f = pan * (PAN_LUT_SIZE - 1) as f32;
        let right = self.pan_interpolate(index_f);
        let left = self.pan_interpolate((PAN_LUT_SIZE - 1) as f32 - index_f);
        (left, right)
    }

    fn pan_interpolate(&self, index_f: f32) -> i16 {
        let index = (index_f as usize).min(PAN_LUT_SIZE - 2);
        let frac_q8 = ((index_f - index as f32) * 256.0) as i32;
        let y0 = self.pan_q15[index] as i32;
        let y1 = self.pan_q15[index + 1] as i32;
        (y0 + (((y1 - y0) * frac_q8) >> 8)) as i16
    }

    /// Dry/wet gain for a normalized control reading.
    #[inline]
    pub fn mix(&self, normalized: f32) -> i16 {
        let index = (normalized.clamp(0.0, 1.0) * (MIX_LUT_SIZE - 1) as f32) as usize;
        self.mix_q15[index.min(MIX_LUT_SIZE - 1)]
    }

    /// Feedback gain for a normalized control reading.
    #[inline]
    pub fn feedback(&self, normalized: f32) -> i16 {
        self.feedback_entry((normalized.clamp(0.0, 1.0) * (FEEDBACK_LUT_SIZE - 1) as f32) as usize)
    }

    /// Feedback gain at a raw table index, clamped to the table.
    #[inline]
    pub fn feedback_entry(&self, index: usize) -> i16 {
        self.feedback_q15[index.min(FEEDBACK_LUT_SIZE - 1)]
    }

    /// Q32 reciprocal for a grain length in samples.
    pub fn reciprocal_for(&self, length: usize) -> u32 {
        debug_assert!((MIN_GRAIN_LEN..=MAX_GRAIN_LEN).contains(&length));
        let index = ((length - MIN_GRAIN_LEN) * (RECIPROCAL_LUT_SIZE - 1))
            / (MAX_GRAIN_LEN - MIN_GRAIN_LEN);
        self.reciprocal_q32[index.min(RECIPROCAL_LUT_SIZE - 1)]
    }
}

impl Default for Luts {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

/// Pre-generated uniform random sequences consumed by the grain trigger
/// path. Cheaper than drawing from the RNG per spawn, and plenty random for
/// parameter jitter. Indices wrap at the table sizes.
pub struct JitterTables {
    random_q15: [i16; RANDOM_LUT_SIZE],
    random_pan: [f32; RANDOM_PAN_LUT_SIZE],
    random_index: u8,
    pan_index: u8,
}

impl JitterTables {
    pub fn new(rng: &mut SmallRng) -> Self {
        let mut random_q15 = [0; RANDOM_LUT_SIZE];
        for value in random_q15.iter_mut() {
            *value = rng.random_range(-32767..=32767);
        }
        let mut random_pan = [0.0; RANDOM_PAN_LUT_SIZE];
        for value in random_pan.iter_mut() {
            *value = rng.random::<f32>() * 2.0 - 1.0;
        }
        Self {
            random_q15,
            random_pan,
            random_index: 0,
            pan_index: 0,
        }
    }

    /// Next Q15 jitter value in `-32767..=32767`.
    #[inline]
    pub fn next_q15(&mut self) -> i16 {
        let value = self.random_q15[self.random_index as usize & (RANDOM_LUT_SIZE - 1)];
        self.random_index = self.random_index.wrapping_add(1);
        value
    }

    /// Next pan jitter value in `-1.0..=1.0`.
    #[inline]
    pub fn next_pan(&mut self) -> f32 {
        let value = self.random_pan[self.pan_index as usize & (RANDOM_PAN_LUT_SIZE - 1)];
        self.pan_index = self.pan_index.wrapping_add(1);
        value
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn window_is_symmetric() {
        let luts = Luts::new();
        // both ends map to (near) zero gain, the midpoint to (near) max
        assert_eq!(luts.window(0), 0);
        assert_eq!(luts.window(WINDOW_LUT_SIZE - 1), 0);
        assert!(luts.window(WINDOW_LUT_SIZE / 2) > 32000);
        for i in 0..WINDOW_LUT_SIZE / 2 {
            assert_eq!(luts.window(i), luts.window(WINDOW_LUT_SIZE - 1 - i));
        }
        // out of range indices clamp instead of panicking
        assert_eq!(luts.window(100_000), 0);
    }

    #[test]
    fn pitch_table_hits_known_speeds() {
        let luts = Luts::new();
        assert_eq!(luts.speed_for_pitch(0.0), Q16_ONE);
        assert_eq!(luts.speed_for_pitch(12.0), 2 * Q16_ONE);
        assert_eq!(luts.speed_for_pitch(-24.0), MIN_SPEED_Q16);
        // out of range and non-finite pitches clamp into the table
        assert!(luts.speed_for_pitch(1000.0) <= MAX_SPEED_Q16);
        assert_eq!(luts.speed_for_pitch(f32::NAN), Q16_ONE);
    }

    #[test]
    fn pan_curve_is_equal_power() {
        let luts = Luts::new();
        let (center_l, center_r) = luts.pan_gains(0.5);
        assert_eq!(center_l, center_r);
        assert!((center_l as i32 - 23170).abs() < 64); // ~0.707 in Q15

        let (hard_l_l, hard_l_r) = luts.pan_gains(0.0);
        assert!(hard_l_l > 32700);
        assert!(hard_l_r <= 64);

        let (hard_r_l, hard_r_r) = luts.pan_gains(1.0);
        assert!(hard_r_r > 32700);
        assert!(hard_r_l <= 64);
    }

    #[test]
    fn reciprocal_maps_positions_into_the_window_table() {
        let luts = Luts::new();
        // for lengths on the table grid, the last in-grain position lands on
        // the last window entry; off-grid lengths overshoot slightly and are
        // clamped by the render path
        for i in [0, 10, 100, RECIPROCAL_LUT_SIZE - 1] {
            let length = MIN_GRAIN_LEN
                + ((MAX_GRAIN_LEN - MIN_GRAIN_LEN) * i) / (RECIPROCAL_LUT_SIZE - 1);
            let reciprocal = luts.reciprocal_for(length) as u64;
            let last_index = ((length as u64 - 1) * reciprocal) >> 25;
            assert!(
                last_index < WINDOW_LUT_SIZE as u64,
                "length {length} maps its last position to window index {last_index}"
            );
        }
    }

    #[test]
    fn feedback_band_is_sub_unity() {
        let luts = Luts::new();
        let min = luts.feedback_entry(0);
        let max = luts.feedback_entry(FEEDBACK_LUT_SIZE - 1);
        assert!((min as f32 / Q15_ONE as f32 - 0.1).abs() < 0.01);
        assert!((max as f32 / Q15_ONE as f32 - 0.6).abs() < 0.01);
    }

    #[test]
    fn jitter_tables_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(999);
        let mut jitter = JitterTables::new(&mut rng);
        for _ in 0..RANDOM_LUT_SIZE * 2 {
            let value = jitter.next_q15();
            assert!((-32767..=32767).contains(&value));
        }
        for _ in 0..RANDOM_PAN_LUT_SIZE * 2 {
            let value = jitter.next_pan();
            assert!((-1.0..=1.0).contains(&value));
        }
    }
}
