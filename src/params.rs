//! Live engine parameters and their lock free shared mirror.

use std::sync::atomic::{AtomicI16, AtomicU32, AtomicU8, Ordering};

use crate::{dejavu::DejaVuRing, dsp::luts::PITCH_MAX_SEMITONES, Error};

// -------------------------------------------------------------------------------------------------

/// Grain playback direction.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::FromRepr, strum::EnumCount,
)]
#[repr(u8)]
pub enum PlayMode {
    /// Grains read the history forwards.
    #[default]
    Forward,
    /// Grains read the history backwards.
    Reverse,
}

/// What the macro knob edits. Cycled by the macro button.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::FromRepr, strum::EnumCount,
)]
#[repr(u8)]
pub enum MacroMode {
    /// Random variation applied to spawned grains.
    #[default]
    Texture,
    /// Stereo placement range of spawned grains.
    Spread,
    /// Feedback amount in the wet path.
    Feedback,
    /// Déjà-vu loop length, 2..=16 steps.
    LoopLength,
    /// Trigger clock resolution index.
    Resolution,
}

impl MacroMode {
    /// The mode after this one, wrapping around.
    pub fn next(self) -> Self {
        Self::from_repr((self as u8 + 1) % <Self as strum::EnumCount>::COUNT as u8)
            .unwrap_or_default()
    }
}

// -------------------------------------------------------------------------------------------------

/// Trigger clock divisions and multiples of the tapped beat.
pub const RESOLUTIONS: [f32; 7] = [0.25, 1.0 / 3.0, 0.5, 1.0, 2.0, 3.0, 4.0];

/// Index into [`RESOLUTIONS`] for the plain tapped beat.
pub const DEFAULT_RESOLUTION_INDEX: u8 = 3;

/// Lower bound of the randomized pitch range, in semitones.
pub const PITCH_RANDOM_MIN: f32 = -20.0;
/// Upper bound of the randomized pitch range, in semitones.
pub const PITCH_RANDOM_MAX: f32 = 7.0;

// -------------------------------------------------------------------------------------------------

/// The complete set of live granular parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GranParams {
    /// Grain start position in the history window, Q15. 0 is now.
    pub position_q15: i16,
    /// Grain size, Q15.
    pub size_q15: i16,
    /// Pitch shift in semitones, `-PITCH_MAX_SEMITONES..=PITCH_MAX_SEMITONES`.
    pub pitch: f32,
    /// Probability of replaying the stored step, Q15.
    pub deja_vu_q15: i16,
    /// Random variation amount, Q15.
    pub texture_q15: i16,
    /// Stereo spread amount, Q15.
    pub spread_q15: i16,
    /// Feedback gain, Q15.
    pub feedback_q15: i16,
    /// Dry/wet mix, Q15. 0 is fully dry.
    pub dry_wet_q15: i16,
    /// Déjà-vu loop length in steps, 2..=16.
    pub loop_length: u8,
    /// Trigger clock resolution, index into [`RESOLUTIONS`].
    pub resolution_index: u8,
    pub mode: PlayMode,
}

impl Default for GranParams {
    fn default() -> Self {
        Self {
            position_q15: 0,
            size_q15: 8192,
            pitch: 0.0,
            deja_vu_q15: 16384,
            texture_q15: 0,
            spread_q15: 29490,
            feedback_q15: 9830,
            dry_wet_q15: 16384,
            loop_length: DejaVuRing::LENGTH as u8,
            resolution_index: DEFAULT_RESOLUTION_INDEX,
            mode: PlayMode::Forward,
        }
    }
}

impl GranParams {
    /// Verify that all fields sit within their documented ranges.
    pub fn validate(&self) -> Result<(), Error> {
        if self.position_q15 < 0
            || self.size_q15 < 0
            || self.deja_vu_q15 < 0
            || self.texture_q15 < 0
            || self.spread_q15 < 0
            || self.feedback_q15 < 0
            || self.dry_wet_q15 < 0
        {
            return Err(Error::ParameterError(
                "Q15 parameters must not be negative".to_string(),
            ));
        }
        if !self.pitch.is_finite() || self.pitch.abs() > PITCH_MAX_SEMITONES {
            return Err(Error::ParameterError(format!(
                "Pitch out of range: {}",
                self.pitch
            )));
        }
        if self.loop_length < 2 || self.loop_length as usize > DejaVuRing::LENGTH {
            return Err(Error::ParameterError(format!(
                "Invalid loop length: {}",
                self.loop_length
            )));
        }
        if self.resolution_index as usize >= RESOLUTIONS.len() {
            return Err(Error::ParameterError(format!(
                "Invalid resolution index: {}",
                self.resolution_index
            )));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Lock free mirror of [`GranParams`], shared between the control thread
/// and the audio thread. Every field is a single machine word, so plain
/// relaxed loads and stores are sufficient: the audio thread picks up each
/// value at the next sample boundary, and no field depends on another being
/// observed in the same instant.
pub struct SharedParams {
    position_q15: AtomicI16,
    size_q15: AtomicI16,
    pitch_bits: AtomicU32,
    deja_vu_q15: AtomicI16,
    texture_q15: AtomicI16,
    spread_q15: AtomicI16,
    feedback_q15: AtomicI16,
    dry_wet_q15: AtomicI16,
    loop_length: AtomicU8,
    resolution_index: AtomicU8,
    mode: AtomicU8,
}

impl SharedParams {
    pub fn new(params: GranParams) -> Self {
        Self {
            position_q15: AtomicI16::new(params.position_q15),
            size_q15: AtomicI16::new(params.size_q15),
            pitch_bits: AtomicU32::new(params.pitch.to_bits()),
            deja_vu_q15: AtomicI16::new(params.deja_vu_q15),
            texture_q15: AtomicI16::new(params.texture_q15),
            spread_q15: AtomicI16::new(params.spread_q15),
            feedback_q15: AtomicI16::new(params.feedback_q15),
            dry_wet_q15: AtomicI16::new(params.dry_wet_q15),
            loop_length: AtomicU8::new(params.loop_length),
            resolution_index: AtomicU8::new(params.resolution_index),
            mode: AtomicU8::new(params.mode as u8),
        }
    }

    /// Snapshot all fields, for the audio thread and for display.
    pub fn load(&self) -> GranParams {
        GranParams {
            position_q15: self.position_q15.load(Ordering::Relaxed),
            size_q15: self.size_q15.load(Ordering::Relaxed),
            pitch: f32::from_bits(self.pitch_bits.load(Ordering::Relaxed)),
            deja_vu_q15: self.deja_vu_q15.load(Ordering::Relaxed),
            texture_q15: self.texture_q15.load(Ordering::Relaxed),
            spread_q15: self.spread_q15.load(Ordering::Relaxed),
            feedback_q15: self.feedback_q15.load(Ordering::Relaxed),
            dry_wet_q15: self.dry_wet_q15.load(Ordering::Relaxed),
            loop_length: self.loop_length.load(Ordering::Relaxed),
            resolution_index: self.resolution_index.load(Ordering::Relaxed),
            mode: PlayMode::from_repr(self.mode.load(Ordering::Relaxed)).unwrap_or_default(),
        }
    }

    /// Publish all fields at once, as done when loading a snapshot.
    pub fn store(&self, params: GranParams) {
        self.position_q15.store(params.position_q15, Ordering::Relaxed);
        self.size_q15.store(params.size_q15, Ordering::Relaxed);
        self.pitch_bits.store(params.pitch.to_bits(), Ordering::Relaxed);
        self.deja_vu_q15.store(params.deja_vu_q15, Ordering::Relaxed);
        self.texture_q15.store(params.texture_q15, Ordering::Relaxed);
        self.spread_q15.store(params.spread_q15, Ordering::Relaxed);
        self.feedback_q15.store(params.feedback_q15, Ordering::Relaxed);
        self.dry_wet_q15.store(params.dry_wet_q15, Ordering::Relaxed);
        self.loop_length.store(params.loop_length, Ordering::Relaxed);
        self.resolution_index
            .store(params.resolution_index, Ordering::Relaxed);
        self.mode.store(params.mode as u8, Ordering::Relaxed);
    }

    pub fn set_position(&self, value: i16) {
        self.position_q15.store(value, Ordering::Relaxed);
    }
    pub fn set_size(&self, value: i16) {
        self.size_q15.store(value, Ordering::Relaxed);
    }
    pub fn set_pitch(&self, value: f32) {
        self.pitch_bits.store(value.to_bits(), Ordering::Relaxed);
    }
    pub fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch_bits.load(Ordering::Relaxed))
    }
    pub fn set_deja_vu(&self, value: i16) {
        self.deja_vu_q15.store(value, Ordering::Relaxed);
    }
    pub fn set_texture(&self, value: i16) {
        self.texture_q15.store(value, Ordering::Relaxed);
    }
    pub fn set_spread(&self, value: i16) {
        self.spread_q15.store(value, Ordering::Relaxed);
    }
    pub fn set_feedback(&self, value: i16) {
        self.feedback_q15.store(value, Ordering::Relaxed);
    }
    pub fn set_dry_wet(&self, value: i16) {
        self.dry_wet_q15.store(value, Ordering::Relaxed);
    }
    pub fn set_loop_length(&self, value: u8) {
        self.loop_length.store(value, Ordering::Relaxed);
    }
    pub fn set_resolution_index(&self, value: u8) {
        self.resolution_index.store(value, Ordering::Relaxed);
    }
    pub fn mode(&self) -> PlayMode {
        PlayMode::from_repr(self.mode.load(Ordering::Relaxed)).unwrap_or_default()
    }
    pub fn set_mode(&self, mode: PlayMode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }
    pub fn resolution_index(&self) -> u8 {
        self.resolution_index.load(Ordering::Relaxed)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macro_mode_cycles_through_all_modes() {
        let mut mode = MacroMode::Texture;
        let mut seen = vec![mode];
        for _ in 0..4 {
            mode = mode.next();
            seen.push(mode);
        }
        assert_eq!(mode.next(), MacroMode::Texture);
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn shared_params_round_trip() {
        let params = GranParams {
            position_q15: 12345,
            pitch: -7.5,
            mode: PlayMode::Reverse,
            loop_length: 5,
            ..Default::default()
        };
        let shared = SharedParams::new(GranParams::default());
        shared.store(params);
        assert_eq!(shared.load(), params);
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        assert!(GranParams::default().validate().is_ok());
        assert!(GranParams {
            pitch: 25.0,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(GranParams {
            pitch: f32::NAN,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(GranParams {
            loop_length: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(GranParams {
            loop_length: 1,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(GranParams {
            loop_length: 2,
            ..Default::default()
        }
        .validate()
        .is_ok());
        assert!(GranParams {
            resolution_index: 7,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(GranParams {
            position_q15: -1,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
