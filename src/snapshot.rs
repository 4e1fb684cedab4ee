//! Parameter snapshot slots.

use rand::Rng;

use crate::{
    dejavu::DejaVuRing,
    dsp::luts::{Luts, FEEDBACK_LUT_SIZE},
    params::{
        GranParams, MacroMode, PlayMode, DEFAULT_RESOLUTION_INDEX, PITCH_RANDOM_MAX,
        PITCH_RANDOM_MIN, RESOLUTIONS,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Everything a snapshot slot stores: the live params plus the macro knob
/// assignment. The macro assignment is captured for completeness but is
/// deliberately not restored on load, so recalling a snapshot never yanks
/// the knob the player is currently using onto a different parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullParamSnapshot {
    pub params: GranParams,
    pub macro_mode: MacroMode,
}

// -------------------------------------------------------------------------------------------------

/// Four snapshot slots with per-slot initialization flags.
pub struct SnapshotBank {
    slots: [Option<FullParamSnapshot>; Self::SLOTS],
}

impl SnapshotBank {
    pub const SLOTS: usize = 4;

    pub fn new() -> Self {
        Self {
            slots: [None; Self::SLOTS],
        }
    }

    pub fn is_initialized(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(Option::is_some)
    }

    /// Capture the live params and macro assignment into a slot.
    pub fn save(
        &mut self,
        slot: usize,
        params: &GranParams,
        macro_mode: MacroMode,
    ) -> Result<(), Error> {
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(Error::SnapshotSlotInvalid(slot))?;
        *entry = Some(FullParamSnapshot {
            params: *params,
            macro_mode,
        });
        log::info!("Snapshot {} saved", slot + 1);
        Ok(())
    }

    /// Recall a slot into the live params. The stored macro assignment is
    /// left alone and the resolution index is clamped into range.
    pub fn load(&self, slot: usize, params: &mut GranParams) -> Result<(), Error> {
        let entry = self.slots.get(slot).ok_or(Error::SnapshotSlotInvalid(slot))?;
        let snapshot = entry.ok_or(Error::SnapshotNotInitialized(slot))?;
        *params = snapshot.params;
        params.resolution_index = params
            .resolution_index
            .min(RESOLUTIONS.len() as u8 - 1);
        log::info!("Snapshot {} loaded", slot + 1);
        Ok(())
    }

    /// Fill every slot with random content, as done at startup and when all
    /// snapshots are reseeded. The first three slots come up fully wet so a
    /// fresh recall is audible; the last comes up dry as a bypass preset.
    pub fn randomize_all<R: Rng>(&mut self, rng: &mut R, luts: &Luts) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let params = GranParams {
                position_q15: rng.random_range(0..32768) as i16,
                size_q15: 1000 + rng.random_range(0..31767) as i16,
                pitch: rng.random_range(PITCH_RANDOM_MIN..=PITCH_RANDOM_MAX),
                deja_vu_q15: rng.random_range(0..32768) as i16,
                texture_q15: rng.random_range(0..32768) as i16,
                spread_q15: rng.random_range(0..32768) as i16,
                feedback_q15: luts.feedback_entry(rng.random_range(0..FEEDBACK_LUT_SIZE)),
                dry_wet_q15: if i < 3 { 32767 } else { 0 },
                loop_length: 2 + rng.random_range(0..DejaVuRing::LENGTH as u8 - 1),
                resolution_index: DEFAULT_RESOLUTION_INDEX + rng.random_range(0..4),
                mode: if rng.random::<bool>() {
                    PlayMode::Forward
                } else {
                    PlayMode::Reverse
                },
            };
            let macro_mode = MacroMode::from_repr(
                rng.random_range(0..<MacroMode as strum::EnumCount>::COUNT as u8),
            )
            .unwrap_or_default();
            *slot = Some(FullParamSnapshot { params, macro_mode });
        }
    }
}

impl Default for SnapshotBank {
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
    fn save_then_load_round_trips_params() {
        let mut bank = SnapshotBank::new();
        let saved = GranParams {
            position_q15: 11111,
            pitch: 4.0,
            mode: PlayMode::Reverse,
            ..Default::default()
        };
        bank.save(2, &saved, MacroMode::Feedback).unwrap();
        let mut live = GranParams::default();
        bank.load(2, &mut live).unwrap();
        assert_eq!(live, saved);
    }

    #[test]
    fn load_does_not_restore_macro_mode() {
        let mut bank = SnapshotBank::new();
        bank.save(0, &GranParams::default(), MacroMode::LoopLength)
            .unwrap();
        // the caller's macro mode is not an output of load at all; verify
        // the stored one stays confined to the slot
        let mut live = GranParams::default();
        bank.load(0, &mut live).unwrap();
        assert_eq!(bank.slots[0].unwrap().macro_mode, MacroMode::LoopLength);
    }

    #[test]
    fn uninitialized_and_invalid_slots_fail() {
        let mut bank = SnapshotBank::new();
        assert!(matches!(
            bank.load(1, &mut GranParams::default()),
            Err(Error::SnapshotNotInitialized(1))
        ));
        assert!(matches!(
            bank.load(9, &mut GranParams::default()),
            Err(Error::SnapshotSlotInvalid(9))
        ));
        assert!(matches!(
            bank.save(9, &GranParams::default(), MacroMode::Texture),
            Err(Error::SnapshotSlotInvalid(9))
        ));
    }

    #[test]
    fn randomized_slots_are_valid_and_mostly_wet() {
        let mut bank = SnapshotBank::new();
        let luts = Luts::new();
        let mut rng = SmallRng::seed_from_u64(42);
        bank.randomize_all(&mut rng, &luts);
        for slot in 0..SnapshotBank::SLOTS {
            assert!(bank.is_initialized(slot));
            let mut params = GranParams::default();
            bank.load(slot, &mut params).unwrap();
            params.validate().unwrap();
            assert_eq!(params.dry_wet_q15, if slot < 3 { 32767 } else { 0 });
            assert!((2..=16).contains(&params.loop_length));
            assert!((3..=6).contains(&params.resolution_index));
        }
    }
}
