//! Control surface: buttons, pots, snapshots and the soft takeover logic.
//!
//! The controller runs on a non realtime thread. It owns the snapshot bank
//! and the macro knob assignment and publishes parameter changes to the
//! audio thread through [`SharedParams`], tap times through the
//! [`TriggerLine`] and structural changes through the engine command queue.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use rand::{rngs::SmallRng, Rng};

use crate::{
    dejavu::DejaVuRing,
    dsp::luts::{Luts, FEEDBACK_LUT_SIZE, PITCH_MAX_SEMITONES, PITCH_RANGE_SEMITONES},
    engine::EngineCommand,
    params::{
        GranParams, MacroMode, PlayMode, SharedParams, PITCH_RANDOM_MAX, PITCH_RANDOM_MIN,
        RESOLUTIONS,
    },
    snapshot::SnapshotBank,
    tempo::TriggerLine,
    view::EngineView,
};

// -------------------------------------------------------------------------------------------------

/// Press duration at which a button press counts as a long press.
pub const LONG_PRESS_US: u64 = 800_000;
/// Manual tap taps faster than this only set the tempo; slower ones also
/// fire an immediate grain trigger.
pub const TAP_RETRIGGER_TIMEOUT_US: u64 = 2_000_000;
/// How long the randomize and snapshot flash screens stay up.
pub const FLASH_DURATION_US: u64 = 200_000;

const TAKEOVER_DEADBAND: f32 = 0.03;

// -------------------------------------------------------------------------------------------------

/// The buttons of the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonControl {
    /// Tap tempo, doubling as trigger and randomize button.
    Tap,
    /// Cycles what the macro knob edits.
    MacroCycle,
    /// Toggles the play direction; long press reseeds all snapshots and
    /// the déjà-vu ring.
    PlayMode,
    /// Snapshot recall (short) and save (long), slots 0..=3.
    Snapshot(usize),
}

/// The knobs of the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PotControl {
    Position,
    Size,
    DejaVu,
    /// Edits whatever the current [`MacroMode`] selects.
    Macro,
    Pitch,
    DryWet,
}

/// A debounced, classified input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    ButtonPress { control: ButtonControl, long: bool },
    /// A knob moved. `value` is the normalized reading in `0..=1`.
    PotChange { control: PotControl, value: f32 },
}

// -------------------------------------------------------------------------------------------------

/// Pitch knob soft takeover.
///
/// After a snapshot load or randomize the stored pitch rarely matches the
/// physical knob, so applying the knob directly would jump the pitch. While
/// armed, knob readings are swallowed until one lands within the deadband
/// of the stored pitch's knob position or crosses over it.
pub struct SoftTakeover {
    active: bool,
    target: f32,
    last_value: Option<f32>,
}

impl SoftTakeover {
    pub fn new() -> Self {
        Self {
            active: false,
            target: 0.5,
            last_value: None,
        }
    }

    /// Arm against the knob position equivalent to `pitch` semitones.
    pub fn arm(&mut self, pitch: f32) {
        let mut target = pitch / PITCH_RANGE_SEMITONES + 0.5;
        if !target.is_finite() {
            target = 0.5;
        }
        self.target = target.clamp(0.0, 1.0);
        self.active = true;
        self.last_value = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed a knob reading. Returns true when the reading may be applied.
    pub fn accept(&mut self, value: f32) -> bool {
        if !self.active {
            return true;
        }
        let crossed = self
            .last_value
            .is_some_and(|last| (last < self.target) != (value < self.target));
        let caught = crossed || (value - self.target).abs() <= TAKEOVER_DEADBAND;
        self.last_value = Some(value);
        if caught {
            self.active = false;
        }
        caught
    }
}

impl Default for SoftTakeover {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

/// Owns all control side state and translates [`ControlEvent`]s into
/// parameter updates and engine commands.
pub struct Controller {
    shared: Arc<SharedParams>,
    view: Arc<EngineView>,
    trigger_line: Arc<TriggerLine>,
    commands: Arc<ArrayQueue<EngineCommand>>,
    luts: Arc<Luts>,
    bank: SnapshotBank,
    macro_mode: MacroMode,
    takeover: SoftTakeover,
    rng: SmallRng,
    last_manual_tap_us: u64,
    randomize_flash_until_us: u64,
    snapshot_flash: Option<(usize, u64)>,
}

impl Controller {
    /// Create the controller and seed the snapshot bank with random
    /// content, recalling slot 0 as the initial live state.
    pub fn new(
        shared: Arc<SharedParams>,
        view: Arc<EngineView>,
        trigger_line: Arc<TriggerLine>,
        commands: Arc<ArrayQueue<EngineCommand>>,
        luts: Arc<Luts>,
        mut rng: SmallRng,
    ) -> Self {
        let mut bank = SnapshotBank::new();
        bank.randomize_all(&mut rng, &luts);
        let mut params = shared.load();
        // slot 0 always exists after randomize_all
        if let Err(err) = bank.load(0, &mut params) {
            log::warn!("Failed to load initial snapshot: {err}");
        }
        shared.store(params);
        let mut takeover = SoftTakeover::new();
        takeover.arm(params.pitch);
        Self {
            shared,
            view,
            trigger_line,
            commands,
            luts,
            bank,
            macro_mode: MacroMode::default(),
            takeover,
            rng,
            last_manual_tap_us: 0,
            randomize_flash_until_us: 0,
            snapshot_flash: None,
        }
    }

    /// What the macro knob currently edits.
    pub fn macro_mode(&self) -> MacroMode {
        self.macro_mode
    }

    /// True while the randomize flash screen should be shown.
    pub fn randomize_flash(&self, now_us: u64) -> bool {
        now_us < self.randomize_flash_until_us
    }

    /// The slot number to flash after a snapshot save, if any.
    pub fn snapshot_flash(&self, now_us: u64) -> Option<usize> {
        self.snapshot_flash
            .filter(|&(_, until)| now_us < until)
            .map(|(slot, _)| slot)
    }

    /// Expire flash screens. Called periodically from the UI loop.
    pub fn tick(&mut self, now_us: u64) {
        if self.snapshot_flash.is_some_and(|(_, until)| now_us >= until) {
            self.snapshot_flash = None;
        }
    }

    pub fn handle_event(&mut self, event: ControlEvent, now_us: u64) {
        match event {
            ControlEvent::ButtonPress { control, long } => {
                self.handle_button(control, long, now_us)
            }
            ControlEvent::PotChange { control, value } => self.handle_pot(control, value),
        }
    }

    fn handle_button(&mut self, control: ButtonControl, long: bool, now_us: u64) {
        match (control, long) {
            (ButtonControl::Tap, false) => {
                self.trigger_line.record(now_us);
                // slow taps double as a manual grain trigger; fast tapping
                // stays a pure tempo gesture
                if self.last_manual_tap_us == 0
                    || now_us.saturating_sub(self.last_manual_tap_us) >= TAP_RETRIGGER_TIMEOUT_US
                {
                    self.push_command(EngineCommand::Trigger);
                }
                self.last_manual_tap_us = now_us;
            }
            (ButtonControl::Tap, true) => self.randomize(now_us),
            (ButtonControl::MacroCycle, false) => {
                self.macro_mode = self.macro_mode.next();
                self.view.invalidate();
            }
            (ButtonControl::MacroCycle, true) => {}
            (ButtonControl::PlayMode, false) => {
                let mode = match self.shared.mode() {
                    PlayMode::Forward => PlayMode::Reverse,
                    PlayMode::Reverse => PlayMode::Forward,
                };
                self.shared.set_mode(mode);
                self.view.invalidate();
            }
            (ButtonControl::PlayMode, true) => {
                self.bank.randomize_all(&mut self.rng, &self.luts);
                self.push_command(EngineCommand::ReseedRing);
                let mut params = self.shared.load();
                if let Err(err) = self.bank.load(0, &mut params) {
                    log::warn!("Failed to load reseeded snapshot: {err}");
                }
                self.shared.store(params);
                self.takeover.arm(params.pitch);
                self.randomize_flash_until_us = now_us + FLASH_DURATION_US;
                self.view.invalidate();
            }
            (ButtonControl::Snapshot(slot), false) => {
                let mut params = self.shared.load();
                match self.bank.load(slot, &mut params) {
                    Ok(()) => {
                        self.shared.store(params);
                        self.takeover.arm(params.pitch);
                        self.view.invalidate();
                    }
                    Err(err) => log::warn!("{err}"),
                }
            }
            (ButtonControl::Snapshot(slot), true) => {
                let params = self.shared.load();
                match self.bank.save(slot, &params, self.macro_mode) {
                    Ok(()) => {
                        self.snapshot_flash = Some((slot, now_us + FLASH_DURATION_US));
                        self.view.invalidate();
                    }
                    Err(err) => log::warn!("{err}"),
                }
            }
        }
    }

    fn handle_pot(&mut self, control: PotControl, value: f32) {
        let value = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.5
        };
        match control {
            PotControl::Position => self.shared.set_position((value * 32767.0) as i16),
            PotControl::Size => self.shared.set_size((value * 32767.0) as i16),
            PotControl::DejaVu => self.shared.set_deja_vu((value * 32767.0) as i16),
            PotControl::Macro => match self.macro_mode {
                MacroMode::Texture => self.shared.set_texture((value * 32767.0) as i16),
                MacroMode::Spread => self.shared.set_spread((value * 32767.0) as i16),
                MacroMode::Feedback => {
                    let index = (value * (FEEDBACK_LUT_SIZE - 1) as f32) as usize;
                    self.shared.set_feedback(self.luts.feedback_entry(index));
                }
                MacroMode::LoopLength => {
                    let length = (2.0 + value * (DejaVuRing::LENGTH - 1) as f32) as u8;
                    self.shared
                        .set_loop_length(length.clamp(2, DejaVuRing::LENGTH as u8));
                }
                MacroMode::Resolution => {
                    let index = (value * (RESOLUTIONS.len() - 1) as f32) as u8;
                    self.shared
                        .set_resolution_index(index.min(RESOLUTIONS.len() as u8 - 1));
                }
            },
            PotControl::Pitch => {
                if self.takeover.accept(value) {
                    let mut pitch = (value - 0.5) * PITCH_RANGE_SEMITONES;
                    if !pitch.is_finite() {
                        pitch = 0.0;
                    }
                    self.shared
                        .set_pitch(pitch.clamp(-PITCH_MAX_SEMITONES, PITCH_MAX_SEMITONES));
                }
            }
            PotControl::DryWet => self.shared.set_dry_wet(self.luts.mix(value)),
        }
    }

    /// Long tap: randomize the live params and the déjà-vu ring.
    fn randomize(&mut self, now_us: u64) {
        let params = GranParams {
            position_q15: self.rng.random_range(0..32768) as i16,
            size_q15: 1000 + self.rng.random_range(0..31767) as i16,
            pitch: self.rng.random_range(PITCH_RANDOM_MIN..=PITCH_RANDOM_MAX),
            deja_vu_q15: self.rng.random_range(0..32768) as i16,
            texture_q15: self.rng.random_range(0..32768) as i16,
            spread_q15: self.rng.random_range(0..32768) as i16,
            feedback_q15: self
                .luts
                .feedback_entry(self.rng.random_range(0..FEEDBACK_LUT_SIZE)),
            // a randomize always comes up audible
            dry_wet_q15: 32767,
            loop_length: 2 + self.rng.random_range(0..DejaVuRing::LENGTH as u8 - 1),
            resolution_index: self.rng.random_range(0..RESOLUTIONS.len() as u8),
            mode: if self.rng.random::<bool>() {
                PlayMode::Forward
            } else {
                PlayMode::Reverse
            },
        };
        self.shared.store(params);
        self.macro_mode = MacroMode::from_repr(
            self.rng
                .random_range(0..<MacroMode as strum::EnumCount>::COUNT as u8),
        )
        .unwrap_or_default();
        self.takeover.arm(params.pitch);
        self.push_command(EngineCommand::RandomizeRing);
        self.randomize_flash_until_us = now_us + FLASH_DURATION_US;
        self.view.invalidate();
        log::info!("Randomized all live parameters");
    }

    fn push_command(&self, command: EngineCommand) {
        if self.commands.push(command).is_err() {
            log::warn!("Engine command queue is full, dropping {command:?}");
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn test_controller() -> (
        Controller,
        Arc<SharedParams>,
        Arc<TriggerLine>,
        Arc<ArrayQueue<EngineCommand>>,
    ) {
        let shared = Arc::new(SharedParams::new(GranParams::default()));
        let view = Arc::new(EngineView::new());
        let trigger_line = Arc::new(TriggerLine::new());
        let commands = Arc::new(ArrayQueue::new(16));
        let controller = Controller::new(
            Arc::clone(&shared),
            view,
            Arc::clone(&trigger_line),
            Arc::clone(&commands),
            Arc::new(Luts::new()),
            SmallRng::seed_from_u64(1234),
        );
        (controller, shared, trigger_line, commands)
    }

    #[test]
    fn takeover_swallows_readings_until_caught() {
        let mut takeover = SoftTakeover::new();
        takeover.arm(12.0); // knob target 0.75
        assert!(!takeover.accept(0.2));
        assert!(!takeover.accept(0.5));
        // within the deadband
        assert!(takeover.accept(0.73));
        // disarmed from here on
        assert!(takeover.accept(0.1));
    }

    #[test]
    fn takeover_catches_on_crossover() {
        let mut takeover = SoftTakeover::new();
        takeover.arm(0.0); // knob target 0.5
        assert!(!takeover.accept(0.1));
        // jumped straight across the target
        assert!(takeover.accept(0.9));
    }

    #[test]
    fn takeover_arming_handles_nan_pitch() {
        let mut takeover = SoftTakeover::new();
        takeover.arm(f32::NAN);
        assert!(takeover.accept(0.5));
    }

    #[test]
    fn macro_knob_edits_the_selected_parameter() {
        let (mut controller, shared, _, _) = test_controller();
        controller.macro_mode = MacroMode::Spread;
        let before = shared.load();
        controller.handle_event(
            ControlEvent::PotChange {
                control: PotControl::Macro,
                value: 1.0,
            },
            0,
        );
        let after = shared.load();
        assert_eq!(after.spread_q15, 32767);
        assert_eq!(after.texture_q15, before.texture_q15);
        assert_eq!(after.feedback_q15, before.feedback_q15);
    }

    #[test]
    fn loop_length_pot_spans_two_to_sixteen() {
        let (mut controller, shared, _, _) = test_controller();
        controller.macro_mode = MacroMode::LoopLength;
        for (value, expected) in [(0.0, 2), (1.0, 16)] {
            controller.handle_event(
                ControlEvent::PotChange {
                    control: PotControl::Macro,
                    value,
                },
                0,
            );
            assert_eq!(shared.load().loop_length, expected);
        }
    }

    #[test]
    fn short_tap_records_tempo_and_retriggers_when_slow() {
        let (mut controller, _, trigger_line, commands) = test_controller();
        let tap = ControlEvent::ButtonPress {
            control: ButtonControl::Tap,
            long: false,
        };
        controller.handle_event(tap, 1_000_000);
        assert_eq!(trigger_line.take(), Some(1_000_000));
        assert_eq!(commands.pop(), Some(EngineCommand::Trigger));
        // fast tapping keeps setting the tempo without retriggering
        controller.handle_event(tap, 1_500_000);
        assert_eq!(trigger_line.take(), Some(1_500_000));
        assert_eq!(commands.pop(), None);
        // after the timeout a tap triggers again
        controller.handle_event(tap, 4_000_000);
        assert_eq!(commands.pop(), Some(EngineCommand::Trigger));
    }

    #[test]
    fn long_tap_randomizes_fully_wet_and_rerolls_the_ring() {
        let (mut controller, shared, _, commands) = test_controller();
        controller.handle_event(
            ControlEvent::ButtonPress {
                control: ButtonControl::Tap,
                long: true,
            },
            5_000_000,
        );
        let params = shared.load();
        params.validate().unwrap();
        assert_eq!(params.dry_wet_q15, 32767);
        assert_eq!(commands.pop(), Some(EngineCommand::RandomizeRing));
        assert!(controller.randomize_flash(5_100_000));
        assert!(!controller.randomize_flash(5_300_000));
        // the pitch pot is now under soft takeover
        assert!(controller.takeover.is_active());
    }

    #[test]
    fn snapshot_load_arms_the_takeover() {
        let (mut controller, shared, _, _) = test_controller();
        // park the takeover in the caught state first
        controller.takeover.accept(controller.takeover.target);
        controller.handle_event(
            ControlEvent::ButtonPress {
                control: ButtonControl::Snapshot(1),
                long: false,
            },
            0,
        );
        assert!(controller.takeover.is_active());
        // pitch pot readings far from the target are swallowed
        let pitch_before = shared.load().pitch;
        let far_value = if controller.takeover.target < 0.5 { 0.9 } else { 0.1 };
        controller.handle_event(
            ControlEvent::PotChange {
                control: PotControl::Pitch,
                value: far_value,
            },
            0,
        );
        assert_eq!(shared.load().pitch, pitch_before);
    }

    #[test]
    fn play_mode_button_toggles_direction() {
        let (mut controller, shared, _, _) = test_controller();
        let mode_before = shared.load().mode;
        controller.handle_event(
            ControlEvent::ButtonPress {
                control: ButtonControl::PlayMode,
                long: false,
            },
            0,
        );
        assert_ne!(shared.load().mode, mode_before);
    }

    #[test]
    fn reseed_gesture_also_rerolls_the_dejavu_ring() {
        let (mut controller, _, _, commands) = test_controller();
        controller.handle_event(
            ControlEvent::ButtonPress {
                control: ButtonControl::PlayMode,
                long: true,
            },
            1_000_000,
        );
        // the ring keeps its step, unlike a full randomize
        assert_eq!(commands.pop(), Some(EngineCommand::ReseedRing));
        assert!(commands.pop().is_none());
        assert!(controller.randomize_flash(1_100_000));
    }
}
