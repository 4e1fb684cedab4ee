//! Grain voice pool and per-sample grain rendering.

use rand::Rng;

use crate::{
    dejavu::StepSnapshot,
    dsp::{
        luts::{JitterTables, Luts, MAX_GRAIN_LEN, MIN_GRAIN_LEN, WINDOW_LUT_SIZE},
        Q15_ONE,
    },
    history::HistoryBuffer,
    params::PlayMode,
};

// -------------------------------------------------------------------------------------------------

/// Smallest effective grain size in Q15, keeping grains from collapsing into
/// clicks when texture jitter pulls the size down.
const MIN_SIZE_Q15: i32 = 3277;
/// Texture weighting for start position jitter.
const POSITION_TEXTURE_SCALE: f32 = 0.6;
/// Texture weighting for per-grain pitch jitter, in semitones.
const PITCH_TEXTURE_VARIANCE: f32 = 0.2;
/// Half the pan range: full stereo spread places grains across 0..1.
const STEREO_SPREAD_SCALE: f32 = 0.5;

/// One playing grain. All per-sample state is fixed point; the semitone
/// pitch is kept alongside purely for visualization.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grain {
    active: bool,
    /// Playback cursor within the grain, Q16.
    position_q16: i32,
    /// Playback increment per output sample, Q16.
    speed_q16: i32,
    /// Grain length in samples.
    length: usize,
    /// History buffer index of the grain's first sample.
    start_pos: usize,
    /// Maps the cursor onto the window table, Q32 reciprocal of the length.
    reciprocal_q32: u32,
    pan_left_q15: i16,
    pan_right_q15: i16,
    pitch: f32,
}

impl Grain {
    /// Render one sample and advance the cursor. Deactivates itself when the
    /// cursor leaves the grain. In reverse mode the cursor still runs
    /// forward through the window while the history read runs backwards, so
    /// the envelope shape is identical in both directions.
    fn render(&mut self, history: &HistoryBuffer, luts: &Luts, mode: PlayMode) -> i16 {
        let pos_int = (self.position_q16 >> 16) as usize;
        if self.position_q16 < 0 || pos_int >= self.length {
            self.active = false;
            return 0;
        }

        let offset = match mode {
            PlayMode::Forward => pos_int,
            PlayMode::Reverse => self.length - 1 - pos_int,
        };
        let sample = history.read(self.start_pos.wrapping_add(offset));

        let window_idx = ((pos_int as u64 * self.reciprocal_q32 as u64) >> 25) as usize;
        let window = luts.window(window_idx.min(WINDOW_LUT_SIZE - 1));
        let windowed = sample as i32 * window as i32;

        self.position_q16 += match mode {
            PlayMode::Forward => self.speed_q16,
            PlayMode::Reverse => -self.speed_q16,
        };
        if self.position_q16 < 0 {
            self.active = false;
        }

        (windowed >> 15) as i16
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// History buffer index the grain is currently reading, for display.
    pub fn read_index(&self, mode: PlayMode) -> usize {
        let pos_int = ((self.position_q16.max(0) >> 16) as usize).min(self.length - 1);
        let offset = match mode {
            PlayMode::Forward => pos_int,
            PlayMode::Reverse => self.length - 1 - pos_int,
        };
        self.start_pos.wrapping_add(offset) & (HistoryBuffer::CAPACITY - 1)
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }
}

// -------------------------------------------------------------------------------------------------

/// Fixed pool of grain voices plus a compacted list of active voice
/// indices, so the render loop only touches playing grains.
pub struct GrainPool {
    grains: [Grain; Self::CAPACITY],
    active_indices: [u8; Self::CAPACITY],
    active_count: usize,
}

impl GrainPool {
    pub const CAPACITY: usize = 10;

    pub fn new() -> Self {
        Self {
            grains: [Grain::default(); Self::CAPACITY],
            active_indices: [0; Self::CAPACITY],
            active_count: 0,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn grains(&self) -> &[Grain; Self::CAPACITY] {
        &self.grains
    }

    /// Spawn one to three grains from the step snapshot into free voices.
    /// Grains after the first get extra pitch and position variation so a
    /// burst doesn't phase against itself.
    pub fn spawn_burst<R: Rng>(
        &mut self,
        snapshot: StepSnapshot,
        spread_q15: i16,
        mode: PlayMode,
        history: &HistoryBuffer,
        luts: &Luts,
        jitter: &mut JitterTables,
        rng: &mut R,
    ) {
        let burst = 1 + rng.random_range(0..3usize);
        let mut spawned = 0;
        for idx in 0..Self::CAPACITY {
            if spawned == burst {
                break;
            }
            if self.grains[idx].active {
                continue;
            }
            let mut varied = snapshot;
            if spawned > 0 {
                varied.pitch += rng.random_range(-2000..=2000) as f32 / 1000.0;
                varied.position_q15 = (varied.position_q15 as i32
                    + rng.random_range(-3276..=3276))
                .clamp(0, 32767) as i16;
            }
            self.trigger(idx, &varied, spread_q15, mode, history, luts, jitter);
            spawned += 1;
        }
    }

    fn trigger(
        &mut self,
        idx: usize,
        snapshot: &StepSnapshot,
        spread_q15: i16,
        mode: PlayMode,
        history: &HistoryBuffer,
        luts: &Luts,
        jitter: &mut JitterTables,
    ) {
        let length = grain_length(snapshot.size_q15, snapshot.texture_q15, jitter);
        let start_pos =
            grain_start(snapshot.position_q15, snapshot.texture_q15, history, jitter);
        let speed_q16 = grain_speed(snapshot.pitch, snapshot.texture_q15, luts, jitter);
        let (pan_left_q15, pan_right_q15) = grain_panning(spread_q15, luts, jitter);
        let position_q16 = match mode {
            PlayMode::Forward => 0,
            PlayMode::Reverse => ((length - 1) << 16) as i32,
        };

        self.grains[idx] = Grain {
            active: true,
            position_q16,
            speed_q16,
            length,
            start_pos,
            reciprocal_q32: luts.reciprocal_for(length),
            pan_left_q15,
            pan_right_q15,
            pitch: snapshot.pitch,
        };

        let already_listed = self.active_indices[..self.active_count]
            .iter()
            .any(|&i| i as usize == idx);
        if !already_listed && self.active_count < Self::CAPACITY {
            self.active_indices[self.active_count] = idx as u8;
            self.active_count += 1;
        }
    }

    /// Render every active grain into the wet accumulators, retiring
    /// finished voices in place.
    pub fn render_into(
        &mut self,
        wet_left: &mut i32,
        wet_right: &mut i32,
        history: &HistoryBuffer,
        luts: &Luts,
        mode: PlayMode,
    ) {
        if !history.is_ready() || self.active_count == 0 {
            return;
        }
        let mut i = 0;
        while i < self.active_count {
            let grain_idx = self.active_indices[i] as usize;
            let grain = &mut self.grains[grain_idx];
            let sample = grain.render(history, luts, mode);

            if grain.active {
                *wet_left += sample as i32 * grain.pan_left_q15 as i32 >> 15;
                *wet_right += sample as i32 * grain.pan_right_q15 as i32 >> 15;
                i += 1;
            } else {
                // shift the remaining indices down over the retired one
                for j in i..self.active_count - 1 {
                    self.active_indices[j] = self.active_indices[j + 1];
                }
                self.active_count -= 1;
            }
        }
    }
}

impl Default for GrainPool {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

fn grain_length(size_q15: i16, texture_q15: i16, jitter: &mut JitterTables) -> usize {
    let rand_comp = (texture_q15 as i32 * jitter.next_q15() as i32) >> 15;
    let size = (size_q15 as i32 + (rand_comp >> 1)).clamp(MIN_SIZE_Q15, Q15_ONE as i32);
    MIN_GRAIN_LEN + (((MAX_GRAIN_LEN - MIN_GRAIN_LEN) * size as usize) >> 15)
}

fn grain_start(
    position_q15: i16,
    texture_q15: i16,
    history: &HistoryBuffer,
    jitter: &mut JitterTables,
) -> usize {
    let rand_comp = (((texture_q15 as i32 * jitter.next_q15() as i32) >> 15) as f32
        * POSITION_TEXTURE_SCALE) as i32;
    let position = (position_q15 as i32 + rand_comp).clamp(0, Q15_ONE as i32) as usize;
    let lookback = (HistoryBuffer::CAPACITY * position) >> 15;
    history.index_back(lookback)
}

fn grain_speed(pitch: f32, texture_q15: i16, luts: &Luts, jitter: &mut JitterTables) -> i32 {
    let rand_comp = texture_q15 as f32 / 32767.0
        * PITCH_TEXTURE_VARIANCE
        * (jitter.next_q15() as f32 / 32767.0);
    luts.speed_for_pitch(pitch + rand_comp)
}

fn grain_panning(spread_q15: i16, luts: &Luts, jitter: &mut JitterTables) -> (i16, i16) {
    let pan = 0.5 + spread_q15 as f32 / 32767.0 * STEREO_SPREAD_SCALE * jitter.next_pan();
    luts.pan_gains(pan.clamp(0.0, 1.0))
}

// -------------------------------------------------------------------------------------------------
