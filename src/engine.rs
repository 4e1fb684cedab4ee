//! The granular engine and its realtime audio thread.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use audio_thread_priority::promote_current_thread_to_real_time;
use crossbeam_queue::ArrayQueue;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rb::{Consumer, RbConsumer, SpscRb, RB};

use crate::{
    control::Controller,
    dejavu::{DejaVuRing, StepSnapshot},
    dsp::{
        luts::{JitterTables, Luts},
        mul_q15, saturate16, Q15_ONE,
    },
    grain::GrainPool,
    history::{FeedbackLine, HistoryBuffer},
    input::{input_ring, InputProducer},
    output::{OutputSink, OUTPUT_BLOCK_FRAMES},
    params::{GranParams, SharedParams},
    tempo::{BeatClock, TriggerLine},
    view::EngineView,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Sample rate the engine runs at.
pub const SAMPLE_RATE: u32 = 44_100;

/// How long the trigger indicator stays lit after a grain trigger.
const TRIGGER_INDICATOR_US: u64 = 50_000;

/// Capacity of the control to audio command queue.
const COMMAND_QUEUE_SIZE: usize = 16;

/// Structural changes that must run on the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Fire a grain trigger now, outside the clock grid.
    Trigger,
    /// Refill the déjà-vu ring with random steps and rewind it.
    RandomizeRing,
    /// Refill the déjà-vu ring with random steps, keeping the current step.
    ReseedRing,
}

// -------------------------------------------------------------------------------------------------

/// Handle onto a running engine. Dropping it stops the audio thread.
pub struct Engine {
    shared: Arc<SharedParams>,
    view: Arc<EngineView>,
    trigger_line: Arc<TriggerLine>,
    commands: Arc<ArrayQueue<EngineCommand>>,
    luts: Arc<Luts>,
    running: Arc<AtomicBool>,
    epoch: Instant,
    thread: Option<thread::JoinHandle<()>>,
}

impl Engine {
    /// Spawn the audio thread and return the engine handle, the controller
    /// for the control surface and the producer to feed input audio into.
    pub fn start(sink: Box<dyn OutputSink>) -> Result<(Self, Controller, InputProducer), Error> {
        Self::start_with_rng(sink, SmallRng::from_os_rng())
    }

    /// Same as [`Engine::start`] with a caller supplied rng, for
    /// reproducible runs.
    pub fn start_with_rng(
        sink: Box<dyn OutputSink>,
        mut rng: SmallRng,
    ) -> Result<(Self, Controller, InputProducer), Error> {
        let shared = Arc::new(SharedParams::new(GranParams::default()));
        let view = Arc::new(EngineView::new());
        let trigger_line = Arc::new(TriggerLine::new());
        let commands = Arc::new(ArrayQueue::new(COMMAND_QUEUE_SIZE));
        let luts = Arc::new(Luts::new());
        let running = Arc::new(AtomicBool::new(true));
        let epoch = Instant::now();

        let ring = input_ring();
        let input_producer = InputProducer::new(ring.producer());

        let audio_rng = SmallRng::seed_from_u64(rng.random());
        let controller_rng = SmallRng::seed_from_u64(rng.random());

        let audio = GranularEngine::new(
            Arc::clone(&shared),
            Arc::clone(&view),
            Arc::clone(&trigger_line),
            Arc::clone(&commands),
            Arc::clone(&luts),
            ring,
            sink,
            Arc::clone(&running),
            epoch,
            audio_rng,
        );
        let thread = thread::Builder::new()
            .name("grainflow audio".to_string())
            .spawn(move || audio.run())
            .map_err(Error::IoError)?;

        let controller = Controller::new(
            Arc::clone(&shared),
            Arc::clone(&view),
            Arc::clone(&trigger_line),
            Arc::clone(&commands),
            Arc::clone(&luts),
            controller_rng,
        );

        Ok((
            Self {
                shared,
                view,
                trigger_line,
                commands,
                luts,
                running,
                epoch,
                thread: Some(thread),
            },
            controller,
            input_producer,
        ))
    }

    /// Live parameters as the audio thread sees them.
    pub fn params(&self) -> GranParams {
        self.shared.load()
    }

    pub fn shared_params(&self) -> &Arc<SharedParams> {
        &self.shared
    }

    pub fn view(&self) -> &Arc<EngineView> {
        &self.view
    }

    pub fn luts(&self) -> &Arc<Luts> {
        &self.luts
    }

    /// Microseconds since the engine started. Control events should be
    /// timestamped with this clock so taps line up with the audio thread.
    pub fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Record a tempo tap at the current time.
    pub fn tap(&self) {
        self.trigger_line.record(self.now_us());
    }

    /// Queue a command for the audio thread.
    pub fn send_command(&self, command: EngineCommand) -> Result<(), Error> {
        self.commands
            .push(command)
            .map_err(|command| Error::SendError(format!("Command queue is full: {command:?}")))
    }

    /// Stop the audio thread and wait for it to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

// -------------------------------------------------------------------------------------------------

/// All state owned by the audio thread.
struct GranularEngine {
    shared: Arc<SharedParams>,
    view: Arc<EngineView>,
    trigger_line: Arc<TriggerLine>,
    commands: Arc<ArrayQueue<EngineCommand>>,
    luts: Arc<Luts>,
    input: Consumer<i16>,
    sink: Box<dyn OutputSink>,
    running: Arc<AtomicBool>,
    epoch: Instant,
    history: HistoryBuffer,
    feedback: FeedbackLine,
    pool: GrainPool,
    ring: DejaVuRing,
    clock: BeatClock,
    jitter: JitterTables,
    rng: SmallRng,
    block: Vec<i16>,
    trigger_indicator_until_us: u64,
    emit_errors: u64,
}

impl GranularEngine {
    #[allow(clippy::too_many_arguments)]
    fn new(
        shared: Arc<SharedParams>,
        view: Arc<EngineView>,
        trigger_line: Arc<TriggerLine>,
        commands: Arc<ArrayQueue<EngineCommand>>,
        luts: Arc<Luts>,
        input_ring: SpscRb<i16>,
        sink: Box<dyn OutputSink>,
        running: Arc<AtomicBool>,
        epoch: Instant,
        mut rng: SmallRng,
    ) -> Self {
        let jitter = JitterTables::new(&mut rng);
        let mut ring = DejaVuRing::new();
        ring.randomize(&mut rng);
        Self {
            shared,
            view,
            trigger_line,
            commands,
            luts,
            input: input_ring.consumer(),
            sink,
            running,
            epoch,
            history: HistoryBuffer::new(),
            feedback: FeedbackLine::new(),
            pool: GrainPool::new(),
            ring,
            clock: BeatClock::new(),
            jitter,
            rng,
            block: Vec::with_capacity(OUTPUT_BLOCK_FRAMES * 2),
            trigger_indicator_until_us: 0,
            emit_errors: 0,
        }
    }

    fn run(mut self) {
        // Promote the engine thread to audio priority to prevent under-runs on high CPU usage.
        if let Err(err) = promote_current_thread_to_real_time(OUTPUT_BLOCK_FRAMES as u32, SAMPLE_RATE)
        {
            log::warn!("Failed to set engine thread's priority to real-time: {err}");
        }
        if let Err(err) = self.sink.open() {
            log::error!("Failed to open audio output: {err}");
            return;
        }

        let mut input_buffer = [0; OUTPUT_BLOCK_FRAMES];
        while self.running.load(Ordering::Relaxed) {
            let now_us = self.epoch.elapsed().as_micros() as u64;
            if let Some(tap_us) = self.trigger_line.take() {
                self.clock.tap(tap_us);
            }
            let params = self.shared.load();
            while let Some(command) = self.commands.pop() {
                match command {
                    EngineCommand::Trigger => self.trigger(&params, now_us),
                    EngineCommand::RandomizeRing => {
                        self.ring.randomize(&mut self.rng);
                        self.ring.reset_step();
                    }
                    EngineCommand::ReseedRing => self.ring.randomize(&mut self.rng),
                }
            }
            if self.clock.poll_trigger(now_us, params.resolution_index) {
                self.trigger(&params, now_us);
            }
            self.clock.poll_beat(now_us);

            let read = self.input.read(&mut input_buffer).unwrap_or(0);
            if read == 0 {
                self.publish_view(&params, now_us);
                thread::sleep(Duration::from_micros(500));
                continue;
            }
            for &sample in &input_buffer[..read] {
                let (left, right) = self.process_sample(sample, &params);
                self.block.push(left);
                self.block.push(right);
                if self.block.len() == OUTPUT_BLOCK_FRAMES * 2 {
                    self.emit_block();
                }
            }
            self.publish_view(&params, now_us);
        }
    }

    /// Process one mono input sample into a stereo output frame: mix the
    /// delayed feedback into the input, record it into the history, render
    /// all grains over it and crossfade dry against wet.
    fn process_sample(&mut self, input: i16, params: &GranParams) -> (i16, i16) {
        let delayed = self.feedback.read();
        let mixed = saturate16(input as i32 + mul_q15(delayed, params.feedback_q15) as i32);
        self.history.write(mixed);

        let mut wet_left = 0;
        let mut wet_right = 0;
        self.pool.render_into(
            &mut wet_left,
            &mut wet_right,
            &self.history,
            &self.luts,
            params.mode,
        );
        let wet_left = saturate16(wet_left) as i32;
        let wet_right = saturate16(wet_right) as i32;

        let wet = params.dry_wet_q15 as i32;
        let dry = Q15_ONE as i32 - wet;
        let out_left = saturate16((input as i32 * dry + wet_left * wet) >> 15);
        let out_right = saturate16((input as i32 * dry + wet_right * wet) >> 15);

        let folded = ((out_left as i32 + out_right as i32) >> 1) as i16;
        self.feedback
            .write_and_advance(mul_q15(folded, params.feedback_q15));

        (out_left, out_right)
    }

    /// Fire one grain trigger: resolve the step snapshot through the
    /// déjà-vu ring and spawn a burst of grains from it.
    fn trigger(&mut self, params: &GranParams, now_us: u64) {
        if !self.history.is_ready() {
            return;
        }
        self.trigger_indicator_until_us = now_us + TRIGGER_INDICATOR_US;

        let replay = self.rng.random_range(0..32768) < params.deja_vu_q15 as i32;
        let base = StepSnapshot {
            position_q15: params.position_q15,
            size_q15: params.size_q15,
            pitch: params.pitch,
            texture_q15: params.texture_q15,
        };
        let snapshot = self.ring.select(
            replay,
            (params.loop_length as usize).clamp(1, DejaVuRing::LENGTH),
            base,
            &mut self.rng,
        );
        self.pool.spawn_burst(
            snapshot,
            params.spread_q15,
            params.mode,
            &self.history,
            &self.luts,
            &mut self.jitter,
            &mut self.rng,
        );
        self.ring.advance();
    }

    fn emit_block(&mut self) {
        if let Err(err) = self.sink.write_block(&self.block) {
            self.emit_errors += 1;
            if self.emit_errors % 1000 == 1 {
                log::warn!(
                    "Audio output error: {err} (count: {})",
                    self.emit_errors
                );
            }
        }
        self.block.clear();
    }

    fn publish_view(&self, params: &GranParams, now_us: u64) {
        self.view.publish(
            self.clock.bpm(),
            &self.pool,
            params.mode,
            self.history.write_pos(),
            self.history.is_ready(),
            self.clock.indicator_on(now_us),
            now_us < self.trigger_indicator_until_us,
        );
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::VecSink;

    #[test]
    fn dry_input_passes_through_unprocessed() {
        let sink = VecSink::new();
        let samples = sink.samples();
        let (mut engine, _controller, mut producer) =
            Engine::start_with_rng(Box::new(sink), SmallRng::seed_from_u64(5)).unwrap();
        // fully dry, no feedback: the engine only forwards the input
        engine.shared_params().store(GranParams {
            dry_wet_q15: 0,
            feedback_q15: 0,
            ..GranParams::default()
        });

        let input: Vec<i16> = (0..1024).map(|i| (i * 17 % 4000) as i16 - 2000).collect();
        let interleaved: Vec<i16> = input.iter().flat_map(|&s| [s, s]).collect();
        producer.push_interleaved(&interleaved);

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let rendered = samples.lock().unwrap().len();
            if rendered >= input.len() * 2 || Instant::now() > deadline {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        engine.stop();

        let rendered = samples.lock().unwrap();
        assert!(rendered.len() >= input.len() * 2);
        assert_eq!(rendered.len() % (OUTPUT_BLOCK_FRAMES * 2), 0);
        for (frame, &expected) in rendered.chunks_exact(2).zip(input.iter()) {
            // the stereo downmix and the Q15 dry gain each lose at most one lsb
            assert!((frame[0] as i32 - expected as i32).abs() <= 2);
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn manual_trigger_produces_wet_output() {
        let sink = VecSink::new();
        let samples = sink.samples();
        let (mut engine, _controller, mut producer) =
            Engine::start_with_rng(Box::new(sink), SmallRng::seed_from_u64(9)).unwrap();
        engine.shared_params().store(GranParams {
            dry_wet_q15: 32767,
            feedback_q15: 0,
            texture_q15: 0,
            size_q15: 8000,
            position_q15: 1000,
            ..GranParams::default()
        });

        // feed a loud square wave until the history is ready; the engine
        // drains the ring fast, so small chunks with short naps suffice
        let chunk: Vec<i16> = (0..1024usize)
            .flat_map(|i| {
                let s = if i % 64 < 32 { 16000 } else { -16000 };
                [s, s]
            })
            .collect();
        let deadline = Instant::now() + Duration::from_secs(10);
        while !engine.view().history_ready() && Instant::now() < deadline {
            producer.push_interleaved(&chunk);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(engine.view().history_ready());

        // trigger and feed silence so anything non zero must be grains
        engine.send_command(EngineCommand::Trigger).unwrap();
        let rendered_before = samples.lock().unwrap().len();
        let tail: Vec<i16> = vec![0; OUTPUT_BLOCK_FRAMES * 2 * 32];
        producer.push_interleaved(&tail);
        while samples.lock().unwrap().len() < rendered_before + OUTPUT_BLOCK_FRAMES * 2 * 16 {
            if Instant::now() > deadline {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        engine.stop();

        // with a fully wet mix and zero input after the trigger, anything
        // non zero in the tail is grain output
        let rendered = samples.lock().unwrap();
        let tail_rendered = &rendered[rendered_before..];
        assert!(tail_rendered.iter().any(|&s| s != 0));
    }
}
