//! An example running the granular engine offline: feed it a synthesized
//! loop, tap a tempo, nudge some knobs and print what it renders.

use std::{thread, time::Duration};

use grainflow::{
    ButtonControl, ControlEvent, Engine, Error, PotControl, VecSink, SAMPLE_RATE,
};

// -------------------------------------------------------------------------------------------------

/// Tempo to tap in, in beats per minute.
const TAP_BPM: u64 = 120;
/// How long to run, in tapped beats.
const RUN_BEATS: u64 = 16;

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level("audio_thread_priority", log::LevelFilter::Warn)
        .init()
        .expect("Failed to set logger");

    let sink = VecSink::new();
    let samples = sink.samples();
    let (engine, mut controller, mut input) = Engine::start(Box::new(sink))?;

    // dial in a gentle patch
    for (control, value) in [
        (PotControl::Position, 0.3),
        (PotControl::Size, 0.5),
        (PotControl::DejaVu, 0.6),
        (PotControl::DryWet, 0.7),
    ] {
        controller.handle_event(ControlEvent::PotChange { control, value }, engine.now_us());
    }

    // two taps set the tempo, the second one also fires a trigger
    let beat = Duration::from_micros(60_000_000 / TAP_BPM);
    for _ in 0..2 {
        controller.handle_event(
            ControlEvent::ButtonPress {
                control: ButtonControl::Tap,
                long: false,
            },
            engine.now_us(),
        );
        thread::sleep(beat);
    }

    // feed a detuned two oscillator loop while the clock runs
    let mut phase: f32 = 0.0;
    let mut phase2: f32 = 0.0;
    for beat_index in 0..RUN_BEATS {
        let frames = SAMPLE_RATE as u64 * beat.as_micros() as u64 / 1_000_000;
        let mut interleaved = Vec::with_capacity(frames as usize * 2);
        for _ in 0..frames {
            phase = (phase + 110.0 / SAMPLE_RATE as f32).fract();
            phase2 = (phase2 + 110.5 / SAMPLE_RATE as f32).fract();
            let sample = (((phase * std::f32::consts::TAU).sin()
                + (phase2 * std::f32::consts::TAU).sin())
                * 8000.0) as i16;
            interleaved.push(sample);
            interleaved.push(sample);
        }
        for chunk in interleaved.chunks(1024) {
            input.push_interleaved(chunk);
            thread::sleep(Duration::from_micros(
                1_000_000 * (chunk.len() / 2) as u64 / SAMPLE_RATE as u64,
            ));
        }
        let view = engine.view();
        log::info!(
            "beat {:2}: {:5.1} bpm, {} active grains, history at {}",
            beat_index + 1,
            view.bpm(),
            view.active_grains(),
            view.history_write_pos(),
        );
    }

    drop(engine);
    let rendered = samples.lock().unwrap();
    log::info!(
        "rendered {} frames ({:.1} s)",
        rendered.len() / 2,
        rendered.len() as f32 / 2.0 / SAMPLE_RATE as f32
    );
    Ok(())
}
