#![allow(dead_code)]

use synthlab_core::backend::ParamRef;
use synthlab_core::notes::NoteId;
use synthlab_core::{EngineConfig, GraphBackend, SoftwareBackend, Synth};
use tracing_subscriber::EnvFilter;

pub const RATE: f64 = 8000.0;

/// Route engine logs to the test harness; `RUST_LOG=debug` shows voice events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn synth() -> Synth<SoftwareBackend> {
    synth_with(SoftwareBackend::new(RATE))
}

pub fn synth_with(backend: SoftwareBackend) -> Synth<SoftwareBackend> {
    init_tracing();
    let mut synth = Synth::new(backend, EngineConfig::default());
    synth.initialize().unwrap();
    synth
}

/// Render `frames` samples and return them.
pub fn run_frames(synth: &mut Synth<SoftwareBackend>, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; frames];
    for block in out.chunks_mut(128) {
        synth.render(block);
    }
    out
}

pub fn run(synth: &mut Synth<SoftwareBackend>, seconds: f64) -> Vec<f32> {
    let frames = (seconds * synth.backend().sample_rate()).round() as usize;
    run_frames(synth, frames)
}

/// Current envelope gain of the voice registered for `note`.
pub fn voice_gain(synth: &Synth<SoftwareBackend>, note: NoteId) -> f64 {
    let voice = synth.voice(note).unwrap();
    synth.backend().param_value(ParamRef::gain(voice.gain)).unwrap()
}
