//! Offline capture. Runs a synth's software backend faster than real time
//! and encodes the output as a 16-bit mono WAV buffer.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::backend::{GraphBackend, SoftwareBackend};
use crate::engine::Synth;
use crate::error::Result;

/// Frames rendered per call into the backend, matching an AudioWorklet quantum.
pub const BLOCK_SIZE: usize = 128;

/// Render `seconds` of output as raw samples.
pub fn render_samples(synth: &mut Synth<SoftwareBackend>, seconds: f64) -> Vec<f32> {
    let frames = (seconds.max(0.0) * synth.backend().sample_rate()).round() as usize;
    let mut out = vec![0.0f32; frames];
    for block in out.chunks_mut(BLOCK_SIZE) {
        synth.render(block);
    }
    out
}

/// Render `seconds` of output to a WAV file in memory.
pub fn render_wav(synth: &mut Synth<SoftwareBackend>, seconds: f64) -> Result<Vec<u8>> {
    let samples = render_samples(synth, seconds);
    encode_wav(&samples, synth.backend().sample_rate() as u32)
}

/// Encode mono float samples as 16-bit PCM.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec)?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
    }
    writer.finalize()?;
    Ok(bytes)
}
