//! Read-only view of the analysis tap, for visualizers.

use crate::backend::{GraphBackend, NodeId};
use crate::dsp::analyser::{rms, sample_to_byte};
use crate::dsp::pitch::{DEFAULT_MAX_FREQ, DEFAULT_MIN_FREQ, PitchEstimate, detect_pitch};

/// Borrowed handle on the analyser node feeding the output.
pub struct AnalysisTap<'a, B: GraphBackend> {
    backend: &'a B,
    analyser: NodeId,
    size: usize,
}

impl<'a, B: GraphBackend> AnalysisTap<'a, B> {
    pub(crate) fn new(backend: &'a B, analyser: NodeId, size: usize) -> Self {
        AnalysisTap {
            backend,
            analyser,
            size,
        }
    }

    /// Window length in samples.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.size / 2
    }

    /// Fill `out` with the newest samples, oldest first.
    pub fn fill_time_domain(&self, out: &mut [f32]) -> usize {
        self.backend.time_domain_data(self.analyser, out).unwrap_or(0)
    }

    /// The current window as floats in [-1, 1].
    pub fn time_domain_data(&self) -> Vec<f32> {
        let mut window = vec![0.0; self.size];
        self.fill_time_domain(&mut window);
        window
    }

    /// The current window as bytes, 128 being silence.
    pub fn byte_time_domain_data(&self) -> Vec<u8> {
        self.time_domain_data().into_iter().map(sample_to_byte).collect()
    }

    pub fn rms(&self) -> f32 {
        rms(&self.time_domain_data())
    }

    /// Fundamental of the current window, if there is one.
    pub fn dominant_pitch(&self) -> Option<PitchEstimate> {
        detect_pitch(
            &self.time_domain_data(),
            self.backend.sample_rate(),
            DEFAULT_MIN_FREQ,
            DEFAULT_MAX_FREQ,
        )
    }
}
