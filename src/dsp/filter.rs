//! Biquad filter — matches WebAudio BiquadFilterNode coefficients.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lowest cutoff the filter accepts; modulation may push below it.
pub const MIN_FREQUENCY: f64 = 10.0;
/// Lowest resonance; Q = 0 would make alpha infinite.
pub const MIN_Q: f64 = 0.0001;

/// Filter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterType::Lowpass => "lowpass",
            FilterType::Highpass => "highpass",
            FilterType::Bandpass => "bandpass",
        })
    }
}

impl FromStr for FilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lowpass" => Ok(FilterType::Lowpass),
            "highpass" => Ok(FilterType::Highpass),
            "bandpass" => Ok(FilterType::Bandpass),
            other => Err(format!("unknown filter type '{other}'")),
        }
    }
}

/// A biquad IIR filter (2nd order).
///
/// Implements the standard Direct Form II Transposed structure.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    filter_type: FilterType,
    frequency: f64,
    q: f64,

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: 0.707, // Butterworth
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let w0 = 2.0 * PI * self.frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * self.q);

        let (b0, b1, b2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Switch topology. Takes effect on the next sample, without smoothing.
    pub fn set_type(&mut self, filter_type: FilterType) {
        if self.filter_type != filter_type {
            self.filter_type = filter_type;
            self.dirty = true;
        }
    }

    /// Set cutoff, clamped to `[MIN_FREQUENCY, nyquist)`.
    pub fn set_frequency(&mut self, freq: f64) {
        let nyquist = self.sample_rate / 2.0;
        let freq = if freq.is_finite() {
            freq.clamp(MIN_FREQUENCY, nyquist * 0.999)
        } else {
            MIN_FREQUENCY
        };
        if freq != self.frequency {
            self.frequency = freq;
            self.dirty = true;
        }
    }

    /// Set Q, floored at `MIN_Q`.
    pub fn set_q(&mut self, q: f64) {
        let q = if q.is_finite() { q.max(MIN_Q) } else { MIN_Q };
        if q != self.q {
            self.q = q;
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_peak_through(f: &mut BiquadFilter, freq: f64) -> f64 {
        let mut max_out = 0.0_f64;
        for i in 0..4410 {
            let t = i as f64 / 44100.0;
            let out = f.process((2.0 * PI * freq * t).sin());
            if i > 1000 {
                // skip transient
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut f = BiquadFilter::new(FilterType::Lowpass, 44100.0);
        f.set_frequency(5000.0);

        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(
            (output - 1.0).abs() < 0.001,
            "Lowpass should pass DC, got {output}"
        );
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = BiquadFilter::new(FilterType::Highpass, 44100.0);
        f.set_frequency(1000.0);

        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(output.abs() < 0.001, "Highpass should block DC, got {output}");
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let mut f = BiquadFilter::new(FilterType::Lowpass, 44100.0);
        f.set_frequency(200.0);
        f.set_q(0.707);

        let max_out = sine_peak_through(&mut f, 10000.0);
        assert!(
            max_out < 0.01,
            "Lowpass@200Hz should strongly attenuate 10kHz, got amplitude {max_out}"
        );
    }

    #[test]
    fn type_switch_changes_response() {
        let mut f = BiquadFilter::new(FilterType::Lowpass, 44100.0);
        f.set_frequency(200.0);
        let low = sine_peak_through(&mut f, 10000.0);

        f.set_type(FilterType::Highpass);
        f.reset();
        let high = sine_peak_through(&mut f, 10000.0);
        assert!(high > 0.9 && low < 0.01, "low={low} high={high}");
    }

    #[test]
    fn out_of_range_parameters_stay_stable() {
        let mut f = BiquadFilter::new(FilterType::Bandpass, 44100.0);
        f.set_frequency(-1500.0);
        f.set_q(0.0);
        assert_eq!(f.frequency(), MIN_FREQUENCY);
        assert_eq!(f.q(), MIN_Q);

        f.set_frequency(1.0e9);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }
}
