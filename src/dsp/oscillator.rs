//! Anti-aliased oscillators using PolyBLEP.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    #[serde(alias = "saw")]
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub fn as_str(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sine" => Ok(Waveform::Sine),
            "square" | "sqr" => Ok(Waveform::Square),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "triangle" | "tri" => Ok(Waveform::Triangle),
            other => Err(format!("unknown waveform '{other}'")),
        }
    }
}

/// A band-limited oscillator with anti-aliasing (PolyBLEP).
///
/// Frequency and detune are plain fields; the graph backend writes the
/// automated (and modulated) values into them before every sample.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    pub detune: f64, // in cents
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            detune: 0.0,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Effective frequency accounting for detune (in cents).
    pub fn effective_freq(&self) -> f64 {
        self.frequency * (2.0_f64).powf(self.detune / 1200.0)
    }

    /// Phase increment per sample.
    fn phase_inc(&self) -> f64 {
        self.effective_freq() / self.sample_rate
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc();
        // PolyBLEP needs a positive, sub-Nyquist increment.
        let blep_inc = inc.abs().clamp(1e-9, 0.5);
        let sample = match self.waveform {
            Waveform::Sine => self.sine(),
            Waveform::Sawtooth => self.sawtooth(blep_inc),
            Waveform::Square => self.square(blep_inc),
            Waveform::Triangle => self.triangle(),
        };

        self.phase = (self.phase + inc).rem_euclid(1.0);

        sample
    }

    fn sine(&self) -> f64 {
        (2.0 * PI * self.phase).sin()
    }

    /// Naive sawtooth: rises from -1 to +1, then drops.
    /// PolyBLEP corrects the discontinuity at the wrap.
    fn sawtooth(&self, inc: f64) -> f64 {
        let naive = 2.0 * self.phase - 1.0;
        naive - poly_blep(self.phase, inc)
    }

    /// Square wave with PolyBLEP at both edges.
    fn square(&self, inc: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 0.5) % 1.0, inc);
        value
    }

    /// Piecewise linear: -1→+1 in [0, 0.5], +1→-1 in [0.5, 1].
    fn triangle(&self) -> f64 {
        if self.phase < 0.5 {
            4.0 * self.phase - 1.0
        } else {
            3.0 - 4.0 * self.phase
        }
    }

    /// Reset oscillator phase.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) anti-aliasing correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
/// Returns a correction value to subtract from the naive waveform
/// at discontinuities.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        // Just after the discontinuity
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        // Just before the next discontinuity
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_zero_at_start() {
        let mut osc = Oscillator::new(Waveform::Sine, 44100.0);
        osc.frequency = 440.0;
        let sample = osc.next_sample();
        assert!(sample.abs() < 1e-10, "Sine should start near 0, got {sample}");
    }

    #[test]
    fn all_waveforms_bounded() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Sawtooth,
            Waveform::Triangle,
        ] {
            let mut osc = Oscillator::new(waveform, 44100.0);
            osc.frequency = 440.0;
            for _ in 0..44100 {
                let s = osc.next_sample();
                assert!(s >= -1.5 && s <= 1.5, "{waveform} out of range: {s}");
            }
        }
    }

    #[test]
    fn detune_shifts_frequency() {
        let mut osc1 = Oscillator::new(Waveform::Sine, 44100.0);
        osc1.frequency = 440.0;
        osc1.detune = 0.0;

        let mut osc2 = Oscillator::new(Waveform::Sine, 44100.0);
        osc2.frequency = 440.0;
        osc2.detune = 1200.0; // +1 octave

        let inc1 = osc1.phase_inc();
        let inc2 = osc2.phase_inc();
        assert!(
            (inc2 - 2.0 * inc1).abs() < 1e-10,
            "1200 cents detune should double frequency"
        );
    }

    #[test]
    fn negative_detune_keeps_phase_in_range() {
        let mut osc = Oscillator::new(Waveform::Sawtooth, 44100.0);
        osc.frequency = 5.0;
        osc.detune = -1200.0;
        for _ in 0..1000 {
            let s = osc.next_sample();
            assert!(s.is_finite());
            assert!((0.0..1.0).contains(&osc.phase));
        }
    }

    #[test]
    fn waveform_names_parse() {
        assert_eq!("saw".parse::<Waveform>(), Ok(Waveform::Sawtooth));
        assert_eq!("triangle".parse::<Waveform>(), Ok(Waveform::Triangle));
        assert!("noise".parse::<Waveform>().is_err());
        assert_eq!(Waveform::Square.to_string(), "square");
    }
}
