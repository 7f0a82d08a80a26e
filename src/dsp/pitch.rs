//! Pitch estimation for analysis-tap windows.
//!
//! A trimmed YIN detector: difference function, cumulative mean
//! normalisation, absolute threshold, parabolic refinement. Windows are the
//! analyser's `f32` samples, so the search range is bounded by what fits in
//! half a window.

use crate::notes::frequency_to_midi_cents;

/// Lowest fundamental searched by default.
pub const DEFAULT_MIN_FREQ: f64 = 50.0;
/// Highest fundamental searched by default.
pub const DEFAULT_MAX_FREQ: f64 = 2000.0;

const THRESHOLD: f64 = 0.15;

/// Result of pitch detection on a window.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchEstimate {
    /// Estimated fundamental frequency in Hz.
    pub frequency: f64,
    /// Confidence in [0, 1], higher is better.
    pub confidence: f64,
    /// Nearest MIDI note number.
    pub midi_note: u8,
    /// Offset in cents from the nearest MIDI note.
    pub cents: f64,
}

impl PitchEstimate {
    /// A window with no clear fundamental (noise, silence, chords).
    pub fn is_noise(&self) -> bool {
        self.confidence < 0.5
    }
}

/// Estimate the fundamental of `window`, searching `[min_freq, max_freq]`.
///
/// Returns `None` when the window is too short for the lowest frequency or
/// holds no energy.
pub fn detect_pitch(
    window: &[f32],
    sample_rate: f64,
    min_freq: f64,
    max_freq: f64,
) -> Option<PitchEstimate> {
    let min_lag = (sample_rate / max_freq).ceil().max(2.0) as usize;
    let max_lag = (sample_rate / min_freq).floor() as usize;
    if window.len() < max_lag * 2 || min_lag >= max_lag {
        return None;
    }
    if window.iter().all(|s| s.abs() < 1e-6) {
        return None;
    }

    let cmnd = normalized_difference(window, max_lag);

    let tau = first_dip(&cmnd, min_lag, max_lag).or_else(|| global_minimum(&cmnd, min_lag, max_lag))?;
    let refined = refine(&cmnd, tau);

    let frequency = sample_rate / refined;
    let (midi_note, cents) = frequency_to_midi_cents(frequency, 440.0);
    Some(PitchEstimate {
        frequency,
        confidence: (1.0 - cmnd[tau]).clamp(0.0, 1.0),
        midi_note,
        cents,
    })
}

/// YIN steps 2 and 3: squared difference, then cumulative mean normalisation.
fn normalized_difference(window: &[f32], max_lag: usize) -> Vec<f64> {
    let mut cmnd = vec![1.0f64; max_lag + 1];
    let mut running_sum = 0.0;
    for tau in 1..=max_lag {
        let diff: f64 = (0..max_lag)
            .map(|j| {
                let d = f64::from(window[j]) - f64::from(window[j + tau]);
                d * d
            })
            .sum();
        running_sum += diff;
        if running_sum > 0.0 {
            cmnd[tau] = diff * tau as f64 / running_sum;
        }
    }
    cmnd
}

/// First lag under the threshold, walked down to its local minimum.
fn first_dip(cmnd: &[f64], min_lag: usize, max_lag: usize) -> Option<usize> {
    let mut tau = (min_lag..=max_lag).find(|&t| cmnd[t] < THRESHOLD)?;
    while tau < max_lag && cmnd[tau + 1] < cmnd[tau] {
        tau += 1;
    }
    Some(tau)
}

fn global_minimum(cmnd: &[f64], min_lag: usize, max_lag: usize) -> Option<usize> {
    (min_lag..=max_lag).min_by(|&a, &b| cmnd[a].total_cmp(&cmnd[b]))
}

/// Parabolic interpolation around `tau` for sub-sample accuracy.
fn refine(cmnd: &[f64], tau: usize) -> f64 {
    if tau == 0 || tau + 1 >= cmnd.len() {
        return tau as f64;
    }
    let (a, b, c) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() > 1e-12 {
        tau as f64 + 0.5 * (a - c) / denom
    } else {
        tau as f64
    }
}
