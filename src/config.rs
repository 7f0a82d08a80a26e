//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```
//! use synthlab_core::config::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{ "masterGain": 0.8, "filter": { "Q": 4 } }"#).unwrap();
//! assert_eq!(config.master_gain, 0.8);
//! assert_eq!(config.filter.q, 4.0);
//! assert_eq!(config.filter.frequency, 2000.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::dsp::oscillator::Waveform;
use crate::engine::envelope::EnvelopeConfig;
use crate::engine::graph::FilterConfig;
use crate::engine::modulation::LfoConfig;
use crate::error::Result;

/// Startup values for the persistent graph and the process-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Initial master volume.
    pub master_gain: f64,
    /// Analysis tap window, in samples.
    pub analyser_size: usize,
    /// Waveform for new voices.
    pub waveform: Waveform,
    pub envelope: EnvelopeConfig,
    pub filter: FilterConfig,
    pub lfo: LfoConfig,
    /// Time constant for filter frequency/Q changes, seconds.
    pub filter_smoothing: f64,
    /// Time constant for LFO rate and depth changes, seconds.
    pub lfo_smoothing: f64,
    /// Time constant for master volume changes, seconds.
    pub volume_smoothing: f64,
    /// Extra time a released oscillator keeps running after its release ramp.
    pub release_margin: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            master_gain: 0.5,
            analyser_size: 2048,
            waveform: Waveform::Sine,
            envelope: EnvelopeConfig::default(),
            filter: FilterConfig::default(),
            lfo: LfoConfig::default(),
            filter_smoothing: 0.05,
            lfo_smoothing: 0.05,
            volume_smoothing: 0.01,
            release_margin: 0.1,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config. Out-of-range values are clamped, not rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Clamp every field into its usable range.
    pub fn sanitized(mut self) -> Self {
        self.master_gain = floor_at("masterGain", self.master_gain, 0.0);
        self.analyser_size = self.analyser_size.clamp(32, 32768);
        self.envelope = self.envelope.sanitized();
        self.filter = self.filter.sanitized();
        self.lfo = self.lfo.sanitized();
        self.filter_smoothing = floor_at("filterSmoothing", self.filter_smoothing, 0.0);
        self.lfo_smoothing = floor_at("lfoSmoothing", self.lfo_smoothing, 0.0);
        self.volume_smoothing = floor_at("volumeSmoothing", self.volume_smoothing, 0.0);
        self.release_margin = floor_at("releaseMargin", self.release_margin, 0.0);
        self
    }
}

/// `value` if it is finite and at least `min`, otherwise `min`.
pub(crate) fn floor_at(field: &str, value: f64, min: f64) -> f64 {
    if value.is_finite() && value >= min {
        return value;
    }
    tracing::warn!("{field} = {value} is out of range, using {min}");
    min
}

/// `value` clamped to [0, 1]. NaN becomes 0.
pub(crate) fn clamp_unit(field: &str, value: f64) -> f64 {
    if (0.0..=1.0).contains(&value) {
        return value;
    }
    let clamped = if value > 1.0 { 1.0 } else { 0.0 };
    tracing::warn!("{field} = {value} is outside [0, 1], using {clamped}");
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::filter::FilterType;
    use crate::engine::modulation::LfoTarget;

    #[test]
    fn defaults_match_the_stock_patch() {
        let c = EngineConfig::default();
        assert_eq!(c.master_gain, 0.5);
        assert_eq!(c.analyser_size, 2048);
        assert_eq!(c.filter.frequency, 2000.0);
        assert_eq!(c.filter.q, 1.0);
        assert_eq!(c.filter.filter_type, FilterType::Lowpass);
        assert_eq!(c.lfo.rate, 5.0);
        assert_eq!(c.lfo.depth, 0.0);
        assert_eq!(c.lfo.target, LfoTarget::None);
        assert_eq!(c.envelope.sustain, 0.5);
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn nested_partial_json() {
        let c = EngineConfig::from_json(
            r#"{
                "waveform": "sawtooth",
                "envelope": { "attack": 0.5 },
                "lfo": { "type": "square", "target": "pitch", "depth": 0.3 },
                "filter": { "type": "highpass" }
            }"#,
        )
        .unwrap();
        assert_eq!(c.waveform, Waveform::Sawtooth);
        assert_eq!(c.envelope.attack, 0.5);
        assert_eq!(c.envelope.decay, 0.1);
        assert_eq!(c.lfo.waveform, Waveform::Square);
        assert_eq!(c.lfo.target, LfoTarget::Pitch);
        assert_eq!(c.filter.filter_type, FilterType::Highpass);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let c = EngineConfig::from_json(
            r#"{ "masterGain": -1, "envelope": { "sustain": 3, "release": 0 }, "lfo": { "depth": -0.5 } }"#,
        )
        .unwrap();
        assert_eq!(c.master_gain, 0.0);
        assert_eq!(c.envelope.sustain, 1.0);
        assert_eq!(c.envelope.release, 0.001);
        assert_eq!(c.lfo.depth, 0.0);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EngineConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::SynthError::Config(_)));
    }

    #[test]
    fn clamp_helpers() {
        assert_eq!(clamp_unit("x", f64::NAN), 0.0);
        assert_eq!(clamp_unit("x", 0.25), 0.25);
        assert_eq!(floor_at("x", f64::INFINITY, 0.5), 0.5);
        assert_eq!(floor_at("x", 2.0, 0.5), 2.0);
    }
}
