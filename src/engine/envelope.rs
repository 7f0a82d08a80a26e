//! ADSR envelopes as gain automation.
//!
//! Nothing here holds per-voice state. The engine keeps one process-wide
//! [`EnvelopeConfig`]; note events turn it into automation commands against
//! the clock, so a shape change only affects later transitions.

use serde::{Deserialize, Serialize};

use crate::config::{clamp_unit, floor_at};
use crate::dsp::param::Automation;

/// Shortest allowed attack, decay or release, in seconds.
pub const MIN_DURATION: f64 = 0.001;

/// Stand-in for zero at the end of exponential ramps.
pub const SILENCE_FLOOR: f64 = 0.001;

/// Attack/decay/release durations in seconds and a sustain level in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        EnvelopeConfig {
            attack: 0.1,
            decay: 0.1,
            sustain: 0.5,
            release: 0.5,
        }
    }
}

/// Partial update for [`EnvelopeConfig`]; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeParams {
    pub attack: Option<f64>,
    pub decay: Option<f64>,
    pub sustain: Option<f64>,
    pub release: Option<f64>,
}

impl EnvelopeConfig {
    pub fn sanitized(self) -> Self {
        EnvelopeConfig {
            attack: floor_at("attack", self.attack, MIN_DURATION),
            decay: floor_at("decay", self.decay, MIN_DURATION),
            sustain: clamp_unit("sustain", self.sustain),
            release: floor_at("release", self.release, MIN_DURATION),
        }
    }

    pub fn merge(&mut self, params: &EnvelopeParams) {
        let merged = EnvelopeConfig {
            attack: params.attack.unwrap_or(self.attack),
            decay: params.decay.unwrap_or(self.decay),
            sustain: params.sustain.unwrap_or(self.sustain),
            release: params.release.unwrap_or(self.release),
        };
        *self = merged.sanitized();
    }

    /// Attack and decay starting at `t0`: jump to 0, linear rise to 1,
    /// exponential fall to the sustain level.
    pub fn attack_decay(&self, t0: f64) -> [Automation; 3] {
        let peak_at = t0 + self.attack;
        [
            Automation::SetValue { value: 0.0, time: t0 },
            Automation::LinearRamp {
                value: 1.0,
                end_time: peak_at,
            },
            Automation::ExponentialRamp {
                value: self.sustain.max(SILENCE_FLOOR),
                end_time: peak_at + self.decay,
            },
        ]
    }

    /// Release starting at `t1` from whatever `level` the gain had reached.
    pub fn release_from(&self, level: f64, t1: f64) -> [Automation; 2] {
        [
            Automation::SetValue {
                value: level,
                time: t1,
            },
            Automation::ExponentialRamp {
                value: SILENCE_FLOOR,
                end_time: t1 + self.release,
            },
        ]
    }
}
