//! LFO settings and the Modulation Router.
//!
//! The LFO runs continuously into a depth gain. The router owns no nodes,
//! only the edges leaving that depth gain, and keeps them in one of three
//! shapes: no edges, one edge to the filter cutoff, or one edge per live
//! voice detune.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{Endpoint, GraphBackend, NodeId, ParamKind, ParamRef};
use crate::config::{clamp_unit, floor_at};
use crate::dsp::oscillator::Waveform;
use crate::dsp::param::Automation;
use crate::error::BackendError;

/// Full-depth pitch modulation, in cents.
pub const PITCH_DEPTH_CENTS: f64 = 1200.0;
/// Full-depth filter modulation, in Hz.
pub const FILTER_DEPTH_HZ: f64 = 2000.0;
/// Slowest LFO rate accepted.
pub const MIN_LFO_RATE: f64 = 0.01;

/// Where the LFO is routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfoTarget {
    #[default]
    None,
    Pitch,
    Filter,
}

impl LfoTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            LfoTarget::None => "none",
            LfoTarget::Pitch => "pitch",
            LfoTarget::Filter => "filter",
        }
    }

    /// Physical depth at full modulation for this destination.
    pub fn scale(self) -> f64 {
        match self {
            LfoTarget::None => 0.0,
            LfoTarget::Pitch => PITCH_DEPTH_CENTS,
            LfoTarget::Filter => FILTER_DEPTH_HZ,
        }
    }
}

impl fmt::Display for LfoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LfoTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(LfoTarget::None),
            "pitch" => Ok(LfoTarget::Pitch),
            "filter" => Ok(LfoTarget::Filter),
            other => Err(format!("unknown LFO target '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LfoConfig {
    #[serde(rename = "type")]
    pub waveform: Waveform,
    /// Hz.
    pub rate: f64,
    /// Unit-less, [0, 1].
    pub depth: f64,
    pub target: LfoTarget,
}

impl Default for LfoConfig {
    fn default() -> Self {
        LfoConfig {
            waveform: Waveform::Sine,
            rate: 5.0,
            depth: 0.0,
            target: LfoTarget::None,
        }
    }
}

/// Partial update for [`LfoConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LfoParams {
    #[serde(rename = "type")]
    pub waveform: Option<Waveform>,
    pub rate: Option<f64>,
    pub depth: Option<f64>,
    pub target: Option<LfoTarget>,
}

impl LfoParams {
    /// Whether applying these params requires re-wiring the depth gain.
    pub fn touches_routing(&self) -> bool {
        self.target.is_some() || self.depth.is_some()
    }
}

impl LfoConfig {
    pub fn sanitized(self) -> Self {
        LfoConfig {
            rate: floor_at("lfo.rate", self.rate, MIN_LFO_RATE),
            depth: clamp_unit("lfo.depth", self.depth),
            ..self
        }
    }

    pub fn merge(&mut self, params: &LfoParams) {
        let merged = LfoConfig {
            waveform: params.waveform.unwrap_or(self.waveform),
            rate: params.rate.unwrap_or(self.rate),
            depth: params.depth.unwrap_or(self.depth),
            target: params.target.unwrap_or(self.target),
        };
        *self = merged.sanitized();
    }

    /// Depth in the destination's unit: cents for pitch, Hz for filter.
    pub fn effective_depth(&self) -> f64 {
        self.depth * self.target.scale()
    }
}

/// Target class implied by a set of depth-gain destinations.
///
/// `None` means the set mixes classes or points somewhere unexpected,
/// which the router never produces.
pub fn classify(destinations: &[Endpoint]) -> Option<LfoTarget> {
    let mut class = LfoTarget::None;
    for endpoint in destinations {
        let this = match endpoint {
            Endpoint::Param(ParamRef {
                kind: ParamKind::Detune,
                ..
            }) => LfoTarget::Pitch,
            Endpoint::Param(ParamRef {
                kind: ParamKind::Frequency,
                ..
            }) => LfoTarget::Filter,
            _ => return None,
        };
        if class != LfoTarget::None && class != this {
            return None;
        }
        class = this;
    }
    if class == LfoTarget::Filter && destinations.len() > 1 {
        return None;
    }
    Some(class)
}

/// Keeps the depth gain's outgoing edges consistent with the LFO target.
#[derive(Debug)]
pub struct ModulationRouter {
    source: NodeId,
    target: LfoTarget,
    routes: BTreeSet<Endpoint>,
}

impl ModulationRouter {
    /// Router for the depth gain `source`, initially unrouted.
    pub fn new(source: NodeId) -> Self {
        ModulationRouter {
            source,
            target: LfoTarget::None,
            routes: BTreeSet::new(),
        }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    /// The target the edges were last wired for.
    pub fn target(&self) -> LfoTarget {
        self.target
    }

    pub fn destinations(&self) -> impl Iterator<Item = Endpoint> + '_ {
        self.routes.iter().copied()
    }

    /// Class of the edges currently held; see [`classify`].
    pub fn active_target(&self) -> Option<LfoTarget> {
        let edges: Vec<Endpoint> = self.routes.iter().copied().collect();
        classify(&edges)
    }

    /// Drop every edge and wire the depth gain for `config.target`.
    ///
    /// `voices` are the oscillators currently in the registry; they only
    /// matter for a pitch target.
    pub fn retarget<B: GraphBackend>(
        &mut self,
        backend: &mut B,
        config: &LfoConfig,
        filter: NodeId,
        voices: impl IntoIterator<Item = NodeId>,
        smoothing: f64,
    ) -> Result<(), BackendError> {
        backend.disconnect_all(self.source);
        self.routes.clear();
        self.target = config.target;

        match config.target {
            LfoTarget::None => {}
            LfoTarget::Pitch => {
                for osc in voices {
                    self.link(backend, ParamRef::detune(osc))?;
                }
            }
            LfoTarget::Filter => self.link(backend, ParamRef::frequency(filter))?,
        }

        let now = backend.current_time();
        backend.schedule(
            ParamRef::gain(self.source),
            Automation::SetTarget {
                target: config.effective_depth(),
                start_time: now,
                time_constant: smoothing,
            },
        )?;
        debug!(
            "LFO routed to {} ({} edges, depth {})",
            config.target,
            self.routes.len(),
            config.effective_depth()
        );
        Ok(())
    }

    /// Wire a freshly allocated voice into active pitch modulation.
    pub fn attach_voice<B: GraphBackend>(
        &mut self,
        backend: &mut B,
        oscillator: NodeId,
    ) -> Result<(), BackendError> {
        if self.target == LfoTarget::Pitch {
            self.link(backend, ParamRef::detune(oscillator))?;
        }
        Ok(())
    }

    /// Forget edges into a node that has been torn down.
    pub fn forget(&mut self, node: NodeId) {
        self.routes.retain(|endpoint| endpoint.node() != node);
    }

    fn link<B: GraphBackend>(&mut self, backend: &mut B, param: ParamRef) -> Result<(), BackendError> {
        backend.connect(self.source, param.into())?;
        self.routes.insert(param.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::dsp::filter::FilterType;

    struct Rig {
        backend: SoftwareBackend,
        depth: NodeId,
        filter: NodeId,
        voices: Vec<NodeId>,
    }

    fn rig(voice_count: usize) -> Rig {
        let mut backend = SoftwareBackend::new(8000.0);
        let depth = backend.create_gain(0.0).unwrap();
        let filter = backend.create_filter(FilterType::Lowpass, 2000.0, 1.0).unwrap();
        let voices = (0..voice_count)
            .map(|_| backend.create_oscillator(Waveform::Sine, 440.0).unwrap())
            .collect();
        Rig {
            backend,
            depth,
            filter,
            voices,
        }
    }

    fn lfo(target: LfoTarget, depth: f64) -> LfoConfig {
        LfoConfig {
            target,
            depth,
            ..LfoConfig::default()
        }
    }

    #[test]
    fn filter_target_has_exactly_one_destination() {
        let mut r = rig(3);
        let mut router = ModulationRouter::new(r.depth);
        router
            .retarget(&mut r.backend, &lfo(LfoTarget::Filter, 0.5), r.filter, r.voices.clone(), 0.05)
            .unwrap();
        assert_eq!(
            r.backend.destinations(r.depth),
            vec![Endpoint::Param(ParamRef::frequency(r.filter))]
        );
        assert_eq!(router.active_target(), Some(LfoTarget::Filter));
    }

    #[test]
    fn switching_to_pitch_replaces_filter_edge() {
        let mut r = rig(2);
        let mut router = ModulationRouter::new(r.depth);
        router
            .retarget(&mut r.backend, &lfo(LfoTarget::Filter, 0.5), r.filter, [], 0.05)
            .unwrap();
        router
            .retarget(&mut r.backend, &lfo(LfoTarget::Pitch, 0.5), r.filter, r.voices.clone(), 0.05)
            .unwrap();
        let dests = r.backend.destinations(r.depth);
        assert_eq!(dests.len(), 2);
        assert!(dests.iter().all(|e| matches!(e, Endpoint::Param(p) if p.kind == ParamKind::Detune)));
        assert_eq!(classify(&dests), Some(LfoTarget::Pitch));
    }

    #[test]
    fn none_target_leaves_no_edges_and_zero_depth() {
        let mut r = rig(2);
        let mut router = ModulationRouter::new(r.depth);
        router
            .retarget(&mut r.backend, &lfo(LfoTarget::Pitch, 1.0), r.filter, r.voices.clone(), 0.0)
            .unwrap();
        router
            .retarget(&mut r.backend, &lfo(LfoTarget::None, 1.0), r.filter, r.voices.clone(), 0.0)
            .unwrap();
        assert!(r.backend.destinations(r.depth).is_empty());
        assert_eq!(router.active_target(), Some(LfoTarget::None));
        assert_eq!(r.backend.param_value(ParamRef::gain(r.depth)).unwrap(), 0.0);
    }

    #[test]
    fn depth_is_scaled_per_target() {
        assert_eq!(lfo(LfoTarget::Pitch, 0.5).effective_depth(), 600.0);
        assert_eq!(lfo(LfoTarget::Filter, 0.5).effective_depth(), 1000.0);
        assert_eq!(lfo(LfoTarget::None, 0.5).effective_depth(), 0.0);
    }

    #[test]
    fn new_voices_join_only_while_pitch_is_active() {
        let mut r = rig(0);
        let mut router = ModulationRouter::new(r.depth);
        let osc = r.backend.create_oscillator(Waveform::Sine, 220.0).unwrap();
        router.attach_voice(&mut r.backend, osc).unwrap();
        assert!(r.backend.destinations(r.depth).is_empty());

        router
            .retarget(&mut r.backend, &lfo(LfoTarget::Pitch, 0.2), r.filter, [], 0.05)
            .unwrap();
        router.attach_voice(&mut r.backend, osc).unwrap();
        assert_eq!(
            r.backend.destinations(r.depth),
            vec![Endpoint::Param(ParamRef::detune(osc))]
        );

        r.backend.free(osc);
        router.forget(osc);
        assert_eq!(router.destinations().count(), 0);
    }

    #[test]
    fn classify_rejects_mixed_edges() {
        let mixed = [
            Endpoint::Param(ParamRef::detune(NodeId(4))),
            Endpoint::Param(ParamRef::frequency(NodeId(2))),
        ];
        assert_eq!(classify(&mixed), None);
        assert_eq!(classify(&[Endpoint::Input(NodeId(2))]), None);
        assert_eq!(classify(&[]), Some(LfoTarget::None));
    }

    #[test]
    fn params_merge_and_report_routing_changes() {
        let mut config = LfoConfig::default();
        let rate_only = LfoParams {
            rate: Some(8.0),
            ..LfoParams::default()
        };
        assert!(!rate_only.touches_routing());
        config.merge(&rate_only);
        assert_eq!(config.rate, 8.0);

        let p: LfoParams = serde_json::from_str(r#"{ "target": "filter", "depth": 1.4 }"#).unwrap();
        assert!(p.touches_routing());
        config.merge(&p);
        assert_eq!(config.target, LfoTarget::Filter);
        assert_eq!(config.depth, 1.0);
        assert_eq!("pitch".parse::<LfoTarget>(), Ok(LfoTarget::Pitch));
    }
}
