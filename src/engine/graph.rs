//! Signal Graph Manager: the persistent nodes every voice plays through.
//!
//! ```text
//! voices ─► filter ─► master ─► analyser ─► destination
//! lfo ─► depth ─► (filter cutoff | voice detunes)
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{Endpoint, GraphBackend, NodeId, ParamRef};
use crate::config::{floor_at, EngineConfig};
use crate::dsp::filter::{FilterType, MIN_FREQUENCY, MIN_Q};
use crate::dsp::param::Automation;
use crate::error::BackendError;

use super::modulation::{LfoConfig, LfoParams};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Cutoff / center frequency in Hz.
    pub frequency: f64,
    #[serde(rename = "Q")]
    pub q: f64,
    #[serde(rename = "type")]
    pub filter_type: FilterType,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            frequency: 2000.0,
            q: 1.0,
            filter_type: FilterType::Lowpass,
        }
    }
}

/// Partial update for [`FilterConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub frequency: Option<f64>,
    #[serde(rename = "Q")]
    pub q: Option<f64>,
    #[serde(rename = "type")]
    pub filter_type: Option<FilterType>,
}

impl FilterConfig {
    pub fn sanitized(self) -> Self {
        FilterConfig {
            frequency: floor_at("filter.frequency", self.frequency, MIN_FREQUENCY),
            q: floor_at("filter.Q", self.q, MIN_Q),
            ..self
        }
    }

    pub fn merge(&mut self, params: &FilterParams) {
        let merged = FilterConfig {
            frequency: params.frequency.unwrap_or(self.frequency),
            q: params.q.unwrap_or(self.q),
            filter_type: params.filter_type.unwrap_or(self.filter_type),
        };
        *self = merged.sanitized();
    }
}

/// Handles to the persistent nodes. Built once by [`SignalGraph::build`].
#[derive(Debug, Clone)]
pub struct SignalGraph {
    master: NodeId,
    analyser: NodeId,
    filter: NodeId,
    lfo: NodeId,
    lfo_depth: NodeId,
    analyser_size: usize,
}

impl SignalGraph {
    /// Create and wire the persistent nodes, then start the LFO.
    ///
    /// The depth gain starts at zero; routing it is the router's job.
    pub fn build<B: GraphBackend>(backend: &mut B, config: &EngineConfig) -> Result<Self, BackendError> {
        let master = backend.create_gain(config.master_gain)?;
        let analyser = backend.create_analyser(config.analyser_size)?;
        let filter = backend.create_filter(
            config.filter.filter_type,
            config.filter.frequency,
            config.filter.q,
        )?;
        let lfo = backend.create_oscillator(config.lfo.waveform, config.lfo.rate)?;
        let lfo_depth = backend.create_gain(0.0)?;

        backend.connect(filter, Endpoint::Input(master))?;
        backend.connect(master, Endpoint::Input(analyser))?;
        let destination = backend.destination();
        backend.connect(analyser, Endpoint::Input(destination))?;
        backend.connect(lfo, Endpoint::Input(lfo_depth))?;
        let now = backend.current_time();
        backend.start(lfo, now)?;

        debug!("signal graph built: filter {filter}, master {master}, analyser {analyser}, lfo {lfo}");
        Ok(SignalGraph {
            master,
            analyser,
            filter,
            lfo,
            lfo_depth,
            analyser_size: config.analyser_size,
        })
    }

    pub fn master(&self) -> NodeId {
        self.master
    }

    pub fn analyser(&self) -> NodeId {
        self.analyser
    }

    pub fn analyser_size(&self) -> usize {
        self.analyser_size
    }

    /// Shared filter all voices feed.
    pub fn filter(&self) -> NodeId {
        self.filter
    }

    pub fn lfo(&self) -> NodeId {
        self.lfo
    }

    /// Gain scaling the LFO into its destination's unit.
    pub fn lfo_depth(&self) -> NodeId {
        self.lfo_depth
    }

    /// Apply the fields present in `changed`, reading their values from the
    /// merged `config`. Cutoff and Q glide; the type switches at once.
    pub fn apply_filter<B: GraphBackend>(
        &self,
        backend: &mut B,
        config: &FilterConfig,
        changed: &FilterParams,
        smoothing: f64,
    ) -> Result<(), BackendError> {
        if changed.filter_type.is_some() {
            backend.set_filter_type(self.filter, config.filter_type)?;
        }
        if changed.frequency.is_some() {
            glide(backend, ParamRef::frequency(self.filter), config.frequency, smoothing)?;
        }
        if changed.q.is_some() {
            glide(backend, ParamRef::q(self.filter), config.q, smoothing)?;
        }
        Ok(())
    }

    pub fn apply_volume<B: GraphBackend>(
        &self,
        backend: &mut B,
        volume: f64,
        smoothing: f64,
    ) -> Result<(), BackendError> {
        glide(backend, ParamRef::gain(self.master), volume, smoothing)
    }

    /// Update the LFO's shape and rate where `changed` names them. Routing
    /// and depth are left alone.
    pub fn apply_lfo_shape<B: GraphBackend>(
        &self,
        backend: &mut B,
        config: &LfoConfig,
        changed: &LfoParams,
        smoothing: f64,
    ) -> Result<(), BackendError> {
        if changed.waveform.is_some() {
            backend.set_waveform(self.lfo, config.waveform)?;
        }
        if changed.rate.is_some() {
            glide(backend, ParamRef::frequency(self.lfo), config.rate, smoothing)?;
        }
        Ok(())
    }

    /// Stop the LFO and free every persistent node.
    pub fn teardown<B: GraphBackend>(&self, backend: &mut B) {
        let now = backend.current_time();
        if let Err(e) = backend.stop(self.lfo, now) {
            debug!("LFO stop during teardown: {e}");
        }
        for node in [self.lfo, self.lfo_depth, self.filter, self.master, self.analyser] {
            backend.free(node);
        }
    }
}

/// Smoothed approach to `value` starting now.
fn glide<B: GraphBackend>(
    backend: &mut B,
    param: ParamRef,
    value: f64,
    time_constant: f64,
) -> Result<(), BackendError> {
    let now = backend.current_time();
    backend.schedule(
        param,
        Automation::SetTarget {
            target: value,
            start_time: now,
            time_constant,
        },
    )
}
