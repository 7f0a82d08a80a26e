//! Graph backend: the audio-rendering capability the engine is built on.
//!
//! A backend owns a monotonic clock and primitive nodes (oscillator, gain,
//! filter, analyser) whose parameters take timestamped automation. The
//! engine never mutates audio state directly; every change is a command
//! stamped against [`GraphBackend::current_time`].
//!
//! When a scheduled source stops, the backend posts [`GraphEvent::Ended`] on
//! its event queue instead of calling back into engine code.

pub mod routes;
pub mod software;

use std::fmt;

use crossbeam_channel::Receiver;
use serde::Serialize;

use crate::dsp::filter::FilterType;
use crate::dsp::oscillator::Waveform;
use crate::dsp::param::Automation;
use crate::error::BackendError;

pub use routes::Routes;
pub use software::SoftwareBackend;

/// Handle to a node owned by a backend. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Automatable inputs a node may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Gain,
    Frequency,
    Detune,
    Q,
}

impl ParamKind {
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A specific parameter on a specific node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ParamRef {
    pub node: NodeId,
    pub kind: ParamKind,
}

impl ParamRef {
    pub fn new(node: NodeId, kind: ParamKind) -> Self {
        ParamRef { node, kind }
    }

    pub fn gain(node: NodeId) -> Self {
        ParamRef::new(node, ParamKind::Gain)
    }

    pub fn frequency(node: NodeId) -> Self {
        ParamRef::new(node, ParamKind::Frequency)
    }

    pub fn detune(node: NodeId) -> Self {
        ParamRef::new(node, ParamKind::Detune)
    }

    pub fn q(node: NodeId) -> Self {
        ParamRef::new(node, ParamKind::Q)
    }
}

/// Where a connection lands: a node's audio input or one of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Endpoint {
    Input(NodeId),
    Param(ParamRef),
}

impl Endpoint {
    /// The node that owns this endpoint.
    pub fn node(&self) -> NodeId {
        match self {
            Endpoint::Input(node) => *node,
            Endpoint::Param(param) => param.node,
        }
    }
}

impl From<ParamRef> for Endpoint {
    fn from(param: ParamRef) -> Self {
        Endpoint::Param(param)
    }
}

/// Run state of the rendering clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockState {
    Suspended,
    Running,
    Closed,
}

/// Notifications posted by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    /// A source node reached its stop time and produces no more output.
    Ended(NodeId),
}

/// The minimal audio-graph contract the engine needs.
///
/// Disconnecting an edge that does not exist is not an error; it reports
/// `false`. Times are seconds on the backend's own clock.
pub trait GraphBackend {
    fn sample_rate(&self) -> f64;

    /// Current clock time in seconds.
    fn current_time(&self) -> f64;

    fn state(&self) -> ClockState;

    /// Start (or continue) the clock. May be refused until a user gesture.
    fn resume(&mut self) -> Result<(), BackendError>;

    fn suspend(&mut self) -> Result<(), BackendError>;

    /// Stop the clock for good and release all nodes.
    fn close(&mut self);

    /// Queue of renderer notifications. Every call hands out a receiver on
    /// the same queue.
    fn events(&self) -> Receiver<GraphEvent>;

    /// The final sink feeding the audio output.
    fn destination(&self) -> NodeId;

    fn create_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<NodeId, BackendError>;

    fn create_gain(&mut self, gain: f64) -> Result<NodeId, BackendError>;

    fn create_filter(
        &mut self,
        filter_type: FilterType,
        frequency: f64,
        q: f64,
    ) -> Result<NodeId, BackendError>;

    fn create_analyser(&mut self, size: usize) -> Result<NodeId, BackendError>;

    /// Drop a node and every edge touching it. Unknown ids are ignored.
    fn free(&mut self, node: NodeId);

    fn start(&mut self, node: NodeId, when: f64) -> Result<(), BackendError>;

    /// Schedule a source to stop. A later call replaces the stop time.
    fn stop(&mut self, node: NodeId, when: f64) -> Result<(), BackendError>;

    fn set_waveform(&mut self, node: NodeId, waveform: Waveform) -> Result<(), BackendError>;

    fn set_filter_type(
        &mut self,
        node: NodeId,
        filter_type: FilterType,
    ) -> Result<(), BackendError>;

    fn schedule(&mut self, param: ParamRef, automation: Automation) -> Result<(), BackendError>;

    fn cancel_scheduled_values(&mut self, param: ParamRef, from: f64) -> Result<(), BackendError>;

    /// Automated value of `param` at the current clock time (inputs excluded).
    fn param_value(&self, param: ParamRef) -> Result<f64, BackendError>;

    fn connect(&mut self, from: NodeId, to: Endpoint) -> Result<(), BackendError>;

    fn disconnect(&mut self, from: NodeId, to: Endpoint) -> bool;

    /// Remove every outgoing edge of `from`; returns how many were removed.
    fn disconnect_all(&mut self, from: NodeId) -> usize;

    fn destinations(&self, from: NodeId) -> Vec<Endpoint>;

    fn sources(&self, to: Endpoint) -> Vec<NodeId>;

    /// Copy the analyser's newest samples into `out`; returns the count written.
    fn time_domain_data(&self, analyser: NodeId, out: &mut [f32]) -> Result<usize, BackendError>;
}
