//! Software backend. Renders the node graph sample by sample in pure Rust.
//!
//! The same code runs natively (tests, offline capture) and inside an
//! AudioWorklet through the WASM bindings. The clock is a frame counter that
//! only advances while the backend is running; like a browser audio context
//! it starts suspended.

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::{ClockState, Endpoint, GraphBackend, GraphEvent, NodeId, ParamKind, ParamRef, Routes};
use crate::dsp::analyser::Analyser;
use crate::dsp::filter::{BiquadFilter, FilterType};
use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::dsp::param::{AudioParam, Automation};
use crate::error::BackendError;

#[derive(Debug)]
struct OscillatorNode {
    osc: Oscillator,
    frequency: AudioParam,
    detune: AudioParam,
    start: Option<f64>,
    stop: Option<f64>,
    ended: bool,
}

#[derive(Debug)]
struct FilterNode {
    biquad: BiquadFilter,
    frequency: AudioParam,
    q: AudioParam,
}

#[derive(Debug)]
enum Node {
    Oscillator(OscillatorNode),
    Gain(AudioParam),
    Filter(FilterNode),
    Analyser(Analyser),
    Destination,
}

impl Node {
    fn param(&self, kind: ParamKind) -> Option<&AudioParam> {
        match (self, kind) {
            (Node::Oscillator(o), ParamKind::Frequency) => Some(&o.frequency),
            (Node::Oscillator(o), ParamKind::Detune) => Some(&o.detune),
            (Node::Gain(g), ParamKind::Gain) => Some(g),
            (Node::Filter(f), ParamKind::Frequency) => Some(&f.frequency),
            (Node::Filter(f), ParamKind::Q) => Some(&f.q),
            _ => None,
        }
    }

    fn param_mut(&mut self, kind: ParamKind) -> Option<&mut AudioParam> {
        match (self, kind) {
            (Node::Oscillator(o), ParamKind::Frequency) => Some(&mut o.frequency),
            (Node::Oscillator(o), ParamKind::Detune) => Some(&mut o.detune),
            (Node::Gain(g), ParamKind::Gain) => Some(g),
            (Node::Filter(f), ParamKind::Frequency) => Some(&mut f.frequency),
            (Node::Filter(f), ParamKind::Q) => Some(&mut f.q),
            _ => None,
        }
    }

    fn accepts_input(&self) -> bool {
        !matches!(self, Node::Oscillator(_))
    }

    fn commit(&mut self, now: f64) {
        match self {
            Node::Oscillator(o) => {
                o.frequency.commit(now);
                o.detune.commit(now);
            }
            Node::Gain(g) => g.commit(now),
            Node::Filter(f) => {
                f.frequency.commit(now);
                f.q.commit(now);
            }
            Node::Analyser(_) | Node::Destination => {}
        }
    }

    /// Produce one output sample at time `t`. The flag is set on the sample
    /// where a source passes its stop time.
    fn tick(&mut self, t: f64, input: f64, modulation: &[f64; ParamKind::COUNT]) -> (f64, bool) {
        match self {
            Node::Oscillator(o) => {
                let Some(start) = o.start else {
                    return (0.0, false);
                };
                if o.stop.is_some_and(|stop| t >= stop) {
                    let just_ended = !o.ended;
                    o.ended = true;
                    return (0.0, just_ended);
                }
                if t < start {
                    return (0.0, false);
                }
                o.osc.frequency = o.frequency.value_at(t) + modulation[ParamKind::Frequency.index()];
                o.osc.detune = o.detune.value_at(t) + modulation[ParamKind::Detune.index()];
                (o.osc.next_sample(), false)
            }
            Node::Gain(g) => (input * (g.value_at(t) + modulation[ParamKind::Gain.index()]), false),
            Node::Filter(f) => {
                f.biquad
                    .set_frequency(f.frequency.value_at(t) + modulation[ParamKind::Frequency.index()]);
                f.biquad.set_q(f.q.value_at(t) + modulation[ParamKind::Q.index()]);
                (f.biquad.process(input), false)
            }
            Node::Analyser(a) => {
                a.push(input as f32);
                (input, false)
            }
            Node::Destination => (input, false),
        }
    }
}

/// Evaluation order and wiring, rebuilt whenever the topology changes.
#[derive(Debug)]
struct Plan {
    /// Node slot indices in dependency order.
    order: Vec<usize>,
    /// Per position: positions feeding the audio input.
    inputs: Vec<Vec<usize>>,
    /// Per position: positions feeding a parameter.
    params: Vec<Vec<(ParamKind, usize)>>,
    /// Last output of every position. Edges closing a cycle read the previous sample.
    outs: Vec<f64>,
    destination: usize,
}

impl Plan {
    fn build(nodes: &[Option<Node>], routes: &Routes, destination: NodeId) -> Plan {
        let live: Vec<usize> = (0..nodes.len()).filter(|&i| nodes[i].is_some()).collect();
        let mut in_degree = vec![0usize; nodes.len()];
        for (_, to) in routes.iter() {
            in_degree[to.node().0 as usize] += 1;
        }

        // Kahn's algorithm; whatever is left sits on a cycle and goes last.
        let mut order = Vec::with_capacity(live.len());
        let mut placed = vec![false; nodes.len()];
        let mut ready: Vec<usize> = live.iter().copied().filter(|&i| in_degree[i] == 0).collect();
        ready.reverse();
        while let Some(idx) = ready.pop() {
            placed[idx] = true;
            order.push(idx);
            for to in routes.destinations(NodeId(idx as u32)) {
                let dst = to.node().0 as usize;
                in_degree[dst] -= 1;
                if in_degree[dst] == 0 {
                    ready.push(dst);
                }
            }
        }
        order.extend(live.iter().copied().filter(|&i| !placed[i]));

        let mut position = vec![usize::MAX; nodes.len()];
        for (pos, &idx) in order.iter().enumerate() {
            position[idx] = pos;
        }

        let mut inputs = vec![Vec::new(); order.len()];
        let mut params = vec![Vec::new(); order.len()];
        for (from, to) in routes.iter() {
            let src = position[from.0 as usize];
            match to {
                Endpoint::Input(node) => inputs[position[node.0 as usize]].push(src),
                Endpoint::Param(p) => params[position[p.node.0 as usize]].push((p.kind, src)),
            }
        }

        Plan {
            outs: vec![0.0; order.len()],
            destination: position[destination.0 as usize],
            order,
            inputs,
            params,
        }
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

/// A self-contained, sample-accurate graph renderer.
pub struct SoftwareBackend {
    sample_rate: f64,
    frame: u64,
    state: ClockState,
    resume_blocked: bool,
    nodes: Vec<Option<Node>>,
    routes: Routes,
    destination: NodeId,
    plan: Option<Plan>,
    events_tx: Sender<GraphEvent>,
    events_rx: Receiver<GraphEvent>,
}

impl SoftwareBackend {
    pub fn new(sample_rate: f64) -> Self {
        let (events_tx, events_rx) = unbounded();
        SoftwareBackend {
            sample_rate,
            frame: 0,
            state: ClockState::Suspended,
            resume_blocked: false,
            nodes: vec![Some(Node::Destination)],
            routes: Routes::new(),
            destination: NodeId(0),
            plan: None,
            events_tx,
            events_rx,
        }
    }

    /// Refuse `resume()` until cleared, like a page without a user gesture.
    pub fn set_resume_blocked(&mut self, blocked: bool) {
        self.resume_blocked = blocked;
    }

    /// Frames rendered while running.
    pub fn frames(&self) -> u64 {
        self.frame
    }

    /// Live nodes, not counting the destination.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count().saturating_sub(1)
    }

    pub fn is_live(&self, node: NodeId) -> bool {
        self.nodes.get(node.0 as usize).is_some_and(Option::is_some)
    }

    pub fn edge_count(&self) -> usize {
        self.routes.len()
    }

    /// Automation events still queued on `param`.
    pub fn pending_events(&self, param: ParamRef) -> Result<usize, BackendError> {
        self.node(param.node)?
            .param(param.kind)
            .map(AudioParam::pending)
            .ok_or(BackendError::NoSuchParam(param))
    }

    /// Current waveform of an oscillator node.
    pub fn oscillator_waveform(&self, node: NodeId) -> Result<Waveform, BackendError> {
        match self.node(node)? {
            Node::Oscillator(o) => Ok(o.osc.waveform),
            _ => Err(BackendError::InvalidState(format!("node {node} is not an oscillator"))),
        }
    }

    /// Render the next `out.len()` frames. Silence while not running.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.state != ClockState::Running {
            out.fill(0.0);
            return;
        }
        if self.plan.is_none() {
            self.plan = Some(Plan::build(&self.nodes, &self.routes, self.destination));
        }
        let Some(plan) = self.plan.as_mut() else {
            return;
        };

        for frame in out.iter_mut() {
            let t = self.frame as f64 / self.sample_rate;
            for pos in 0..plan.order.len() {
                let input: f64 = plan.inputs[pos].iter().map(|&j| plan.outs[j]).sum();
                let mut modulation = [0.0; ParamKind::COUNT];
                for &(kind, j) in &plan.params[pos] {
                    modulation[kind.index()] += plan.outs[j];
                }
                let idx = plan.order[pos];
                let Some(node) = self.nodes[idx].as_mut() else {
                    continue;
                };
                let (value, ended) = node.tick(t, input, &modulation);
                if ended {
                    // The receiver lives as long as self.
                    let _ = self.events_tx.send(GraphEvent::Ended(NodeId(idx as u32)));
                }
                plan.outs[pos] = value;
            }
            *frame = soft_clip(plan.outs[plan.destination]) as f32;
            self.frame += 1;
        }

        let now = self.current_time();
        for node in self.nodes.iter_mut().flatten() {
            node.commit(now);
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node, BackendError> {
        self.nodes
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, BackendError> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(BackendError::UnknownNode(id))
    }

    fn oscillator_mut(&mut self, id: NodeId) -> Result<&mut OscillatorNode, BackendError> {
        match self.node_mut(id)? {
            Node::Oscillator(o) => Ok(o),
            _ => Err(BackendError::InvalidState(format!("node {id} is not an oscillator"))),
        }
    }

    fn add(&mut self, node: Node) -> Result<NodeId, BackendError> {
        if self.state == ClockState::Closed {
            return Err(BackendError::Closed);
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        self.plan = None;
        Ok(id)
    }
}

impl GraphBackend for SoftwareBackend {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    fn state(&self) -> ClockState {
        self.state
    }

    fn resume(&mut self) -> Result<(), BackendError> {
        match self.state {
            ClockState::Closed => Err(BackendError::Closed),
            _ if self.resume_blocked => Err(BackendError::ResumeBlocked),
            _ => {
                self.state = ClockState::Running;
                Ok(())
            }
        }
    }

    fn suspend(&mut self) -> Result<(), BackendError> {
        if self.state == ClockState::Closed {
            return Err(BackendError::Closed);
        }
        self.state = ClockState::Suspended;
        Ok(())
    }

    fn close(&mut self) {
        self.state = ClockState::Closed;
        for slot in self.nodes.iter_mut().skip(1) {
            *slot = None;
        }
        self.routes = Routes::new();
        self.plan = None;
    }

    fn events(&self) -> Receiver<GraphEvent> {
        self.events_rx.clone()
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<NodeId, BackendError> {
        let node = Node::Oscillator(OscillatorNode {
            osc: Oscillator::new(waveform, self.sample_rate),
            frequency: AudioParam::new(frequency),
            detune: AudioParam::new(0.0),
            start: None,
            stop: None,
            ended: false,
        });
        self.add(node)
    }

    fn create_gain(&mut self, gain: f64) -> Result<NodeId, BackendError> {
        self.add(Node::Gain(AudioParam::new(gain)))
    }

    fn create_filter(
        &mut self,
        filter_type: FilterType,
        frequency: f64,
        q: f64,
    ) -> Result<NodeId, BackendError> {
        let node = Node::Filter(FilterNode {
            biquad: BiquadFilter::new(filter_type, self.sample_rate),
            frequency: AudioParam::new(frequency),
            q: AudioParam::new(q),
        });
        self.add(node)
    }

    fn create_analyser(&mut self, size: usize) -> Result<NodeId, BackendError> {
        self.add(Node::Analyser(Analyser::new(size)))
    }

    fn free(&mut self, node: NodeId) {
        if node == self.destination {
            return;
        }
        if let Some(slot) = self.nodes.get_mut(node.0 as usize) {
            if slot.take().is_some() {
                self.routes.remove_node(node);
                self.plan = None;
            }
        }
    }

    fn start(&mut self, node: NodeId, when: f64) -> Result<(), BackendError> {
        let osc = self.oscillator_mut(node)?;
        if osc.start.is_some() {
            return Err(BackendError::InvalidState(format!("node {node} already started")));
        }
        osc.start = Some(when);
        Ok(())
    }

    fn stop(&mut self, node: NodeId, when: f64) -> Result<(), BackendError> {
        let osc = self.oscillator_mut(node)?;
        if osc.start.is_none() {
            return Err(BackendError::InvalidState(format!("node {node} stopped before start")));
        }
        if !osc.ended {
            osc.stop = Some(when);
        }
        Ok(())
    }

    fn set_waveform(&mut self, node: NodeId, waveform: Waveform) -> Result<(), BackendError> {
        self.oscillator_mut(node)?.osc.waveform = waveform;
        Ok(())
    }

    fn set_filter_type(
        &mut self,
        node: NodeId,
        filter_type: FilterType,
    ) -> Result<(), BackendError> {
        match self.node_mut(node)? {
            Node::Filter(f) => {
                f.biquad.set_type(filter_type);
                Ok(())
            }
            _ => Err(BackendError::InvalidState(format!("node {node} is not a filter"))),
        }
    }

    fn schedule(&mut self, param: ParamRef, automation: Automation) -> Result<(), BackendError> {
        automation.validate().map_err(BackendError::InvalidAutomation)?;
        let now = self.current_time();
        self.node_mut(param.node)?
            .param_mut(param.kind)
            .ok_or(BackendError::NoSuchParam(param))?
            .schedule(automation, now);
        Ok(())
    }

    fn cancel_scheduled_values(&mut self, param: ParamRef, from: f64) -> Result<(), BackendError> {
        self.node_mut(param.node)?
            .param_mut(param.kind)
            .ok_or(BackendError::NoSuchParam(param))?
            .cancel_scheduled_values(from);
        Ok(())
    }

    fn param_value(&self, param: ParamRef) -> Result<f64, BackendError> {
        let now = self.current_time();
        Ok(self
            .node(param.node)?
            .param(param.kind)
            .ok_or(BackendError::NoSuchParam(param))?
            .value_at(now))
    }

    fn connect(&mut self, from: NodeId, to: Endpoint) -> Result<(), BackendError> {
        if matches!(self.node(from)?, Node::Destination) {
            return Err(BackendError::InvalidState("destination has no output".to_string()));
        }
        let target = self.node(to.node())?;
        match to {
            Endpoint::Input(node) if !target.accepts_input() => {
                return Err(BackendError::NotAnInput(node));
            }
            Endpoint::Param(p) if target.param(p.kind).is_none() => {
                return Err(BackendError::NoSuchParam(p));
            }
            _ => {}
        }
        if self.routes.connect(from, to) {
            self.plan = None;
        }
        Ok(())
    }

    fn disconnect(&mut self, from: NodeId, to: Endpoint) -> bool {
        let removed = self.routes.disconnect(from, to);
        if removed {
            self.plan = None;
        }
        removed
    }

    fn disconnect_all(&mut self, from: NodeId) -> usize {
        let removed = self.routes.disconnect_all(from).len();
        if removed > 0 {
            self.plan = None;
        }
        removed
    }

    fn destinations(&self, from: NodeId) -> Vec<Endpoint> {
        self.routes.destinations(from).collect()
    }

    fn sources(&self, to: Endpoint) -> Vec<NodeId> {
        self.routes.sources(to).collect()
    }

    fn time_domain_data(&self, analyser: NodeId, out: &mut [f32]) -> Result<usize, BackendError> {
        match self.node(analyser)? {
            Node::Analyser(a) => Ok(a.time_domain_data(out)),
            _ => Err(BackendError::InvalidState(format!("node {analyser} is not an analyser"))),
        }
    }
}
