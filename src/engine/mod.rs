//! The synth engine service.
//!
//! [`Synth`] is created explicitly around a backend, initialized once, driven
//! by the control surface, and shut down explicitly:
//!
//! ```
//! use synthlab_core::backend::SoftwareBackend;
//! use synthlab_core::config::EngineConfig;
//! use synthlab_core::engine::Synth;
//!
//! let mut synth = Synth::new(SoftwareBackend::new(44100.0), EngineConfig::default());
//! synth.initialize().unwrap();
//! synth.note_on(69, 440.0).unwrap();
//! let mut block = [0.0f32; 128];
//! synth.render(&mut block);
//! synth.note_off(69).unwrap();
//! synth.shutdown();
//! ```
//!
//! Node-end notifications from the renderer arrive on the backend's event
//! queue and are applied by [`Synth::process_events`]. Every control call
//! drains the queue first.

pub mod analysis;
pub mod envelope;
pub mod graph;
pub mod modulation;
pub mod voice;

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::backend::{ClockState, Endpoint, GraphBackend, GraphEvent, NodeId, SoftwareBackend};
use crate::config::{EngineConfig, floor_at};
use crate::dsp::oscillator::Waveform;
use crate::error::{Result, SynthError};
use crate::notes::NoteId;

pub use analysis::AnalysisTap;
pub use envelope::{EnvelopeConfig, EnvelopeParams};
pub use graph::{FilterConfig, FilterParams, SignalGraph};
pub use modulation::{LfoConfig, LfoParams, LfoTarget, ModulationRouter};
pub use voice::{Voice, VoiceContext, VoiceRegistry};

enum Lifecycle {
    Created,
    Ready {
        graph: SignalGraph,
        router: ModulationRouter,
    },
    ShutDown,
}

fn ready(lifecycle: &mut Lifecycle) -> Result<(&mut SignalGraph, &mut ModulationRouter)> {
    match lifecycle {
        Lifecycle::Ready { graph, router } => Ok((graph, router)),
        Lifecycle::Created => Err(SynthError::NotInitialized),
        Lifecycle::ShutDown => Err(SynthError::ShutDown),
    }
}

/// Polyphonic synth engine over a [`GraphBackend`].
pub struct Synth<B: GraphBackend> {
    backend: B,
    config: EngineConfig,
    events: Receiver<GraphEvent>,
    voices: VoiceRegistry,
    lifecycle: Lifecycle,
}

impl<B: GraphBackend> Synth<B> {
    /// Wrap `backend`. No nodes exist until [`initialize`](Self::initialize).
    pub fn new(backend: B, config: EngineConfig) -> Self {
        let events = backend.events();
        Synth {
            backend,
            config: config.sanitized(),
            events,
            voices: VoiceRegistry::new(),
            lifecycle: Lifecycle::Created,
        }
    }

    /// Build the persistent graph. Calling it again is a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ready { .. } => return Ok(()),
            Lifecycle::ShutDown => return Err(SynthError::ShutDown),
            Lifecycle::Created => {}
        }

        let graph = SignalGraph::build(&mut self.backend, &self.config)?;
        let mut router = ModulationRouter::new(graph.lfo_depth());
        router.retarget(
            &mut self.backend,
            &self.config.lfo,
            graph.filter(),
            [],
            self.config.lfo_smoothing,
        )?;
        info!(
            "synth initialized at {} Hz (master {}, analyser {})",
            self.backend.sample_rate(),
            self.config.master_gain,
            self.config.analyser_size
        );
        self.lifecycle = Lifecycle::Ready { graph, router };
        Ok(())
    }

    /// Free every node and close the backend. Further calls are rejected.
    pub fn shutdown(&mut self) {
        if let Lifecycle::Ready { graph, router } = &mut self.lifecycle {
            self.voices.clear(&mut self.backend, router);
            graph.teardown(&mut self.backend);
        }
        if !matches!(self.lifecycle, Lifecycle::ShutDown) {
            self.backend.close();
            self.lifecycle = Lifecycle::ShutDown;
            info!("synth shut down");
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Ready { .. })
    }

    pub fn is_shut_down(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::ShutDown)
    }

    /// Apply pending renderer notifications. Returns how many voices were
    /// torn down.
    pub fn process_events(&mut self) -> Result<usize> {
        ready(&mut self.lifecycle)?;
        Ok(self.drain_events())
    }

    fn drain_events(&mut self) -> usize {
        let Lifecycle::Ready { router, .. } = &mut self.lifecycle else {
            return 0;
        };
        let mut reaped = 0;
        for event in self.events.try_iter() {
            match event {
                GraphEvent::Ended(node) => {
                    if self.voices.reap(&mut self.backend, router, node) {
                        reaped += 1;
                    }
                }
            }
        }
        reaped
    }

    /// Start a voice for `note`. A voice already sounding for it is
    /// released first.
    pub fn note_on(&mut self, note: NoteId, frequency: f64) -> Result<()> {
        ready(&mut self.lifecycle)?;
        if !(frequency > 0.0 && frequency.is_finite()) {
            return Err(SynthError::InvalidFrequency(frequency));
        }
        self.drain_events();
        self.ensure_running();

        let Self {
            backend,
            config,
            voices,
            lifecycle,
            ..
        } = self;
        let (graph, router) = ready(lifecycle)?;
        let ctx = VoiceContext {
            filter: graph.filter(),
            waveform: config.waveform,
            envelope: &config.envelope,
            release_margin: config.release_margin,
        };
        voices.note_on(backend, router, &ctx, note, frequency)?;
        Ok(())
    }

    /// Release the voice for `note`. Unknown notes are ignored.
    pub fn note_off(&mut self, note: NoteId) -> Result<()> {
        ready(&mut self.lifecycle)?;
        self.drain_events();

        let Self {
            backend,
            config,
            voices,
            lifecycle,
            ..
        } = self;
        let (graph, router) = ready(lifecycle)?;
        let ctx = VoiceContext {
            filter: graph.filter(),
            waveform: config.waveform,
            envelope: &config.envelope,
            release_margin: config.release_margin,
        };
        if !voices.note_off(backend, router, &ctx, note)? {
            debug!("note {note} off ignored: not sounding");
        }
        Ok(())
    }

    /// Merge envelope settings. Voices already sounding keep their curves.
    pub fn set_envelope(&mut self, params: &EnvelopeParams) -> Result<()> {
        ready(&mut self.lifecycle)?;
        self.drain_events();
        self.config.envelope.merge(params);
        Ok(())
    }

    pub fn set_filter(&mut self, params: &FilterParams) -> Result<()> {
        ready(&mut self.lifecycle)?;
        self.drain_events();
        self.config.filter.merge(params);
        let (graph, _) = ready(&mut self.lifecycle)?;
        graph.apply_filter(
            &mut self.backend,
            &self.config.filter,
            params,
            self.config.filter_smoothing,
        )?;
        Ok(())
    }

    /// Merge LFO settings; re-route the depth gain when target or depth is given.
    pub fn set_lfo(&mut self, params: &LfoParams) -> Result<()> {
        ready(&mut self.lifecycle)?;
        self.drain_events();
        self.config.lfo.merge(params);

        let (graph, router) = ready(&mut self.lifecycle)?;
        graph.apply_lfo_shape(
            &mut self.backend,
            &self.config.lfo,
            params,
            self.config.lfo_smoothing,
        )?;
        if params.touches_routing() {
            router.retarget(
                &mut self.backend,
                &self.config.lfo,
                graph.filter(),
                self.voices.oscillators(),
                self.config.lfo_smoothing,
            )?;
        }
        Ok(())
    }

    /// Set the default waveform and switch every registered voice to it.
    pub fn set_waveform(&mut self, waveform: Waveform) -> Result<()> {
        ready(&mut self.lifecycle)?;
        self.drain_events();
        self.config.waveform = waveform;
        self.voices.set_waveform(&mut self.backend, waveform)?;
        Ok(())
    }

    /// Glide the master gain to `volume`.
    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        ready(&mut self.lifecycle)?;
        self.drain_events();
        self.config.master_gain = floor_at("volume", volume, 0.0);
        let (graph, _) = ready(&mut self.lifecycle)?;
        graph.apply_volume(
            &mut self.backend,
            self.config.master_gain,
            self.config.volume_smoothing,
        )?;
        Ok(())
    }

    /// Resume a suspended clock. A refusal only means silence until a later
    /// resume succeeds.
    fn ensure_running(&mut self) {
        if self.backend.state() == ClockState::Running {
            return;
        }
        if let Err(e) = self.backend.resume() {
            debug!("clock resume refused: {e}");
        }
    }

    /// The analysis tap feeding the output.
    pub fn analysis(&self) -> Result<AnalysisTap<'_, B>> {
        match &self.lifecycle {
            Lifecycle::Ready { graph, .. } => Ok(AnalysisTap::new(
                &self.backend,
                graph.analyser(),
                graph.analyser_size(),
            )),
            Lifecycle::Created => Err(SynthError::NotInitialized),
            Lifecycle::ShutDown => Err(SynthError::ShutDown),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn current_time(&self) -> f64 {
        self.backend.current_time()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn envelope(&self) -> &EnvelopeConfig {
        &self.config.envelope
    }

    pub fn filter(&self) -> &FilterConfig {
        &self.config.filter
    }

    pub fn lfo(&self) -> &LfoConfig {
        &self.config.lfo
    }

    pub fn waveform(&self) -> Waveform {
        self.config.waveform
    }

    pub fn volume(&self) -> f64 {
        self.config.master_gain
    }

    /// Persistent node handles, once initialized.
    pub fn graph(&self) -> Option<&SignalGraph> {
        match &self.lifecycle {
            Lifecycle::Ready { graph, .. } => Some(graph),
            _ => None,
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn is_sounding(&self, note: NoteId) -> bool {
        self.voices.contains(note)
    }

    pub fn voice(&self, note: NoteId) -> Option<&Voice> {
        self.voices.get(note)
    }

    /// Released voices still rendering their tail.
    pub fn releasing_voices(&self) -> usize {
        self.voices.tail_count()
    }

    /// Where the LFO depth gain currently feeds, as the backend sees it.
    pub fn modulation_destinations(&self) -> Vec<Endpoint> {
        match self.graph() {
            Some(graph) => self.backend.destinations(graph.lfo_depth()),
            None => Vec::new(),
        }
    }

    /// Target class of the depth gain's edges; `None` if they are mixed.
    pub fn modulation_target_class(&self) -> Option<LfoTarget> {
        modulation::classify(&self.modulation_destinations())
    }

    /// Nodes feeding the shared filter's input.
    pub fn filter_sources(&self) -> Vec<NodeId> {
        match self.graph() {
            Some(graph) => self.backend.sources(Endpoint::Input(graph.filter())),
            None => Vec::new(),
        }
    }
}

impl Synth<SoftwareBackend> {
    /// Render a block and apply the node-end notifications it produced.
    pub fn render(&mut self, out: &mut [f32]) {
        self.backend.render(out);
        self.drain_events();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ParamRef;

    fn synth() -> Synth<SoftwareBackend> {
        let mut synth = Synth::new(SoftwareBackend::new(8000.0), EngineConfig::default());
        synth.initialize().unwrap();
        synth
    }

    fn run(synth: &mut Synth<SoftwareBackend>, seconds: f64) {
        let mut block = vec![0.0f32; (seconds * 8000.0) as usize];
        synth.render(&mut block);
    }

    #[test]
    fn calls_before_initialize_are_rejected() {
        let mut synth = Synth::new(SoftwareBackend::new(8000.0), EngineConfig::default());
        assert!(matches!(synth.note_on(60, 261.63), Err(SynthError::NotInitialized)));
        assert!(matches!(synth.note_off(60), Err(SynthError::NotInitialized)));
        assert!(matches!(synth.set_volume(0.3), Err(SynthError::NotInitialized)));
        assert!(synth.analysis().is_err());
        assert_eq!(synth.backend().node_count(), 0);
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut synth = synth();
        let nodes = synth.backend().node_count();
        synth.initialize().unwrap();
        assert_eq!(synth.backend().node_count(), nodes);
        assert_eq!(nodes, 5);
    }

    #[test]
    fn note_on_resumes_the_clock() {
        let mut synth = synth();
        assert_eq!(synth.backend().state(), ClockState::Suspended);
        synth.note_on(69, 440.0).unwrap();
        assert_eq!(synth.backend().state(), ClockState::Running);
    }

    #[test]
    fn invalid_frequency_is_rejected() {
        let mut synth = synth();
        for bad in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(synth.note_on(60, bad), Err(SynthError::InvalidFrequency(_))));
        }
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn volume_glides_on_master() {
        let mut synth = synth();
        synth.note_on(60, 261.63).unwrap();
        synth.set_volume(0.9).unwrap();
        run(&mut synth, 0.5);
        let master = synth.graph().unwrap().master();
        let gain = synth.backend().param_value(ParamRef::gain(master)).unwrap();
        assert!((gain - 0.9).abs() < 1e-6, "master gain {gain}");
        assert_eq!(synth.volume(), 0.9);
    }

    #[test]
    fn waveform_change_updates_default() {
        let mut synth = synth();
        synth.note_on(60, 261.63).unwrap();
        synth.set_waveform(Waveform::Sawtooth).unwrap();
        assert_eq!(synth.waveform(), Waveform::Sawtooth);
        let sounding = synth.voice(60).unwrap().oscillator;
        assert_eq!(synth.backend().oscillator_waveform(sounding).unwrap(), Waveform::Sawtooth);

        synth.note_on(62, 293.66).unwrap();
        let fresh = synth.voice(62).unwrap().oscillator;
        assert_eq!(synth.backend().oscillator_waveform(fresh).unwrap(), Waveform::Sawtooth);
    }

    #[test]
    fn partial_filter_update_leaves_other_params_alone() {
        let mut synth = synth();
        synth
            .set_filter(&FilterParams {
                q: Some(3.0),
                ..FilterParams::default()
            })
            .unwrap();
        let filter = synth.graph().unwrap().filter();
        let backend = synth.backend();
        assert_eq!(backend.pending_events(ParamRef::q(filter)).unwrap(), 1);
        assert_eq!(backend.pending_events(ParamRef::frequency(filter)).unwrap(), 0);

        synth
            .set_lfo(&LfoParams {
                depth: Some(0.2),
                ..LfoParams::default()
            })
            .unwrap();
        let lfo = synth.graph().unwrap().lfo();
        assert_eq!(synth.backend().pending_events(ParamRef::frequency(lfo)).unwrap(), 0);
    }

    #[test]
    fn shutdown_frees_everything_and_rejects_calls() {
        let mut synth = synth();
        synth.note_on(60, 261.63).unwrap();
        synth.note_on(64, 329.63).unwrap();
        synth.note_off(64).unwrap();
        synth.shutdown();
        assert!(synth.is_shut_down());
        assert_eq!(synth.backend().node_count(), 0);
        assert_eq!(synth.backend().state(), ClockState::Closed);
        assert!(matches!(synth.note_on(60, 261.63), Err(SynthError::ShutDown)));
        assert!(matches!(synth.initialize(), Err(SynthError::ShutDown)));
        synth.shutdown();
    }

    #[test]
    fn analysis_tap_sees_a_playing_note() {
        let mut synth = synth();
        synth.note_on(69, 440.0).unwrap();
        run(&mut synth, 0.5);
        let tap = synth.analysis().unwrap();
        assert_eq!(tap.frequency_bin_count(), 1024);
        assert!(tap.rms() > 0.01);
        let bytes = tap.byte_time_domain_data();
        assert_eq!(bytes.len(), 2048);
        assert!(bytes.iter().any(|&b| b != 128));
    }
}
