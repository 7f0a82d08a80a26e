//! Voice Registry: one live oscillator + gain pair per sounding note.
//!
//! A voice leaves the registry at its logical note-off. Its nodes keep
//! rendering the release tail and are parked in a separate tail table keyed
//! by oscillator until the backend reports the oscillator ended.

use std::collections::HashMap;

use tracing::debug;

use crate::backend::{Endpoint, GraphBackend, NodeId, ParamRef};
use crate::dsp::oscillator::Waveform;
use crate::error::BackendError;
use crate::notes::NoteId;

use super::envelope::EnvelopeConfig;
use super::modulation::ModulationRouter;

/// The per-note subgraph.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub note: NoteId,
    pub oscillator: NodeId,
    /// Per-voice envelope gain.
    pub gain: NodeId,
    pub frequency: f64,
    /// Clock time of the note-on.
    pub created_at: f64,
    /// Clock time of the note-off, once released.
    pub released_at: Option<f64>,
}

/// Settings a note event reads at the moment it happens.
#[derive(Debug, Clone, Copy)]
pub struct VoiceContext<'a> {
    /// Shared filter every voice feeds.
    pub filter: NodeId,
    pub waveform: Waveform,
    pub envelope: &'a EnvelopeConfig,
    /// Time the oscillator keeps running past the end of its release ramp.
    pub release_margin: f64,
}

#[derive(Debug, Default)]
pub struct VoiceRegistry {
    voices: HashMap<NoteId, Voice>,
    tails: HashMap<NodeId, Voice>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered (not released) voices.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn contains(&self, note: NoteId) -> bool {
        self.voices.contains_key(&note)
    }

    pub fn get(&self, note: NoteId) -> Option<&Voice> {
        self.voices.get(&note)
    }

    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.values()
    }

    /// Oscillators of the registered voices.
    pub fn oscillators(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.voices.values().map(|v| v.oscillator)
    }

    /// Released voices whose nodes are still rendering.
    pub fn tails(&self) -> impl Iterator<Item = &Voice> {
        self.tails.values()
    }

    pub fn tail_count(&self) -> usize {
        self.tails.len()
    }

    /// Allocate, shape and start a voice for `note`, retriggering any
    /// voice already registered for it.
    pub fn note_on<B: GraphBackend>(
        &mut self,
        backend: &mut B,
        router: &mut ModulationRouter,
        ctx: &VoiceContext<'_>,
        note: NoteId,
        frequency: f64,
    ) -> Result<(), BackendError> {
        if let Some(previous) = self.voices.remove(&note) {
            debug!("retrigger note {note}: releasing voice {}", previous.oscillator);
            self.release(backend, router, previous, ctx)?;
        }

        let oscillator = backend.create_oscillator(ctx.waveform, frequency)?;
        let gain = match backend.create_gain(0.0) {
            Ok(gain) => gain,
            Err(e) => {
                backend.free(oscillator);
                return Err(e);
            }
        };

        let t0 = backend.current_time();
        if let Err(e) = wire(backend, router, ctx, oscillator, gain, t0) {
            router.forget(oscillator);
            backend.free(oscillator);
            backend.free(gain);
            return Err(e);
        }

        debug!("note {note} on at {t0:.3}s: {frequency:.2} Hz, voice {oscillator}");
        self.voices.insert(
            note,
            Voice {
                note,
                oscillator,
                gain,
                frequency,
                created_at: t0,
                released_at: None,
            },
        );
        Ok(())
    }

    /// Release the voice for `note`. Returns `false` if nothing was sounding.
    pub fn note_off<B: GraphBackend>(
        &mut self,
        backend: &mut B,
        router: &mut ModulationRouter,
        ctx: &VoiceContext<'_>,
        note: NoteId,
    ) -> Result<bool, BackendError> {
        let Some(voice) = self.voices.remove(&note) else {
            return Ok(false);
        };
        self.release(backend, router, voice, ctx)?;
        Ok(true)
    }

    /// Switch the waveform of every registered voice.
    pub fn set_waveform<B: GraphBackend>(
        &self,
        backend: &mut B,
        waveform: Waveform,
    ) -> Result<(), BackendError> {
        for voice in self.voices.values() {
            backend.set_waveform(voice.oscillator, waveform)?;
        }
        Ok(())
    }

    /// Tear down the tail whose oscillator ended. Unknown or repeated
    /// notifications return `false` and change nothing.
    pub fn reap<B: GraphBackend>(
        &mut self,
        backend: &mut B,
        router: &mut ModulationRouter,
        oscillator: NodeId,
    ) -> bool {
        let Some(voice) = self.tails.remove(&oscillator) else {
            return false;
        };
        teardown(backend, router, &voice);
        debug!("note {} torn down, voice {}", voice.note, voice.oscillator);
        true
    }

    /// Free every voice and tail immediately.
    pub fn clear<B: GraphBackend>(&mut self, backend: &mut B, router: &mut ModulationRouter) {
        let voices = self.voices.drain().map(|(_, v)| v);
        let tails = self.tails.drain().map(|(_, v)| v);
        for voice in voices.chain(tails) {
            teardown(backend, router, &voice);
        }
    }

    /// Move `voice` into the tail table and schedule its release. A voice
    /// whose release cannot be scheduled is torn down on the spot.
    fn release<B: GraphBackend>(
        &mut self,
        backend: &mut B,
        router: &mut ModulationRouter,
        mut voice: Voice,
        ctx: &VoiceContext<'_>,
    ) -> Result<(), BackendError> {
        let t1 = backend.current_time();
        if let Err(e) = schedule_release(backend, &voice, ctx, t1) {
            teardown(backend, router, &voice);
            return Err(e);
        }
        voice.released_at = Some(t1);
        self.tails.insert(voice.oscillator, voice);
        Ok(())
    }
}

fn schedule_release<B: GraphBackend>(
    backend: &mut B,
    voice: &Voice,
    ctx: &VoiceContext<'_>,
    t1: f64,
) -> Result<(), BackendError> {
    let gain = ParamRef::gain(voice.gain);
    // Read before cancelling: cancelling an in-flight ramp changes the value.
    let level = backend.param_value(gain)?;
    backend.cancel_scheduled_values(gain, t1)?;
    for event in ctx.envelope.release_from(level, t1) {
        backend.schedule(gain, event)?;
    }
    backend.stop(voice.oscillator, t1 + ctx.envelope.release + ctx.release_margin)?;
    debug!("note {} released at {t1:.3}s from level {level:.3}", voice.note);
    Ok(())
}

/// Connect osc → gain → filter, join pitch modulation, shape and start.
fn wire<B: GraphBackend>(
    backend: &mut B,
    router: &mut ModulationRouter,
    ctx: &VoiceContext<'_>,
    oscillator: NodeId,
    gain: NodeId,
    t0: f64,
) -> Result<(), BackendError> {
    backend.connect(oscillator, Endpoint::Input(gain))?;
    backend.connect(gain, Endpoint::Input(ctx.filter))?;
    router.attach_voice(backend, oscillator)?;
    for event in ctx.envelope.attack_decay(t0) {
        backend.schedule(ParamRef::gain(gain), event)?;
    }
    backend.start(oscillator, t0)
}

fn teardown<B: GraphBackend>(backend: &mut B, router: &mut ModulationRouter, voice: &Voice) {
    backend.disconnect_all(voice.oscillator);
    backend.disconnect_all(voice.gain);
    backend.free(voice.oscillator);
    backend.free(voice.gain);
    router.forget(voice.oscillator);
}
