//! JavaScript bindings for hosting the synth in an AudioWorklet.
//!
//! The worklet owns a [`WebSynth`], forwards UI messages to the control
//! methods, and calls `process` once per render quantum. Settings objects
//! arrive as plain JS objects with the same field names the UI uses.

use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

use crate::backend::{GraphBackend, SoftwareBackend};
use crate::config::EngineConfig;
use crate::dsp::oscillator::Waveform;
use crate::engine::{EnvelopeParams, FilterParams, LfoParams, Synth};
use crate::notes;

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// `undefined` and `null` mean "nothing given".
fn decode<T: DeserializeOwned + Default>(value: JsValue) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(js_err)
}

#[wasm_bindgen]
pub struct WebSynth {
    synth: Synth<SoftwareBackend>,
}

#[wasm_bindgen]
impl WebSynth {
    /// Create and initialize an engine. `config` is an optional partial
    /// `EngineConfig` object.
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f32, config: JsValue) -> Result<WebSynth, JsValue> {
        let config: EngineConfig = decode(config)?;
        let mut synth = Synth::new(SoftwareBackend::new(f64::from(sample_rate)), config);
        synth.initialize().map_err(js_err)?;
        Ok(WebSynth { synth })
    }

    #[wasm_bindgen(js_name = noteOn)]
    pub fn note_on(&mut self, note: i32, frequency: f64) -> Result<(), JsValue> {
        self.synth.note_on(note, frequency).map_err(js_err)
    }

    #[wasm_bindgen(js_name = noteOff)]
    pub fn note_off(&mut self, note: i32) -> Result<(), JsValue> {
        self.synth.note_off(note).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setEnvelope)]
    pub fn set_envelope(&mut self, params: JsValue) -> Result<(), JsValue> {
        let params: EnvelopeParams = decode(params)?;
        self.synth.set_envelope(&params).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setFilter)]
    pub fn set_filter(&mut self, params: JsValue) -> Result<(), JsValue> {
        let params: FilterParams = decode(params)?;
        self.synth.set_filter(&params).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setLFO)]
    pub fn set_lfo(&mut self, params: JsValue) -> Result<(), JsValue> {
        let params: LfoParams = decode(params)?;
        self.synth.set_lfo(&params).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setWaveform)]
    pub fn set_waveform(&mut self, waveform: &str) -> Result<(), JsValue> {
        let waveform: Waveform = waveform.parse().map_err(js_err)?;
        self.synth.set_waveform(waveform).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&mut self, volume: f64) -> Result<(), JsValue> {
        self.synth.set_volume(volume).map_err(js_err)
    }

    /// Resume the clock from a user gesture.
    pub fn resume(&mut self) -> Result<(), JsValue> {
        self.synth.backend_mut().resume().map_err(js_err)
    }

    /// Fill one output block and apply the node-end events it produced.
    pub fn process(&mut self, out: &mut [f32]) {
        self.synth.render(out);
    }

    #[wasm_bindgen(js_name = getByteTimeDomainData)]
    pub fn byte_time_domain_data(&self) -> Result<Vec<u8>, JsValue> {
        let tap = self.synth.analysis().map_err(js_err)?;
        Ok(tap.byte_time_domain_data())
    }

    #[wasm_bindgen(js_name = getFloatTimeDomainData)]
    pub fn float_time_domain_data(&self) -> Result<Vec<f32>, JsValue> {
        let tap = self.synth.analysis().map_err(js_err)?;
        Ok(tap.time_domain_data())
    }

    #[wasm_bindgen(getter, js_name = frequencyBinCount)]
    pub fn frequency_bin_count(&self) -> usize {
        self.synth.analysis().map_or(0, |tap| tap.frequency_bin_count())
    }

    #[wasm_bindgen(getter, js_name = currentTime)]
    pub fn current_time(&self) -> f64 {
        self.synth.current_time()
    }

    #[wasm_bindgen(getter, js_name = activeVoices)]
    pub fn active_voices(&self) -> usize {
        self.synth.active_voices()
    }

    pub fn shutdown(&mut self) {
        self.synth.shutdown();
    }
}

/// Frequency of a MIDI note at A4 = 440 Hz.
#[wasm_bindgen(js_name = getFrequency)]
pub fn get_frequency(note: i32) -> f64 {
    notes::get_frequency(note)
}
