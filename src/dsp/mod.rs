//! DSP primitives — pure Rust signal processing.
//!
//! The software backend is assembled from these. The same code runs natively
//! and inside an AudioWorklet through the WASM bindings.

pub mod analyser;
pub mod filter;
pub mod oscillator;
pub mod param;
pub mod pitch;
pub mod renderer;
