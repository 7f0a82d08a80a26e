pub mod backend;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod notes;
pub mod wasm;

use wasm_bindgen::prelude::*;

pub use backend::{GraphBackend, SoftwareBackend};
pub use config::EngineConfig;
pub use engine::Synth;
pub use error::{Result, SynthError};
pub use notes::get_frequency;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the synthlab-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}
