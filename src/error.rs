//! Error types for the synth engine and its graph backend.

use thiserror::Error;

use crate::backend::{NodeId, ParamRef};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, SynthError>;

/// Errors surfaced by the control surface.
///
/// Normal playing never produces one: stopping an unknown note, dropping a
/// missing connection and a refused clock resume are all silent.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Engine not initialized: call initialize() before using the control surface")]
    NotInitialized,

    #[error("Engine has been shut down")]
    ShutDown,

    #[error("Invalid note frequency: {0} Hz. Must be finite and greater than zero")]
    InvalidFrequency(f64),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
}

/// Errors from a [`GraphBackend`](crate::backend::GraphBackend).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node {} has no {:?} parameter", .0.node, .0.kind)]
    NoSuchParam(ParamRef),

    #[error("Node {0} does not accept audio input")]
    NotAnInput(NodeId),

    #[error("Invalid automation: {0}")]
    InvalidAutomation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Clock resume refused until a user gesture")]
    ResumeBlocked,

    #[error("Backend is closed")]
    Closed,
}
