//! Error types for SonicSync

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SonicSyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown emitter: {0}")]
    UnknownEmitter(String),

    #[error("Emitter already registered: {0}")]
    DuplicateEmitter(String),

    #[error("Emitter capacity exceeded (max {max})")]
    EmitterCapacity { max: usize },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),
}

impl SonicSyncError {
    /// Returns true for errors caused by how the sync or engine was wired up,
    /// as opposed to a runtime engine or device failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnknownEmitter(_)
                | Self::DuplicateEmitter(_)
                | Self::EmitterCapacity { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SonicSyncError>;
