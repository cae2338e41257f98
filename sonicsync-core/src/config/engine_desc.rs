use crate::engine::EmitterId;
use crate::error::{Result, SonicSyncError};

/// Configuration descriptor for the parameter engine
#[derive(Debug, Clone)]
pub struct EngineDesc {
    /// Maximum number of emitters alive in one session
    pub max_emitters: usize,
    /// Capacity of the render-to-audio command channel
    pub command_capacity: usize,
    /// Emitter ids this engine accepts. Empty accepts any id.
    pub known_emitters: Vec<EmitterId>,
}

impl Default for EngineDesc {
    fn default() -> Self {
        Self {
            max_emitters: 16,
            command_capacity: 1024,
            known_emitters: Vec::new(),
        }
    }
}

impl EngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_emitters(mut self, max: usize) -> Self {
        self.max_emitters = max;
        self
    }

    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    pub fn known_emitter(mut self, id: impl Into<EmitterId>) -> Self {
        self.known_emitters.push(id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_emitters == 0 {
            return Err(SonicSyncError::Configuration(
                "max_emitters must be at least 1".into(),
            ));
        }
        if self.command_capacity == 0 {
            return Err(SonicSyncError::Configuration(
                "command_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn accepts(&self, id: &EmitterId) -> bool {
        self.known_emitters.is_empty() || self.known_emitters.contains(id)
    }
}

/// Output device settings for the preview renderer
#[cfg(feature = "device")]
#[derive(Debug, Clone)]
pub struct OutputDesc {
    /// Requested device sample rate
    pub sample_rate: u32,
    /// Number of output channels (typically 2 for stereo)
    pub channels: u16,
    /// Frequency of the preview tone each emitter plays
    pub tone_hz: f32,
    /// Distance below which no attenuation is applied
    pub reference_distance: f32,
    /// How fast gain falls off past the reference distance
    pub rolloff: f32,
    /// Master gain applied to the mixed output
    pub gain: f32,
}

#[cfg(feature = "device")]
impl Default for OutputDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            tone_hz: 440.0,
            reference_distance: 1.0,
            rolloff: 1.0,
            gain: 0.2,
        }
    }
}
