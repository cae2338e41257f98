//! Spatial audio engine interface and the built-in engines.
//!
//! The sync pipeline only ever talks to an engine through [`SpatialEngine`]: listener
//! position, listener orientation, emitter positions and session lifecycle. Reverb,
//! mixing and playback stay the engine's own concern.
//!
//! - [`ParameterEngine`]: hands every write to an audio render thread through a
//!   bounded lock-free channel, drained there by a [`ParameterReceiver`]
//! - `DeviceEngine` (feature `device`): a `ParameterEngine` wired to the default
//!   output device, playing a preview tone per emitter

#[cfg(feature = "device")]
mod device;
mod parameter;

#[cfg(feature = "device")]
pub use device::DeviceEngine;
pub use parameter::{ParameterCommand, ParameterEngine, ParameterReceiver, SpatialParams};

use crate::error::Result;
use crate::math::{AngularOrientation, Orientation, Vec3};
use std::fmt;

/// Stable, user-facing name of an emitter.
///
/// Used in configuration and by the sink. The engine hands back an [`EmitterHandle`]
/// for it each time a session starts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(String);

impl EmitterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EmitterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EmitterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Engine-side reference to one spatialized source.
///
/// Only valid for the session that created it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EmitterHandle(pub(crate) u32);

impl EmitterHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for EmitterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EmitterHandle({})", self.0)
    }
}

/// The narrow surface a spatial audio engine exposes to the sync pipeline.
///
/// # Real-time contract
///
/// The setters are called from the render thread every frame. They must not block,
/// allocate on a hot path or perform I/O. Any handoff to the audio render thread
/// has to be lock-free or a very short critical section.
///
/// `set_listener_orientation` takes forward and up together. An implementation must
/// make the pair visible to the audio thread as one update.
///
/// The setters return `true` if the engine accepted the value. `false` means it was
/// not applied (engine stopped, unknown handle, or a full queue) and the caller
/// should send it again on a later frame.
pub trait SpatialEngine: Send {
    /// Starts the audio session. Emitters are created after this returns.
    fn start(&mut self) -> Result<()>;

    /// Stops the audio session. Handles created before this are invalid afterwards.
    fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Allocates an engine source for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SonicSyncError::UnknownEmitter`](crate::SonicSyncError::UnknownEmitter)
    /// if the engine has no source configured under this id.
    fn create_emitter(&mut self, id: &EmitterId) -> Result<EmitterHandle>;

    fn destroy_emitter(&mut self, handle: EmitterHandle);

    fn set_listener_position(&mut self, position: Vec3) -> bool;

    fn set_listener_orientation(&mut self, orientation: Orientation) -> bool;

    /// Angular (yaw/pitch/roll) listener orientation.
    ///
    /// The default implementation ignores it and reports nothing applied.
    fn set_listener_angular(&mut self, angles: AngularOrientation) -> bool {
        log::debug!("Angular listener orientation not supported: {:?}", angles);
        false
    }

    fn set_emitter_position(&mut self, emitter: EmitterHandle, position: Vec3) -> bool;
}
