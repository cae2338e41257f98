//! # SonicSync Core
//!
//! Keeps a spatial audio engine's listener and emitters in step with a 3D scene.
//!
//! Every rendered frame the host hands the [`FrameSyncController`] a read-only scene
//! snapshot. The controller pulls the camera's and each emitter's world transform,
//! turns them into [`Pose3D`]s, and writes listener position, listener orientation
//! and emitter positions into the engine, without ever blocking the render thread.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sonicsync_core::*;
//! use sonicsync_core::math::{Mat4, Vec3};
//! use sonicsync_core::scene::SceneSnapshotBuilder;
//! use std::time::Duration;
//!
//! // Engine whose parameters are drained by the audio render thread
//! let engine = ParameterEngine::new(EngineDesc::default())?;
//! let audio_side = engine.receiver();
//!
//! // Follow node "camera" as listener and "soundSource" as an emitter
//! let sync = FrameSyncController::new(SyncDesc::default(), SpatialAudioSink::new(engine))?;
//! sync.start()?;
//!
//! // Once per rendered frame
//! let mut scene = SceneSnapshotBuilder::new();
//! scene.add_root("camera", Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
//! scene.add_root("soundSource", Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
//! sync.on_frame(&scene.build(), Duration::from_millis(16));
//!
//! // On the audio thread, at the top of each quantum
//! let mut params = audio_side.new_params();
//! audio_side.apply_pending(&mut params);
//!
//! sync.stop()?;
//! # Ok::<(), SonicSyncError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`PoseExtractor`]**: Resolves node names and decomposes world transforms into poses
//! - **[`SpatialAudioSink`]**: Sole writer of engine parameters, skips redundant writes
//! - **[`FrameSyncController`]**: Idle/Running state machine called once per frame
//! - **[`SpatialEngine`]**: Trait an audio engine implements to receive poses
//! - **[`ParameterEngine`]**: Lock-free handoff of parameters to an audio render thread
//! - **[`SceneQuery`](scene::SceneQuery)**: Trait a scene graph implements to be read
//!
//! ## Architecture
//!
//! 1. **UI / lifecycle thread**: calls `start()` and `stop()`, polls `snapshot()`
//! 2. **Render thread**: calls `on_frame()` with the frame's scene snapshot
//! 3. **Audio render thread**: drains parameter updates every quantum
//!
//! `on_frame` only `try_lock`s and `try_send`s, so a slow audio thread or an in-flight
//! `stop()` costs a skipped update, never a stalled frame.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod extractor;
pub mod math;
pub mod scene;
pub mod sink;
pub mod sync;

pub use config::{AxisConvention, EmitterBinding, EngineDesc, SinkDesc, SyncDesc};
#[cfg(feature = "device")]
pub use config::OutputDesc;
#[cfg(feature = "device")]
pub use engine::DeviceEngine;
pub use engine::{EmitterHandle, EmitterId, ParameterEngine, ParameterReceiver, SpatialEngine};
pub use error::SonicSyncError;
pub use events::{PoseRole, SyncEvent};
pub use extractor::PoseExtractor;
pub use math::{Orientation, Pose3D};
pub use sink::{ListenerState, SpatialAudioSink};
pub use sync::{FrameOutcome, FrameSyncController, SyncSnapshot, SyncState};
