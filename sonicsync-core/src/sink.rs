//! Applies extracted poses to a spatial audio engine.

use crate::config::SinkDesc;
use crate::engine::{EmitterHandle, EmitterId, SpatialEngine};
use crate::error::Result;
use crate::math::{AngularOrientation, Orientation, Pose3D, Vec3, vec3_bits_eq};
use std::collections::HashMap;

/// Last listener values the engine accepted from the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ListenerState {
    pub position: Option<Vec3>,
    pub orientation: Option<Orientation>,
}

#[derive(Debug)]
struct EmitterSlot {
    handle: EmitterHandle,
    last_position: Option<Vec3>,
}

/// Sole writer of an engine's spatialization parameters.
///
/// The sink owns the engine by value, so nothing else can write to it while a
/// session is open. All write methods are meant for the render thread and never
/// block; they return `true` when the engine accepted the write.
///
/// A value is only remembered for redundant-write skipping once the engine has
/// accepted it. A refused write is simply sent again on the next frame.
///
/// # Session lifecycle
///
/// [`open`](Self::open) starts the engine and creates one [`EmitterHandle`] per
/// configured emitter; [`close`](Self::close) destroys them and stops the engine.
/// Writes while closed are dropped.
pub struct SpatialAudioSink<E: SpatialEngine> {
    engine: E,
    desc: SinkDesc,
    listener: ListenerState,
    emitters: HashMap<EmitterId, EmitterSlot>,
    open: bool,
    writes: u64,
}

impl<E: SpatialEngine> SpatialAudioSink<E> {
    pub fn new(engine: E) -> Self {
        Self::with_desc(engine, SinkDesc::default())
    }

    pub fn with_desc(engine: E, desc: SinkDesc) -> Self {
        Self {
            engine,
            desc,
            listener: ListenerState::default(),
            emitters: HashMap::new(),
            open: false,
            writes: 0,
        }
    }

    /// Starts the engine and allocates handles for `emitters`.
    ///
    /// # Errors
    ///
    /// Fails if the engine cannot start or rejects one of the emitter ids. On
    /// failure every handle created so far is released and the engine is stopped
    /// again, leaving the sink closed.
    pub fn open(&mut self, emitters: &[EmitterId]) -> Result<()> {
        if self.open {
            return Ok(());
        }

        self.engine.start()?;
        for id in emitters {
            match self.engine.create_emitter(id) {
                Ok(handle) => {
                    self.emitters.insert(
                        id.clone(),
                        EmitterSlot {
                            handle,
                            last_position: None,
                        },
                    );
                }
                Err(e) => {
                    log::error!("Failed to create emitter {}: {}", id, e);
                    if let Err(stop_err) = self.release() {
                        log::warn!("Engine stop after failed open also failed: {}", stop_err);
                    }
                    return Err(e);
                }
            }
        }

        self.listener = ListenerState::default();
        self.open = true;
        log::info!("Spatial audio sink opened with {} emitters", emitters.len());
        Ok(())
    }

    /// Destroys every emitter handle and stops the engine. Safe to call when closed.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.listener = ListenerState::default();
        let result = self.release();
        log::info!("Spatial audio sink closed after {} writes", self.writes);
        result
    }

    fn release(&mut self) -> Result<()> {
        for (_, slot) in self.emitters.drain() {
            self.engine.destroy_emitter(slot.handle);
        }
        self.engine.stop()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn set_listener_position(&mut self, position: Vec3) -> bool {
        if !self.open {
            return false;
        }
        if self.desc.skip_redundant_writes
            && self
                .listener
                .position
                .is_some_and(|last| vec3_bits_eq(last, position))
        {
            return false;
        }

        if !self.engine.set_listener_position(position) {
            log::trace!("Listener position {:?} refused, retrying next frame", position);
            return false;
        }
        self.listener.position = Some(position);
        self.writes += 1;
        log::trace!("Listener position -> {:?}", position);
        true
    }

    /// Writes forward and up as one engine update.
    pub fn set_listener_orientation(&mut self, orientation: Orientation) -> bool {
        if !self.open {
            return false;
        }
        let orientation = if self.desc.renormalize_orientation {
            orientation.renormalized()
        } else {
            orientation
        };
        if self.desc.skip_redundant_writes
            && self
                .listener
                .orientation
                .is_some_and(|last| last.bits_eq(&orientation))
        {
            return false;
        }

        if !self.engine.set_listener_orientation(orientation) {
            log::trace!("Listener orientation {:?} refused, retrying next frame", orientation);
            return false;
        }
        self.listener.orientation = Some(orientation);
        self.writes += 1;
        log::trace!("Listener orientation -> {:?}", orientation);
        true
    }

    /// Reserved for engines that take yaw/pitch/roll.
    ///
    /// Handed to [`SpatialEngine::set_listener_angular`] but never counted as a
    /// write and never tracked in [`ListenerState`]; the reference engines ignore it.
    pub fn set_listener_orientation_angular(&mut self, angles: AngularOrientation) -> bool {
        if !self.open {
            return false;
        }
        log::debug!("Angular listener orientation passed through: {:?}", angles);
        self.engine.set_listener_angular(angles);
        false
    }

    /// Position and orientation of a listener pose, each as its own update.
    pub fn apply_listener_pose(&mut self, pose: &Pose3D) -> usize {
        usize::from(self.set_listener_position(pose.position()))
            + usize::from(self.set_listener_orientation(pose.orientation()))
    }

    pub fn set_emitter_position(&mut self, emitter: &EmitterId, position: Vec3) -> bool {
        if !self.open {
            return false;
        }
        let Some(slot) = self.emitters.get_mut(emitter) else {
            log::warn!("Position for unregistered emitter {} ignored", emitter);
            return false;
        };
        if self.desc.skip_redundant_writes
            && slot
                .last_position
                .is_some_and(|last| vec3_bits_eq(last, position))
        {
            return false;
        }

        if !self.engine.set_emitter_position(slot.handle, position) {
            log::trace!("Emitter {} position refused, retrying next frame", emitter);
            return false;
        }
        slot.last_position = Some(position);
        self.writes += 1;
        log::trace!("Emitter {} position -> {:?}", emitter, position);
        true
    }

    pub fn listener_state(&self) -> ListenerState {
        self.listener
    }

    pub fn emitter_handle(&self, emitter: &EmitterId) -> Option<EmitterHandle> {
        self.emitters.get(emitter).map(|slot| slot.handle)
    }

    /// Total engine writes accepted since the sink was created.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn desc(&self) -> &SinkDesc {
        &self.desc
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::SonicSyncError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum EngineCall {
        Start,
        Stop,
        CreateEmitter(EmitterId),
        DestroyEmitter(EmitterHandle),
        ListenerPosition(Vec3),
        ListenerOrientation(Orientation),
        ListenerAngular(AngularOrientation),
        EmitterPosition(EmitterHandle, Vec3),
    }

    impl EngineCall {
        pub fn is_write(&self) -> bool {
            matches!(
                self,
                Self::ListenerPosition(_) | Self::ListenerOrientation(_) | Self::EmitterPosition(..)
            )
        }
    }

    /// Engine that records every accepted call. Clones share the same log and the
    /// same refusal switch.
    #[derive(Clone, Default)]
    pub struct RecordingEngine {
        log: Arc<Mutex<Vec<EngineCall>>>,
        refuse_writes: Arc<AtomicBool>,
        pub known: Vec<EmitterId>,
        running: bool,
        next_handle: u32,
    }

    impl RecordingEngine {
        pub fn accepting(ids: &[&str]) -> Self {
            Self {
                known: ids.iter().map(|id| EmitterId::from(*id)).collect(),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<EngineCall> {
            self.log.lock().unwrap().clone()
        }

        pub fn writes(&self) -> Vec<EngineCall> {
            self.calls().into_iter().filter(EngineCall::is_write).collect()
        }

        /// While set, pose setters refuse their value as a full queue would.
        pub fn refuse_writes(&self, refuse: bool) {
            self.refuse_writes.store(refuse, Ordering::SeqCst);
        }

        fn record(&self, call: EngineCall) {
            self.log.lock().unwrap().push(call);
        }

        fn record_write(&self, call: EngineCall) -> bool {
            if self.refuse_writes.load(Ordering::SeqCst) {
                return false;
            }
            self.record(call);
            true
        }
    }

    impl SpatialEngine for RecordingEngine {
        fn start(&mut self) -> Result<()> {
            self.running = true;
            self.record(EngineCall::Start);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.running = false;
            self.record(EngineCall::Stop);
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn create_emitter(&mut self, id: &EmitterId) -> Result<EmitterHandle> {
            if !self.known.is_empty() && !self.known.contains(id) {
                return Err(SonicSyncError::UnknownEmitter(id.to_string()));
            }
            self.record(EngineCall::CreateEmitter(id.clone()));
            let handle = EmitterHandle(self.next_handle);
            self.next_handle += 1;
            Ok(handle)
        }

        fn destroy_emitter(&mut self, handle: EmitterHandle) {
            self.record(EngineCall::DestroyEmitter(handle));
        }

        fn set_listener_position(&mut self, position: Vec3) -> bool {
            self.record_write(EngineCall::ListenerPosition(position))
        }

        fn set_listener_orientation(&mut self, orientation: Orientation) -> bool {
            self.record_write(EngineCall::ListenerOrientation(orientation))
        }

        fn set_listener_angular(&mut self, angles: AngularOrientation) -> bool {
            self.record(EngineCall::ListenerAngular(angles));
            false
        }

        fn set_emitter_position(&mut self, emitter: EmitterHandle, position: Vec3) -> bool {
            self.record_write(EngineCall::EmitterPosition(emitter, position))
        }
    }
}
