use crate::config::EngineDesc;
use crate::engine::{EmitterHandle, EmitterId, SpatialEngine};
use crate::error::{Result, SonicSyncError};
use crate::math::{Orientation, Vec3};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Parameter updates sent from the render thread to the audio render thread.
///
/// Each command is applied as a whole, so an orientation never arrives with only
/// one of its two vectors updated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterCommand {
    /// Session (re)started: forget every emitter and restore the default listener
    Reset,
    ListenerPosition(Vec3),
    ListenerOrientation(Orientation),
    EmitterCreated(EmitterHandle),
    EmitterDestroyed(EmitterHandle),
    EmitterPosition(EmitterHandle, Vec3),
}

#[derive(Debug, Clone, Copy, Default)]
struct EmitterParams {
    active: bool,
    position: Vec3,
}

/// Audio-thread copy of the spatialization parameters.
///
/// Sized once for the engine's emitter capacity so applying commands never
/// allocates.
#[derive(Debug, Clone)]
pub struct SpatialParams {
    pub listener_position: Vec3,
    pub listener_orientation: Orientation,
    emitters: Vec<EmitterParams>,
}

impl SpatialParams {
    pub fn new(max_emitters: usize) -> Self {
        Self {
            listener_position: Vec3::ZERO,
            listener_orientation: Orientation::IDENTITY,
            emitters: vec![EmitterParams::default(); max_emitters],
        }
    }

    /// Position of an active emitter.
    pub fn emitter_position(&self, handle: EmitterHandle) -> Option<Vec3> {
        self.emitters
            .get(handle.0 as usize)
            .filter(|e| e.active)
            .map(|e| e.position)
    }

    pub fn active_emitters(&self) -> impl Iterator<Item = (EmitterHandle, Vec3)> + '_ {
        self.emitters
            .iter()
            .enumerate()
            .filter(|(_, e)| e.active)
            .map(|(slot, e)| (EmitterHandle(slot as u32), e.position))
    }

    /// Direction from the listener to `position`, in the listener's frame
    /// (x = right, y = up, z = forward).
    pub fn listener_relative_direction(&self, position: Vec3) -> Vec3 {
        let direction = (position - self.listener_position).normalize_or_zero();
        let orientation = self.listener_orientation;
        Vec3::new(
            direction.dot(orientation.right()),
            direction.dot(orientation.up),
            direction.dot(orientation.forward),
        )
    }

    pub fn apply(&mut self, command: ParameterCommand) {
        match command {
            ParameterCommand::Reset => {
                self.listener_position = Vec3::ZERO;
                self.listener_orientation = Orientation::IDENTITY;
                self.emitters.fill(EmitterParams::default());
            }
            ParameterCommand::ListenerPosition(position) => self.listener_position = position,
            ParameterCommand::ListenerOrientation(orientation) => {
                self.listener_orientation = orientation
            }
            // Keeps any position that was applied before the slot went active.
            ParameterCommand::EmitterCreated(handle) => {
                if let Some(slot) = self.emitters.get_mut(handle.0 as usize) {
                    slot.active = true;
                }
            }
            ParameterCommand::EmitterDestroyed(handle) => {
                if let Some(slot) = self.emitters.get_mut(handle.0 as usize) {
                    *slot = EmitterParams::default();
                }
            }
            ParameterCommand::EmitterPosition(handle, position) => {
                if let Some(slot) = self.emitters.get_mut(handle.0 as usize) {
                    slot.position = position;
                }
            }
        }
    }
}

/// Audio-thread end of a [`ParameterEngine`].
///
/// Call [`apply_pending`](Self::apply_pending) at the top of every audio quantum.
#[derive(Clone)]
pub struct ParameterReceiver {
    control: Receiver<ParameterCommand>,
    updates: Receiver<ParameterCommand>,
    running: Arc<AtomicBool>,
    max_emitters: usize,
}

impl ParameterReceiver {
    /// Drains every queued command into `params` without blocking.
    ///
    /// Lifecycle commands are applied before per-frame updates, so an emitter is
    /// active by the time its first position lands.
    ///
    /// Returns the number of commands applied.
    pub fn apply_pending(&self, params: &mut SpatialParams) -> usize {
        let mut applied = 0;
        for command in self.control.try_iter().chain(self.updates.try_iter()) {
            params.apply(command);
            applied += 1;
        }
        applied
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Fresh parameter block sized for the engine this receiver belongs to.
    pub fn new_params(&self) -> SpatialParams {
        SpatialParams::new(self.max_emitters)
    }
}

/// One bounded queue plus the receiver end the engine keeps for discarding.
struct Queue {
    sender: Sender<ParameterCommand>,
    receiver: Receiver<ParameterCommand>,
}

impl Queue {
    fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self { sender, receiver }
    }

    fn discard(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

/// Engine that forwards every write to an audio render thread.
///
/// Per-frame writes are `try_send`s into a bounded channel: the render thread never
/// waits on the audio thread. If the audio thread falls behind and the channel fills
/// up, the write is refused, counted in [`dropped_commands`](Self::dropped_commands)
/// and reported as not applied, so the sink sends it again next frame.
///
/// Session commands (reset, emitter created and destroyed) travel on a second
/// channel sized for `2 * max_emitters + 2` commands, so per-frame traffic can
/// never crowd them out.
pub struct ParameterEngine {
    desc: EngineDesc,
    control: Queue,
    updates: Queue,
    running: Arc<AtomicBool>,
    slots: Vec<Option<EmitterId>>,
    dropped: Arc<AtomicU64>,
}

impl ParameterEngine {
    pub fn new(desc: EngineDesc) -> Result<Self> {
        desc.validate()?;
        Ok(Self {
            slots: vec![None; desc.max_emitters],
            control: Queue::bounded(desc.max_emitters * 2 + 2),
            updates: Queue::bounded(desc.command_capacity),
            desc,
            running: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Returns a receiver for the audio render thread.
    pub fn receiver(&self) -> ParameterReceiver {
        ParameterReceiver {
            control: self.control.receiver.clone(),
            updates: self.updates.receiver.clone(),
            running: self.running.clone(),
            max_emitters: self.desc.max_emitters,
        }
    }

    pub fn desc(&self) -> &EngineDesc {
        &self.desc
    }

    /// Number of commands refused because their channel was full.
    pub fn dropped_commands(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Id an active handle was created for.
    pub fn emitter_id(&self, handle: EmitterHandle) -> Option<&EmitterId> {
        self.slots.get(handle.0 as usize)?.as_ref()
    }

    /// Queues `command` on `queue`. Returns whether it was queued.
    fn push(&self, queue: &Queue, command: ParameterCommand) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        match queue.sender.try_send(command) {
            Ok(()) => {
                log::trace!("Queued {:?}", command);
                true
            }
            Err(TrySendError::Full(command)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(
                    "Parameter channel full, refused {:?} ({} refused so far)",
                    command,
                    dropped
                );
                false
            }
            // We hold a receiver ourselves, so the channel cannot disconnect.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Empties both queues. Returns how many commands were thrown away.
    fn discard_pending(&self) -> usize {
        self.control.discard() + self.updates.discard()
    }
}

impl SpatialEngine for ParameterEngine {
    fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        // Anything still queued belongs to the previous session.
        let stale = self.discard_pending();
        if stale > 0 {
            log::debug!("Discarded {} stale parameter commands", stale);
        }

        self.running.store(true, Ordering::Release);
        if !self.push(&self.control, ParameterCommand::Reset) {
            self.running.store(false, Ordering::Release);
            return Err(SonicSyncError::Engine(
                "could not queue the session reset".to_string(),
            ));
        }
        log::info!(
            "Parameter engine started (max_emitters: {}, command_capacity: {})",
            self.desc.max_emitters,
            self.desc.command_capacity
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        // Whatever the audio side has not consumed yet is superseded by the reset,
        // and clearing the queues guarantees the reset fits.
        let superseded = self.discard_pending();
        if superseded > 0 {
            log::debug!("Discarded {} unconsumed commands on stop", superseded);
        }
        if !self.push(&self.control, ParameterCommand::Reset) {
            log::warn!("Session reset could not be queued on stop");
        }
        self.slots.fill(None);
        self.running.store(false, Ordering::Release);
        log::info!("Parameter engine stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn create_emitter(&mut self, id: &EmitterId) -> Result<EmitterHandle> {
        if !self.is_running() {
            return Err(SonicSyncError::Engine(format!(
                "cannot create emitter {} before the engine is started",
                id
            )));
        }
        if !self.desc.accepts(id) {
            return Err(SonicSyncError::UnknownEmitter(id.to_string()));
        }
        if self.slots.iter().flatten().any(|existing| existing == id) {
            return Err(SonicSyncError::DuplicateEmitter(id.to_string()));
        }

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SonicSyncError::EmitterCapacity {
                max: self.desc.max_emitters,
            })?;

        let handle = EmitterHandle(slot as u32);
        if !self.push(&self.control, ParameterCommand::EmitterCreated(handle)) {
            return Err(SonicSyncError::Engine(format!(
                "audio side is not draining session commands, emitter {} not created",
                id
            )));
        }
        self.slots[slot] = Some(id.clone());
        log::info!("Created emitter {} as {}", id, handle);
        Ok(handle)
    }

    fn destroy_emitter(&mut self, handle: EmitterHandle) {
        let Some(id) = self.slots.get_mut(handle.0 as usize).and_then(Option::take) else {
            return;
        };
        if !self.push(&self.control, ParameterCommand::EmitterDestroyed(handle)) {
            log::warn!("Destroy of {} not delivered, it clears on the next reset", handle);
        }
        log::info!("Destroyed emitter {} ({})", id, handle);
    }

    fn set_listener_position(&mut self, position: Vec3) -> bool {
        self.push(&self.updates, ParameterCommand::ListenerPosition(position))
    }

    fn set_listener_orientation(&mut self, orientation: Orientation) -> bool {
        self.push(&self.updates, ParameterCommand::ListenerOrientation(orientation))
    }

    fn set_emitter_position(&mut self, emitter: EmitterHandle, position: Vec3) -> bool {
        if self.emitter_id(emitter).is_none() {
            log::warn!("Position for unknown {} ignored", emitter);
            return false;
        }
        self.push(&self.updates, ParameterCommand::EmitterPosition(emitter, position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_engine(desc: EngineDesc) -> (ParameterEngine, ParameterReceiver) {
        let mut engine = ParameterEngine::new(desc).unwrap();
        let receiver = engine.receiver();
        engine.start().unwrap();
        (engine, receiver)
    }

    #[test]
    fn test_updates_reach_audio_side() {
        let (mut engine, receiver) = started_engine(EngineDesc::default());
        let emitter = engine.create_emitter(&EmitterId::from("src")).unwrap();

        engine.set_listener_position(Vec3::new(0.0, 1.0, 0.0));
        engine.set_emitter_position(emitter, Vec3::new(5.0, 0.0, 0.0));

        let mut params = receiver.new_params();
        // Reset + created + listener + emitter
        assert_eq!(receiver.apply_pending(&mut params), 4);
        assert_eq!(params.listener_position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(params.emitter_position(emitter), Some(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(receiver.apply_pending(&mut params), 0);
    }

    #[test]
    fn test_orientation_is_one_command() {
        let (mut engine, receiver) = started_engine(EngineDesc::default());
        let mut params = receiver.new_params();
        receiver.apply_pending(&mut params);

        let orientation = Orientation::new(Vec3::X, Vec3::Z);
        engine.set_listener_orientation(orientation);

        assert_eq!(
            receiver.updates.try_recv(),
            Ok(ParameterCommand::ListenerOrientation(orientation))
        );
        assert!(receiver.updates.try_recv().is_err());
    }

    #[test]
    fn test_writes_before_start_are_dropped() {
        let mut engine = ParameterEngine::new(EngineDesc::default()).unwrap();
        let receiver = engine.receiver();
        engine.set_listener_position(Vec3::ONE);

        let mut params = receiver.new_params();
        assert_eq!(receiver.apply_pending(&mut params), 0);
        assert!(
            engine
                .create_emitter(&EmitterId::from("src"))
                .is_err()
        );
    }

    #[test]
    fn test_full_channel_drops_and_counts() {
        let (mut engine, receiver) = started_engine(EngineDesc::default().command_capacity(2));
        assert!(engine.set_listener_position(Vec3::X));
        assert!(engine.set_listener_position(Vec3::Y));
        assert!(!engine.set_listener_position(Vec3::Z));
        assert_eq!(engine.dropped_commands(), 1);

        let mut params = receiver.new_params();
        // Reset + two positions
        assert_eq!(receiver.apply_pending(&mut params), 3);
        assert_eq!(params.listener_position, Vec3::Y);
        assert!(engine.set_listener_position(Vec3::Z));
    }

    #[test]
    fn test_session_commands_survive_full_update_channel() {
        let (mut engine, receiver) = started_engine(EngineDesc::default().command_capacity(1));
        let emitter = engine.create_emitter(&EmitterId::from("src")).unwrap();
        assert!(engine.set_emitter_position(emitter, Vec3::ONE));
        assert!(!engine.set_listener_position(Vec3::X));

        let mut params = receiver.new_params();
        receiver.apply_pending(&mut params);
        assert_eq!(
            params.active_emitters().collect::<Vec<_>>(),
            vec![(emitter, Vec3::ONE)]
        );
    }

    #[test]
    fn test_stop_reset_delivered_with_backlog() {
        let (mut engine, receiver) = started_engine(EngineDesc::default().command_capacity(1));
        let emitter = engine.create_emitter(&EmitterId::from("src")).unwrap();
        assert!(engine.set_emitter_position(emitter, Vec3::ONE));
        assert!(!engine.set_emitter_position(emitter, Vec3::X));
        engine.stop().unwrap();

        let mut params = receiver.new_params();
        params.apply(ParameterCommand::EmitterCreated(emitter));
        assert_eq!(receiver.apply_pending(&mut params), 1);
        assert_eq!(params.active_emitters().count(), 0);
    }

    #[test]
    fn test_create_fails_when_session_queue_is_full() {
        // Session queue holds four commands for a single-emitter engine.
        let (mut engine, receiver) = started_engine(EngineDesc::default().max_emitters(1));
        let a = engine.create_emitter(&EmitterId::from("a")).unwrap();
        engine.destroy_emitter(a);
        let b = engine.create_emitter(&EmitterId::from("b")).unwrap();
        engine.destroy_emitter(b);

        assert!(matches!(
            engine.create_emitter(&EmitterId::from("c")),
            Err(SonicSyncError::Engine(_))
        ));
        assert!(engine.emitter_id(EmitterHandle(0)).is_none());

        let mut params = receiver.new_params();
        receiver.apply_pending(&mut params);
        let c = engine.create_emitter(&EmitterId::from("c")).unwrap();
        receiver.apply_pending(&mut params);
        assert_eq!(params.emitter_position(c), Some(Vec3::ZERO));
    }

    #[test]
    fn test_position_applied_before_creation_is_kept() {
        let mut params = SpatialParams::new(2);
        params.apply(ParameterCommand::EmitterPosition(EmitterHandle(1), Vec3::X));
        assert_eq!(params.emitter_position(EmitterHandle(1)), None);

        params.apply(ParameterCommand::EmitterCreated(EmitterHandle(1)));
        assert_eq!(params.emitter_position(EmitterHandle(1)), Some(Vec3::X));

        params.apply(ParameterCommand::EmitterDestroyed(EmitterHandle(1)));
        params.apply(ParameterCommand::EmitterCreated(EmitterHandle(1)));
        assert_eq!(params.emitter_position(EmitterHandle(1)), Some(Vec3::ZERO));
    }

    #[test]
    fn test_unknown_and_excess_emitters() {
        let desc = EngineDesc::default()
            .max_emitters(1)
            .known_emitter("a")
            .known_emitter("b");
        let (mut engine, _receiver) = started_engine(desc);

        assert!(matches!(
            engine.create_emitter(&EmitterId::from("zzz")),
            Err(SonicSyncError::UnknownEmitter(_))
        ));
        let a = engine.create_emitter(&EmitterId::from("a")).unwrap();
        assert!(matches!(
            engine.create_emitter(&EmitterId::from("a")),
            Err(SonicSyncError::DuplicateEmitter(_))
        ));
        assert!(matches!(
            engine.create_emitter(&EmitterId::from("b")),
            Err(SonicSyncError::EmitterCapacity { max: 1 })
        ));

        engine.destroy_emitter(a);
        assert!(engine.create_emitter(&EmitterId::from("b")).is_ok());
    }

    #[test]
    fn test_restart_discards_stale_commands() {
        let (mut engine, receiver) = started_engine(EngineDesc::default());
        let emitter = engine.create_emitter(&EmitterId::from("src")).unwrap();
        engine.set_emitter_position(emitter, Vec3::ONE);
        engine.stop().unwrap();
        engine.start().unwrap();

        let mut params = receiver.new_params();
        assert_eq!(receiver.apply_pending(&mut params), 1);
        assert_eq!(params.active_emitters().count(), 0);
    }

    #[test]
    fn test_listener_relative_direction() {
        let mut params = SpatialParams::new(1);
        params.apply(ParameterCommand::ListenerPosition(Vec3::new(0.0, 1.0, 0.0)));

        let right = params.listener_relative_direction(Vec3::new(5.0, 1.0, 0.0));
        assert!(right.abs_diff_eq(Vec3::X, 1e-6));
        let ahead = params.listener_relative_direction(Vec3::new(0.0, 1.0, -3.0));
        assert!(ahead.abs_diff_eq(Vec3::Z, 1e-6));
    }
}
