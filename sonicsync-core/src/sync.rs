//! Per-frame orchestration: scene snapshot in, engine parameter writes out.

use crate::config::SyncDesc;
use crate::engine::{EmitterId, SpatialEngine};
use crate::error::Result;
use crate::events::{PoseRole, SyncEvent};
use crate::extractor::PoseExtractor;
use crate::scene::SceneQuery;
use crate::sink::SpatialAudioSink;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
}

/// What a single [`FrameSyncController::on_frame`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Controller is not running; nothing was read or written
    Idle,
    /// A `start`/`stop` held the controller; the frame was skipped
    Contended,
    /// Poses were extracted and forwarded
    Applied {
        /// Listener node was found this frame
        listener: bool,
        /// Number of emitter nodes found this frame
        emitters: usize,
        /// Engine writes accepted (redundant and refused writes excluded)
        writes: usize,
    },
}

/// Point-in-time view of a controller, cheap enough to poll from a UI thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSnapshot {
    pub state: SyncState,
    pub frames_applied: u64,
    pub frames_skipped: u64,
    pub last_elapsed: Duration,
    pub engine_writes: u64,
}

struct Inner<E: SpatialEngine> {
    sink: SpatialAudioSink<E>,
    extractor: PoseExtractor,
    emitter_ids: Vec<EmitterId>,
    /// Whether each role's node was present last frame: listener first, then emitters.
    present: Vec<bool>,
    subscribers: Vec<Sender<SyncEvent>>,
}

impl<E: SpatialEngine> Inner<E> {
    fn role(&self, index: usize) -> PoseRole {
        match index {
            0 => PoseRole::Listener,
            n => PoseRole::Emitter(self.emitter_ids[n - 1].clone()),
        }
    }

    fn track_presence(&mut self, index: usize, found: bool) {
        if self.present[index] == found {
            return;
        }
        self.present[index] = found;
        let role = self.role(index);
        if found {
            log::debug!("{} node found again", role);
            self.publish(SyncEvent::NodeFound { role });
        } else {
            log::debug!("{} node missing, holding last pose", role);
            self.publish(SyncEvent::NodeLost { role });
        }
    }

    fn publish(&mut self, event: SyncEvent) {
        self.subscribers
            .retain(|subscriber| match subscriber.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::warn!("Subscriber lagging, dropped {:?}", event);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    fn sync_frame<S: SceneQuery + ?Sized>(&mut self, scene: &S) -> FrameOutcome {
        let mut writes = 0;

        let listener = self.extractor.extract_listener(scene);
        if let Some(pose) = &listener {
            writes += self.sink.apply_listener_pose(pose);
        }
        self.track_presence(0, listener.is_some());

        let mut emitters = 0;
        for index in 0..self.emitter_ids.len() {
            let pose = self.extractor.extract_emitter(scene, index);
            if let Some(pose) = &pose {
                emitters += 1;
                if self
                    .sink
                    .set_emitter_position(&self.emitter_ids[index], pose.position())
                {
                    writes += 1;
                }
            }
            self.track_presence(index + 1, pose.is_some());
        }

        FrameOutcome::Applied {
            listener: listener.is_some(),
            emitters,
            writes,
        }
    }
}

/// Drives a [`SpatialAudioSink`] from scene snapshots, once per rendered frame.
///
/// # Threading
///
/// - [`on_frame`](Self::on_frame) is called from the render thread and never blocks:
///   it checks an atomic running flag and then `try_lock`s the shared state. A frame
///   that collides with a concurrent `start`/`stop` is skipped.
/// - [`start`](Self::start) and [`stop`](Self::stop) are called from a UI or lifecycle
///   thread. They take the lock, so once `stop` returns no frame is mid-write and no
///   later frame will write.
///
/// Share it between threads with `Arc<FrameSyncController<E>>`.
pub struct FrameSyncController<E: SpatialEngine> {
    desc: SyncDesc,
    inner: Mutex<Inner<E>>,
    running: AtomicBool,
    frames_applied: AtomicU64,
    frames_skipped: AtomicU64,
    last_elapsed_nanos: AtomicU64,
    engine_writes: AtomicU64,
}

impl<E: SpatialEngine> FrameSyncController<E> {
    /// Creates an idle controller around `sink`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `desc` fails [`SyncDesc::validate`].
    pub fn new(desc: SyncDesc, sink: SpatialAudioSink<E>) -> Result<Self> {
        desc.validate()?;

        let extractor = PoseExtractor::new(
            desc.listener_node.clone(),
            desc.emitters.iter().map(|binding| binding.node.clone()),
            desc.convention,
        );
        let emitter_ids = desc.emitter_ids();
        let present = vec![true; emitter_ids.len() + 1];

        Ok(Self {
            inner: Mutex::new(Inner {
                sink,
                extractor,
                emitter_ids,
                present,
                subscribers: Vec::new(),
            }),
            desc,
            running: AtomicBool::new(false),
            frames_applied: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            last_elapsed_nanos: AtomicU64::new(0),
            engine_writes: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idle -> Running. Starts the engine and creates emitter handles before the
    /// first frame can observe the running state.
    ///
    /// Calling it while already running does nothing.
    ///
    /// # Errors
    ///
    /// Engine or emitter wiring failures (unknown emitter id, capacity). The
    /// controller stays idle.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        inner.extractor.reset();
        let ids = inner.emitter_ids.clone();
        if let Err(e) = inner.sink.open(&ids) {
            log::error!("Frame sync failed to start: {}", e);
            return Err(e);
        }
        inner.present.fill(true);

        self.running.store(true, Ordering::Release);
        inner.publish(SyncEvent::Started);
        log::info!(
            "Frame sync started (listener: '{}', emitters: {})",
            self.desc.listener_node,
            ids.len()
        );
        Ok(())
    }

    /// Starts and resolves node handles against `scene` right away, so the first
    /// frame does not pay for the name search.
    pub fn start_with_scene<S: SceneQuery + ?Sized>(&self, scene: &S) -> Result<()> {
        self.start()?;
        let found = self.lock().extractor.prime(scene);
        log::debug!("Primed {} of {} node handles", found, self.desc.emitters.len() + 1);
        Ok(())
    }

    /// Running -> Idle. Closes the sink and stops the engine.
    ///
    /// Safe to call when idle. No engine writes happen after this returns.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.lock();
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let result = inner.sink.close();
        self.engine_writes.store(inner.sink.writes(), Ordering::Relaxed);
        inner.publish(SyncEvent::Stopped);
        log::info!("Frame sync stopped");
        result
    }

    /// Per-frame entry point for the render thread.
    ///
    /// Extracts the listener and every bound emitter from `scene` and forwards the
    /// poses. Roles whose node is missing are left untouched this frame. Never fails
    /// and never blocks.
    pub fn on_frame<S: SceneQuery + ?Sized>(&self, scene: &S, elapsed: Duration) -> FrameOutcome {
        if !self.running.load(Ordering::Acquire) {
            return self.skip(FrameOutcome::Idle);
        }

        let mut inner = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return self.skip(FrameOutcome::Contended),
        };
        // stop() may have finished between the flag check and the lock.
        if !self.running.load(Ordering::Acquire) {
            return self.skip(FrameOutcome::Idle);
        }

        let outcome = inner.sync_frame(scene);

        self.frames_applied.fetch_add(1, Ordering::Relaxed);
        self.last_elapsed_nanos
            .store(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.engine_writes
            .store(inner.sink.writes(), Ordering::Relaxed);
        outcome
    }

    fn skip(&self, outcome: FrameOutcome) -> FrameOutcome {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    pub fn state(&self) -> SyncState {
        if self.running.load(Ordering::Acquire) {
            SyncState::Running
        } else {
            SyncState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SyncState::Running
    }

    /// Counters and state, read without touching the frame lock.
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            state: self.state(),
            frames_applied: self.frames_applied.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            last_elapsed: Duration::from_nanos(self.last_elapsed_nanos.load(Ordering::Relaxed)),
            engine_writes: self.engine_writes.load(Ordering::Relaxed),
        }
    }

    /// Registers an observer. Events are delivered without blocking; a subscriber
    /// that falls more than a few dozen events behind loses the overflow.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        let (sender, receiver) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
        self.lock().subscribers.push(sender);
        receiver
    }

    pub fn desc(&self) -> &SyncDesc {
        &self.desc
    }

    /// Runs `f` with the sink while holding the controller lock.
    pub fn with_sink<R>(&self, f: impl FnOnce(&SpatialAudioSink<E>) -> R) -> R {
        f(&self.lock().sink)
    }
}

impl<E: SpatialEngine> Drop for FrameSyncController<E> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Frame sync stop on drop failed: {}", e);
        }
    }
}
