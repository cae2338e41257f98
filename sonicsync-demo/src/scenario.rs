use anyhow::Result;
use crossbeam_channel::Receiver;
use sonicsync_core::math::{Mat4, Quat, Vec3};
use sonicsync_core::scene::{NodeHandle, SceneSnapshot, SceneSnapshotBuilder};
use sonicsync_core::{
    EngineDesc, FrameSyncController, ParameterEngine, ParameterReceiver, SpatialAudioSink,
    SpatialEngine, SyncDesc, SyncEvent,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const AUDIO_QUANTUM: Duration = Duration::from_millis(10);
const ORBIT_RADIUS: f32 = 5.0;
const ORBIT_PERIOD_SECS: f32 = 4.0;

/// Camera on a slowly turning rig, with a sound source circling it.
struct OrbitScene {
    builder: SceneSnapshotBuilder,
    rig: NodeHandle,
    emitter: NodeHandle,
}

impl OrbitScene {
    fn new() -> Result<Self> {
        let mut builder = SceneSnapshotBuilder::new();
        let world = builder.add_root("world", Mat4::IDENTITY);
        let rig = builder.add_child(world, "cameraRig", Mat4::IDENTITY)?;
        builder.add_child(
            rig,
            "camera",
            Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        )?;
        let emitter = builder.add_child(world, "soundSource", Mat4::IDENTITY)?;
        Ok(Self {
            builder,
            rig,
            emitter,
        })
    }

    fn at(&mut self, t: f32) -> Result<SceneSnapshot> {
        let angle = t / ORBIT_PERIOD_SECS * std::f32::consts::TAU;
        let emitter = Vec3::new(
            ORBIT_RADIUS * angle.cos(),
            0.0,
            ORBIT_RADIUS * angle.sin(),
        );
        self.builder
            .set_local_transform(self.emitter, Mat4::from_translation(emitter))?;
        self.builder
            .set_local_transform(self.rig, Mat4::from_quat(Quat::from_rotation_y(0.1 * t)))?;
        Ok(self.builder.build())
    }
}

/// Stand-in for an audio render thread: drains parameters once per quantum.
fn spawn_audio_thread(
    receiver: ParameterReceiver,
    done: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut params = receiver.new_params();
        let mut quantum = 0u64;
        while !done.load(Ordering::Acquire) {
            receiver.apply_pending(&mut params);
            if quantum % 50 == 0 {
                for (handle, position) in params.active_emitters() {
                    let direction = params.listener_relative_direction(position);
                    log::info!(
                        "[audio] {} at {:.2?}, listener-relative direction {:.2?}",
                        handle,
                        position,
                        direction
                    );
                }
            }
            quantum += 1;
            std::thread::sleep(AUDIO_QUANTUM);
        }
    })
}

fn log_event(event: &SyncEvent) {
    if event.is_lifecycle() {
        log::info!("[sync] {:?}", event);
    } else if let Some(role) = event.role() {
        log::warn!("[sync] {} node: {:?}", role, event);
    }
}

fn render_loop<E: SpatialEngine>(
    sync: &FrameSyncController<E>,
    events: &Receiver<SyncEvent>,
    seconds: f32,
) -> Result<()> {
    let mut scene = OrbitScene::new()?;
    sync.start_with_scene(&scene.at(0.0)?)?;

    let started = Instant::now();
    while started.elapsed().as_secs_f32() < seconds {
        let elapsed = started.elapsed();
        let snapshot = scene.at(elapsed.as_secs_f32())?;
        sync.on_frame(&snapshot, elapsed);

        events.try_iter().for_each(|event| log_event(&event));
        std::thread::sleep(FRAME_INTERVAL);
    }

    sync.stop()?;
    events.try_iter().for_each(|event| log_event(&event));
    log::info!("Final snapshot: {:?}", sync.snapshot());
    Ok(())
}

pub fn run_headless(seconds: f32) -> Result<()> {
    log::info!("=== Headless sync for {:.1}s ===", seconds);

    let engine = ParameterEngine::new(EngineDesc::default().known_emitter("soundSource"))?;
    let done = Arc::new(AtomicBool::new(false));
    let audio = spawn_audio_thread(engine.receiver(), done.clone());

    let sync = FrameSyncController::new(SyncDesc::default(), SpatialAudioSink::new(engine))?;
    let events = sync.subscribe();
    let result = render_loop(&sync, &events, seconds);

    done.store(true, Ordering::Release);
    if audio.join().is_err() {
        log::error!("Audio thread panicked");
    }
    result
}

#[cfg(feature = "device")]
pub fn run_device(seconds: f32) -> Result<()> {
    use sonicsync_core::{DeviceEngine, OutputDesc};

    log::info!("=== Device playback for {:.1}s (use headphones) ===", seconds);

    let engine = DeviceEngine::new(
        EngineDesc::default().known_emitter("soundSource"),
        OutputDesc::default(),
    )?;
    let sync = FrameSyncController::new(SyncDesc::default(), SpatialAudioSink::new(engine))?;
    let events = sync.subscribe();
    render_loop(&sync, &events, seconds)
}

#[cfg(not(feature = "device"))]
pub fn run_device(seconds: f32) -> Result<()> {
    log::warn!("Built without the `device` feature, running headless instead");
    run_headless(seconds)
}
