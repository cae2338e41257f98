use crate::config::{EngineDesc, OutputDesc};
use crate::engine::{
    EmitterHandle, EmitterId, ParameterEngine, ParameterReceiver, SpatialEngine, SpatialParams,
};
use crate::error::{Result, SonicSyncError};
use crate::math::{Orientation, Vec3};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::Sender;
use std::f32::consts::{FRAC_PI_4, TAU};
use std::thread::JoinHandle;

struct OutputThread {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// [`ParameterEngine`] wired to the default output device.
///
/// Every active emitter plays a sine tone, attenuated by distance and panned by its
/// direction relative to the listener. Useful for hearing that poses arrive; it is
/// not a production renderer.
///
/// The `cpal` stream lives on its own thread because streams are not `Send` on every
/// host. [`start`](SpatialEngine::start) returns once the stream is playing.
pub struct DeviceEngine {
    params: ParameterEngine,
    output_desc: OutputDesc,
    output: Option<OutputThread>,
}

impl DeviceEngine {
    pub fn new(engine_desc: EngineDesc, output_desc: OutputDesc) -> Result<Self> {
        Ok(Self {
            params: ParameterEngine::new(engine_desc)?,
            output_desc,
            output: None,
        })
    }

    pub fn output_desc(&self) -> &OutputDesc {
        &self.output_desc
    }

    pub fn dropped_commands(&self) -> u64 {
        self.params.dropped_commands()
    }

    fn spawn_output(&self) -> Result<OutputThread> {
        let receiver = self.params.receiver();
        let desc = self.output_desc.clone();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("sonicsync-output".into())
            .spawn(move || {
                let stream = match open_stream(&desc, receiver) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(SonicSyncError::AudioDevice(format!(
                        "Failed to start stream: {}",
                        e
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Park until stop() signals or the engine is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| SonicSyncError::Engine(format!("Failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(OutputThread {
                stop: stop_tx,
                handle,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SonicSyncError::Engine(
                    "Output thread exited before the stream started".into(),
                ))
            }
        }
    }
}

impl SpatialEngine for DeviceEngine {
    fn start(&mut self) -> Result<()> {
        if self.output.is_some() {
            return Ok(());
        }

        self.params.start()?;
        match self.spawn_output() {
            Ok(output) => {
                self.output = Some(output);
                log::info!(
                    "Device output started ({} Hz, {} channels)",
                    self.output_desc.sample_rate,
                    self.output_desc.channels
                );
                Ok(())
            }
            Err(e) => {
                self.params.stop()?;
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(output) = self.output.take() {
            let _ = output.stop.send(());
            if output.handle.join().is_err() {
                log::error!("Output thread panicked");
            }
            log::info!("Device output stopped");
        }
        self.params.stop()
    }

    fn is_running(&self) -> bool {
        self.output.is_some() && self.params.is_running()
    }

    fn create_emitter(&mut self, id: &EmitterId) -> Result<EmitterHandle> {
        self.params.create_emitter(id)
    }

    fn destroy_emitter(&mut self, handle: EmitterHandle) {
        self.params.destroy_emitter(handle)
    }

    fn set_listener_position(&mut self, position: Vec3) -> bool {
        self.params.set_listener_position(position)
    }

    fn set_listener_orientation(&mut self, orientation: Orientation) -> bool {
        self.params.set_listener_orientation(orientation)
    }

    fn set_emitter_position(&mut self, emitter: EmitterHandle, position: Vec3) -> bool {
        self.params.set_emitter_position(emitter, position)
    }
}

impl Drop for DeviceEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn open_stream(desc: &OutputDesc, receiver: ParameterReceiver) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        SonicSyncError::AudioDevice("No default output device available".into())
    })?;

    let default_config = device.default_output_config().map_err(|e| {
        SonicSyncError::AudioDevice(format!("Failed to get default config: {}", e))
    })?;

    let config = cpal::StreamConfig {
        channels: desc.channels,
        sample_rate: cpal::SampleRate(desc.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    match default_config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, desc, receiver),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, desc, receiver),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, desc, receiver),
        _ => Err(SonicSyncError::AudioFormat(
            "Unsupported sample format".into(),
        )),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    desc: &OutputDesc,
    receiver: ParameterReceiver,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut renderer = ToneRenderer::new(desc, receiver.new_params());
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                receiver.apply_pending(&mut renderer.params);
                renderer.render(data, channels);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| SonicSyncError::AudioDevice(format!("Failed to build stream: {}", e)))
}

/// Mixes one sine tone per active emitter into an interleaved buffer.
struct ToneRenderer {
    params: SpatialParams,
    phase: f32,
    phase_step: f32,
    reference_distance: f32,
    rolloff: f32,
    gain: f32,
}

impl ToneRenderer {
    fn new(desc: &OutputDesc, params: SpatialParams) -> Self {
        Self {
            params,
            phase: 0.0,
            phase_step: TAU * desc.tone_hz / desc.sample_rate as f32,
            reference_distance: desc.reference_distance,
            rolloff: desc.rolloff,
            gain: desc.gain,
        }
    }

    /// Left/right gains summed over every active emitter for this quantum.
    fn channel_gains(&self) -> (f32, f32) {
        let mut left = 0.0;
        let mut right = 0.0;
        for (_, position) in self.params.active_emitters() {
            let distance = position.distance(self.params.listener_position);
            let excess = (distance - self.reference_distance).max(0.0);
            let attenuation = 1.0 / (1.0 + self.rolloff * excess);

            // Equal-power pan from the lateral component.
            let pan = self.params.listener_relative_direction(position).x;
            let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
            left += attenuation * angle.cos();
            right += attenuation * angle.sin();
        }
        (left * self.gain, right * self.gain)
    }

    fn render<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        let (left, right) = self.channel_gains();

        for frame in data.chunks_mut(channels) {
            let sample = self.phase.sin();
            self.phase = (self.phase + self.phase_step) % TAU;

            for (channel, out) in frame.iter_mut().enumerate() {
                let value = match (channels, channel) {
                    (1, _) => sample * 0.5 * (left + right),
                    (_, 0) => sample * left,
                    (_, 1) => sample * right,
                    _ => 0.0,
                };
                *out = T::from_sample(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ParameterCommand;

    fn renderer_with_emitter(position: Vec3) -> ToneRenderer {
        let mut params = SpatialParams::new(1);
        params.apply(ParameterCommand::EmitterCreated(EmitterHandle(0)));
        params.apply(ParameterCommand::EmitterPosition(EmitterHandle(0), position));
        ToneRenderer::new(&OutputDesc::default(), params)
    }

    #[test]
    fn test_emitter_on_right_pans_right() {
        let renderer = renderer_with_emitter(Vec3::new(1.0, 0.0, 0.0));
        let (left, right) = renderer.channel_gains();
        assert!(right > left);
        assert!(left.abs() < 1e-6);
    }

    #[test]
    fn test_attenuation_past_reference_distance() {
        let near = renderer_with_emitter(Vec3::new(0.0, 0.0, -1.0)).channel_gains();
        let far = renderer_with_emitter(Vec3::new(0.0, 0.0, -5.0)).channel_gains();
        assert!(far.0 < near.0);
        assert!((near.0 - near.1).abs() < 1e-6);
    }

    #[test]
    fn test_silence_without_emitters() {
        let mut renderer = ToneRenderer::new(&OutputDesc::default(), SpatialParams::new(1));
        let mut buffer = vec![1.0f32; 64];
        renderer.render(&mut buffer, 2);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }
}
