//! Output device: where 16-bit stereo frames at the fixed rate end up.
//!
//! [`OutputDevice`] is the seam to the codec/sound card. [`CpalOutput`] is the
//! host implementation: producers push into a bounded [`SharedAudio`] queue and
//! the CPAL callback drains it, mapping stereo onto the device channel layout
//! and applying the user volume.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::bus::SharedBus;
use crate::device;
use crate::queue::{SharedAudio, calc_max_buffered_samples};

/// Frames pulled from the queue per callback refill.
const REFILL_MAX_FRAMES: usize = 2048;

/// Sink for interleaved 16-bit stereo frames at the player's output rate.
pub trait OutputDevice: Send + Sync {
    /// Reset the output for a new stream.
    ///
    /// Implementations may reset their gain to a device default here; callers
    /// restore the user volume afterwards.
    fn prepare(&self, sample_rate: u32, channels: u16) -> Result<()>;

    /// Write interleaved samples, blocking until the device accepted them.
    fn write(&self, samples: &[i16]) -> Result<()>;

    /// Set output gain in percent (0..=100).
    fn set_volume(&self, percent: u8);
}

/// Bus-guarded writer handed to the pipeline engine.
#[derive(Clone)]
pub struct OutputSink {
    device: Arc<dyn OutputDevice>,
    bus: SharedBus,
}

impl OutputSink {
    pub fn new(device: Arc<dyn OutputDevice>, bus: SharedBus) -> Self {
        Self { device, bus }
    }

    /// Write one chunk while holding the shared bus.
    pub fn write(&self, samples: &[i16]) -> Result<()> {
        let _bus = self.bus.lock();
        self.device.write(samples)
    }
}

/// Convert a 16-bit sample to `f32` in `[-1.0, 1.0)`.
pub fn i16_to_f32(s: i16) -> f32 {
    s as f32 / 32_768.0
}

/// Convert an `f32` sample to 16-bit with clipping.
pub fn f32_to_i16(s: f32) -> i16 {
    (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Linear gain for a volume percent.
pub fn volume_gain(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}

/// CPAL-backed output at a fixed rate.
///
/// CPAL streams are not `Send` on every platform, so the stream lives on a
/// dedicated thread for the lifetime of this value.
pub struct CpalOutput {
    queue: Arc<SharedAudio>,
    volume: Arc<AtomicU8>,
    reset_volume: u8,
    sample_rate: u32,
    shutdown_tx: Sender<()>,
    device_name: String,
}

impl CpalOutput {
    /// Open `needle` (or the default device) at `sample_rate` stereo.
    ///
    /// `buffer_seconds` sizes the sample queue; `reset_volume` is the gain the
    /// device falls back to on [`OutputDevice::prepare`].
    pub fn open(
        needle: Option<&str>,
        sample_rate: u32,
        buffer_seconds: f32,
        reset_volume: u8,
    ) -> Result<Self> {
        let queue = Arc::new(SharedAudio::new(
            2,
            calc_max_buffered_samples(sample_rate, 2, buffer_seconds),
        ));
        let volume = Arc::new(AtomicU8::new(reset_volume.min(100)));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<String>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let needle = needle.map(str::to_string);
        let queue_thread = queue.clone();
        let volume_thread = volume.clone();
        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                stream_thread_main(
                    needle,
                    sample_rate,
                    queue_thread,
                    volume_thread,
                    ready_tx,
                    shutdown_rx,
                )
            })
            .context("spawn output thread")?;

        let device_name = ready_rx
            .recv()
            .map_err(|_| anyhow!("output thread exited during startup"))??;
        tracing::info!(device = %device_name, rate_hz = sample_rate, "output device ready");

        Ok(Self {
            queue,
            volume,
            reset_volume: reset_volume.min(100),
            sample_rate,
            shutdown_tx,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Wait for queued samples to reach the device. Returns `false` on timeout.
    pub fn drain(&self, timeout: Duration) -> bool {
        self.queue.wait_until_empty(timeout)
    }
}

impl OutputDevice for CpalOutput {
    fn prepare(&self, sample_rate: u32, channels: u16) -> Result<()> {
        if sample_rate != self.sample_rate || channels != 2 {
            return Err(anyhow!(
                "output runs at {} Hz stereo, got {sample_rate} Hz x{channels}",
                self.sample_rate
            ));
        }
        self.queue.clear();
        self.volume.store(self.reset_volume, Ordering::Relaxed);
        Ok(())
    }

    fn write(&self, samples: &[i16]) -> Result<()> {
        let converted: Vec<f32> = samples.iter().copied().map(i16_to_f32).collect();
        if self.queue.push_interleaved_blocking(&converted) {
            Ok(())
        } else {
            Err(anyhow!("output stream closed"))
        }
    }

    fn set_volume(&self, percent: u8) {
        self.volume.store(percent.min(100), Ordering::Relaxed);
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.queue.close();
        let _ = self.shutdown_tx.send(());
    }
}

fn stream_thread_main(
    needle: Option<String>,
    sample_rate: u32,
    queue: Arc<SharedAudio>,
    volume: Arc<AtomicU8>,
    ready_tx: Sender<Result<String>>,
    shutdown_rx: Receiver<()>,
) {
    let opened = (|| -> Result<(cpal::Stream, String)> {
        let host = cpal::default_host();
        let dev = device::pick_device(&host, needle.as_deref())?;
        let name = dev
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let config = device::pick_output_config(&dev, sample_rate)?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }
        let stream =
            build_output_stream(&dev, &stream_config, config.sample_format(), &queue, &volume)?;
        stream.play().context("start output stream")?;
        Ok((stream, name))
    })();

    match opened {
        Ok((stream, name)) => {
            let _ = ready_tx.send(Ok(name));
            let _ = shutdown_rx.recv();
            drop(stream);
            tracing::debug!("output stream closed");
        }
        Err(e) => {
            queue.close();
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SharedAudio>,
    volume: &Arc<AtomicU8>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, volume),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, volume),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, volume),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, volume),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Callback-local buffer of stereo samples fetched from the queue.
struct CallbackState {
    pos: usize,
    src: Vec<f32>,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SharedAudio>,
    volume: &Arc<AtomicU8>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let queue_cb = queue.clone();
    let volume_cb = volume.clone();
    let mut st = CallbackState {
        pos: 0,
        src: Vec::new(),
    };

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let gain = volume_gain(volume_cb.load(Ordering::Relaxed));
            for frame in data.chunks_mut(channels_out) {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src = queue_cb.pop_nonblocking(REFILL_MAX_FRAMES).unwrap_or_default();
                }
                let (l, r) = if st.pos + 1 < st.src.len() {
                    let lr = (st.src[st.pos], st.src[st.pos + 1]);
                    st.pos += 2;
                    lr
                } else {
                    // Underrun: silence.
                    (0.0, 0.0)
                };
                for (ch, out) in frame.iter_mut().enumerate() {
                    let v = match ch {
                        0 => l,
                        1 => r,
                        _ => 0.0,
                    };
                    *out = <T as cpal::Sample>::from_sample::<f32>(v * gain);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingOutput;

    #[test]
    fn sample_conversion_round_trips_extremes() {
        assert_eq!(f32_to_i16(i16_to_f32(0)), 0);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert!((i16_to_f32(i16::MIN) + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn volume_gain_clamps() {
        assert_eq!(volume_gain(0), 0.0);
        assert_eq!(volume_gain(100), 1.0);
        assert_eq!(volume_gain(250), 1.0);
    }

    #[test]
    fn sink_writes_while_holding_bus() {
        let bus = SharedBus::new();
        let out = Arc::new(RecordingOutput::watching(bus.clone()));
        let sink = OutputSink::new(out.clone(), bus.clone());

        sink.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(out.samples(), vec![1, 2, 3, 4]);
        assert_eq!(out.writes_under_bus(), 1);
    }
}
