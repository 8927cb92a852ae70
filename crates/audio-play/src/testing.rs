//! Recording doubles for unit tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use symphonia::core::io::MediaSource;

use crate::amp::EnableLine;
use crate::bus::SharedBus;
use crate::output::OutputDevice;
use crate::pipeline::{
    EngineEvent, EngineEventHandler, EngineIo, PipelineEngine, PlaybackState, dispatch,
};

static TEMP_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Write `bytes` to a fresh temp directory and return the file path.
pub(crate) fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "audio-play-test-{}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos(),
        TEMP_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&root).unwrap();
    let path = root.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Minimal 16-bit PCM WAV file.
pub(crate) fn wav_bytes(samples: &[i16], rate: u32, channels: u16) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Poll `cond` for up to five seconds.
pub(crate) fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Enable line that records every level written.
#[derive(Default)]
pub(crate) struct RecordingLine {
    levels: Arc<Mutex<Vec<bool>>>,
    released: Arc<AtomicBool>,
}

impl RecordingLine {
    pub(crate) fn levels(&self) -> Arc<Mutex<Vec<bool>>> {
        self.levels.clone()
    }

    pub(crate) fn released(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl EnableLine for RecordingLine {
    fn configure(&mut self) -> std::io::Result<()> {
        self.released.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_level(&mut self, high: bool) -> std::io::Result<()> {
        self.levels.lock().unwrap().push(high);
        Ok(())
    }

    fn release(&mut self) -> std::io::Result<()> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Output device that keeps everything written to it.
#[derive(Default)]
pub(crate) struct RecordingOutput {
    bus: Option<SharedBus>,
    samples: Mutex<Vec<i16>>,
    writes_under_bus: AtomicUsize,
    prepares: Mutex<Vec<(u32, u16)>>,
    volumes: Mutex<Vec<u8>>,
    write_delay: Mutex<Duration>,
    fail_writes: AtomicBool,
}

impl RecordingOutput {
    /// Also count how many writes happened with `bus` held.
    pub(crate) fn watching(bus: SharedBus) -> Self {
        Self {
            bus: Some(bus),
            ..Self::default()
        }
    }

    pub(crate) fn samples(&self) -> Vec<i16> {
        self.samples.lock().unwrap().clone()
    }

    pub(crate) fn writes_under_bus(&self) -> usize {
        self.writes_under_bus.load(Ordering::SeqCst)
    }

    pub(crate) fn prepares(&self) -> Vec<(u32, u16)> {
        self.prepares.lock().unwrap().clone()
    }

    pub(crate) fn volumes(&self) -> Vec<u8> {
        self.volumes.lock().unwrap().clone()
    }

    pub(crate) fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl OutputDevice for RecordingOutput {
    fn prepare(&self, sample_rate: u32, channels: u16) -> Result<()> {
        self.prepares.lock().unwrap().push((sample_rate, channels));
        Ok(())
    }

    fn write(&self, samples: &[i16]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("device unplugged"));
        }
        if self.bus.as_ref().is_some_and(SharedBus::is_held) {
            self.writes_under_bus.fetch_add(1, Ordering::SeqCst);
        }
        let delay = *self.write_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.samples.lock().unwrap().extend_from_slice(samples);
        Ok(())
    }

    fn set_volume(&self, percent: u8) {
        self.volumes.lock().unwrap().push(percent);
    }
}

/// Engine that records calls and follows the usual state transitions.
///
/// Clones share state, so a test can keep one to drive events.
#[derive(Clone, Default)]
pub(crate) struct MockEngine {
    calls: Arc<Mutex<Vec<String>>>,
    state: Arc<Mutex<Option<PlaybackState>>>,
    io: Arc<Mutex<Option<EngineIo>>>,
    events: Arc<Mutex<Option<Arc<dyn EngineEventHandler>>>>,
    fail_run: Arc<AtomicBool>,
    fail_open: Arc<AtomicBool>,
}

impl MockEngine {
    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }

    pub(crate) fn fail_run(&self, fail: bool) {
        self.fail_run.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Size of the file the input reader currently sees.
    pub(crate) fn input_len(&self) -> Option<u64> {
        self.io.lock().unwrap().as_ref().and_then(|io| io.input.byte_len())
    }

    /// Report `state` the way a decode thread would.
    pub(crate) fn emit_state(&self, state: PlaybackState) {
        let events = self.events.lock().unwrap().clone();
        if let Some(events) = events {
            dispatch(events.as_ref(), EngineEvent::StateChanged(state));
        }
        *self.state.lock().unwrap() = Some(state);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PipelineEngine for MockEngine {
    fn open(&mut self, io: EngineIo, events: Arc<dyn EngineEventHandler>) -> Result<()> {
        self.record("open".to_string());
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(anyhow!("codec did not answer"));
        }
        *self.io.lock().unwrap() = Some(io);
        *self.events.lock().unwrap() = Some(events);
        *self.state.lock().unwrap() = Some(PlaybackState::Stopped);
        Ok(())
    }

    fn run(&mut self, url: &str) -> Result<()> {
        if self.fail_run.load(Ordering::SeqCst) {
            self.record(format!("run {url}"));
            return Err(anyhow!("no decoder for {url}"));
        }
        // State first, so a test that saw the call also sees the state.
        *self.state.lock().unwrap() = Some(PlaybackState::Running);
        self.record(format!("run {url}"));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        *self.state.lock().unwrap() = Some(PlaybackState::Stopped);
        self.record("stop".to_string());
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        *self.state.lock().unwrap() = Some(PlaybackState::Paused);
        self.record("pause".to_string());
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        *self.state.lock().unwrap() = Some(PlaybackState::Running);
        self.record("resume".to_string());
        Ok(())
    }

    fn state(&self) -> PlaybackState {
        self.state.lock().unwrap().unwrap_or(PlaybackState::Error)
    }

    fn destroy(&mut self) {
        self.record("destroy".to_string());
        *self.io.lock().unwrap() = None;
        *self.events.lock().unwrap() = None;
        *self.state.lock().unwrap() = None;
    }
}
