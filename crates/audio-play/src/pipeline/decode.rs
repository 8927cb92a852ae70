//! Symphonia-based pipeline engine.
//!
//! `run` spawns a decode thread that:
//! 1. probes the open media (decoder chosen by the url's file extension)
//! 2. decodes packets into interleaved `f32`
//! 3. maps channels to stereo and converts to the output rate when needed
//! 4. writes 16-bit chunks to the output sink
//!
//! Pause parks the thread on a condition variable between chunks; stop sets a
//! cancel flag, wakes it and joins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::convert::RateConverter;
use super::{
    EngineEvent, EngineEventHandler, EngineIo, MusicInfo, PipelineEngine, PlaybackState, dispatch,
};
use crate::media::url_extension;
use crate::output::f32_to_i16;

const OUTPUT_CHANNELS: usize = 2;

struct Control {
    state: Mutex<PlaybackState>,
    cv: Condvar,
    cancel: AtomicBool,
}

impl Control {
    fn state(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block while paused. Returns `false` once cancelled.
    fn wait_if_paused(&self) -> bool {
        let mut st = self.state();
        while *st == PlaybackState::Paused && !self.cancel.load(Ordering::SeqCst) {
            st = self.cv.wait(st).unwrap_or_else(|e| e.into_inner());
        }
        !self.cancel.load(Ordering::SeqCst)
    }
}

/// Engine decoding with Symphonia and converting with Rubato.
pub struct DecodeEngine {
    target_rate: u32,
    chunk_frames: usize,
    io: Option<EngineIo>,
    events: Option<Arc<dyn EngineEventHandler>>,
    control: Arc<Control>,
    join: Option<JoinHandle<()>>,
}

impl DecodeEngine {
    pub fn new(target_rate: u32, chunk_frames: usize) -> Self {
        Self {
            target_rate,
            chunk_frames: chunk_frames.max(1),
            io: None,
            events: None,
            control: Arc::new(Control {
                state: Mutex::new(PlaybackState::Stopped),
                cv: Condvar::new(),
                cancel: AtomicBool::new(false),
            }),
            join: None,
        }
    }

    fn set_state(&self, state: PlaybackState) {
        *self.control.state() = state;
        self.control.cv.notify_all();
        if let Some(events) = &self.events {
            dispatch(events.as_ref(), EngineEvent::StateChanged(state));
        }
    }

    fn join_decoder(&mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("decode thread panicked");
            }
        }
    }
}

impl PipelineEngine for DecodeEngine {
    fn open(&mut self, io: EngineIo, events: Arc<dyn EngineEventHandler>) -> Result<()> {
        self.io = Some(io);
        self.events = Some(events);
        *self.control.state() = PlaybackState::Stopped;
        Ok(())
    }

    fn run(&mut self, url: &str) -> Result<()> {
        let io = self.io.clone().ok_or_else(|| anyhow!("engine not open"))?;
        let events = self.events.clone().ok_or_else(|| anyhow!("engine not open"))?;

        if self.state().is_active() {
            self.stop()?;
        }
        // A finished or failed session still owns a (returned) thread handle.
        self.join_decoder();

        let mut hint = Hint::new();
        if let Some(ext) = url_extension(url) {
            hint.with_extension(&ext);
        }

        self.control.cancel.store(false, Ordering::SeqCst);
        self.set_state(PlaybackState::Running);

        let session = DecodeSession {
            io,
            events,
            control: self.control.clone(),
            target_rate: self.target_rate,
            chunk_frames: self.chunk_frames,
        };
        let join = thread::Builder::new()
            .name("audio-decode".to_string())
            .spawn(move || session.run(hint))
            .context("spawn decode thread")?;
        self.join = Some(join);
        tracing::info!(url, "pipeline running");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.control.cancel.store(true, Ordering::SeqCst);
        self.control.cv.notify_all();
        self.join_decoder();
        self.set_state(PlaybackState::Stopped);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if self.state() != PlaybackState::Running {
            return Ok(());
        }
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.state() != PlaybackState::Paused {
            return Ok(());
        }
        self.set_state(PlaybackState::Running);
        Ok(())
    }

    fn state(&self) -> PlaybackState {
        *self.control.state()
    }

    fn destroy(&mut self) {
        if self.state().is_active() {
            let _ = self.stop();
        }
        self.join_decoder();
        self.io = None;
        self.events = None;
    }
}

impl Drop for DecodeEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Everything the decode thread needs for one `run`.
struct DecodeSession {
    io: EngineIo,
    events: Arc<dyn EngineEventHandler>,
    control: Arc<Control>,
    target_rate: u32,
    chunk_frames: usize,
}

impl DecodeSession {
    fn run(self, hint: Hint) {
        let end = match self.decode(hint) {
            Ok(true) => Some(PlaybackState::Finished),
            Ok(false) => None,
            Err(e) => {
                tracing::error!("decode thread error: {e:#}");
                Some(PlaybackState::Error)
            }
        };
        // A cancelled session leaves the state to `stop`. The event goes out
        // before the state flips so no one sees the session idle while its
        // handler is still running.
        if let Some(state) = end {
            if self.control.cancel.load(Ordering::SeqCst) {
                return;
            }
            dispatch(self.events.as_ref(), EngineEvent::StateChanged(state));
            *self.control.state() = state;
            self.control.cv.notify_all();
        }
    }

    /// Decode to the end. Returns `Ok(false)` if cancelled.
    fn decode(&self, hint: Hint) -> Result<bool> {
        let mss = MediaSourceStream::new(Box::new(self.io.input.clone()), Default::default());
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("probe media")?;
        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("No default audio track"))?;
        let track_id = track.id;
        let codec_params: CodecParameters = track.codec_params.clone();
        let rate = codec_params
            .sample_rate
            .ok_or_else(|| anyhow!("Unknown sample rate"))?;
        let channels = codec_params
            .channels
            .ok_or_else(|| anyhow!("Unknown channels"))?
            .count();

        let info = music_info_from_params(&codec_params);
        tracing::info!(
            rate_hz = info.sample_rate,
            channels = info.channels,
            bits = info.bits,
            "music info"
        );
        dispatch(self.events.as_ref(), EngineEvent::MusicInfo(info));

        let mut converter = if rate != self.target_rate {
            tracing::debug!(from_hz = rate, to_hz = self.target_rate, "resampling");
            Some(RateConverter::new(rate, self.target_rate, OUTPUT_CHANNELS, self.chunk_frames)?)
        } else {
            None
        };

        let finished = self.decode_packets(
            format.as_mut(),
            &codec_params,
            track_id,
            channels,
            &mut converter,
        )?;
        if !finished {
            return Ok(false);
        }
        if let Some(conv) = converter.as_mut() {
            let tail = conv.flush()?;
            if !self.emit(&tail)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn decode_packets(
        &self,
        format: &mut dyn FormatReader,
        codec_params: &CodecParameters,
        track_id: u32,
        channels: usize,
        converter: &mut Option<RateConverter>,
    ) -> Result<bool> {
        let mut decoder = symphonia::default::get_codecs()
            .make(codec_params, &DecoderOptions::default())
            .context("create decoder")?;

        loop {
            if !self.control.wait_if_paused() {
                return Ok(false);
            }

            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(_) => break, // EOF, or the media was closed under us
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!("skipping undecodable packet: {e}");
                    continue;
                }
            };

            let mut sample_buf =
                SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            sample_buf.copy_interleaved_ref(decoded);
            let stereo = to_stereo(sample_buf.samples(), channels);

            let ready = match converter.as_mut() {
                Some(conv) => conv.push(&stereo)?,
                None => stereo,
            };
            if !self.emit(&ready)? {
                return Ok(false);
            }
        }

        Ok(!self.control.cancel.load(Ordering::SeqCst))
    }

    /// Write `samples` to the sink in chunk-sized pieces.
    ///
    /// Returns `Ok(false)` if cancelled between chunks.
    fn emit(&self, samples: &[f32]) -> Result<bool> {
        let chunk = self.chunk_frames * OUTPUT_CHANNELS;
        let mut pcm: Vec<i16> = Vec::with_capacity(chunk);
        for block in samples.chunks(chunk) {
            if !self.control.wait_if_paused() {
                return Ok(false);
            }
            pcm.clear();
            pcm.extend(block.iter().copied().map(f32_to_i16));
            self.io.output.write(&pcm).context("output write")?;
        }
        Ok(true)
    }
}

/// Map interleaved `channels`-wide samples to interleaved stereo.
///
/// Mono is duplicated; layouts wider than stereo keep the front pair.
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        2 => samples.to_vec(),
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

fn music_info_from_params(params: &CodecParameters) -> MusicInfo {
    let sample_rate = params.sample_rate.unwrap_or(0);
    let channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let bits = params
        .bits_per_sample
        .or(params.bits_per_coded_sample)
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(0);
    // Uncompressed estimate; compressed streams report 0 when depth is unknown.
    let bitrate = sample_rate
        .saturating_mul(u32::from(channels))
        .saturating_mul(u32::from(bits));
    MusicInfo {
        sample_rate,
        channels,
        bits,
        bitrate,
    }
}
