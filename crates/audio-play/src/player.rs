//! Public player context.
//!
//! [`AudioPlayer`] owns everything the playback subsystem needs: the command
//! channel and its worker, the pipeline controller, the amplifier line, the
//! open-media slot and the output device. Queued entry points (`play`, `stop`,
//! `pause`, `resume`) return once the command is enqueued; `play_pcm` runs on
//! the caller's thread.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{SendError, SendTimeoutError, Sender, TrySendError};

use crate::amp::{AmpHold, Amplifier, EnableLine};
use crate::bus::SharedBus;
use crate::command::{Command, MediaUrl};
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::media::{MediaReader, MediaSlot};
use crate::output::{OutputDevice, OutputSink};
use crate::pipeline::{
    EngineEventHandler, EngineIo, MusicInfo, PipelineController, PipelineEngine, PlaybackState,
};
use crate::resample::PcmJob;
use crate::status::{PlayerStatus, StatusBoard};
use crate::worker::spawn_worker;

/// State shared by the caller-facing API, the worker and the event handler.
pub(crate) struct Shared {
    pub(crate) config: PlayerConfig,
    pub(crate) amp: Amplifier,
    pub(crate) bus: SharedBus,
    pub(crate) media: MediaSlot,
    pub(crate) output: Arc<dyn OutputDevice>,
    pub(crate) status: StatusBoard,
    pub(crate) initialized: AtomicBool,
    volume: AtomicU8,
    pipeline: Mutex<PipelineController>,
    session: Mutex<()>,
}

impl Shared {
    /// Playback-session lock. Taken before the pipeline lock.
    pub(crate) fn session(&self) -> MutexGuard<'_, ()> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn pipeline(&self) -> MutexGuard<'_, PipelineController> {
        self.pipeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Engine events as seen by the player.
///
/// Runs on the engine's thread, so it never touches the pipeline controller.
struct PlayerEvents {
    shared: Weak<Shared>,
}

impl EngineEventHandler for PlayerEvents {
    fn on_music_info(&self, info: MusicInfo) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        tracing::info!(
            rate_hz = info.sample_rate,
            channels = info.channels,
            bits = info.bits,
            bitrate = info.bitrate,
            "track format"
        );
        shared.status.music_info(info);
    }

    fn on_state_changed(&self, state: PlaybackState) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        tracing::info!(%state, "pipeline state");
        if matches!(state, PlaybackState::Finished | PlaybackState::Error) {
            shared.bus.with(|| shared.media.close());
            shared.amp.disable();
            shared.status.ended();
        }
    }
}

struct Dispatcher {
    cmd_tx: Sender<Command>,
    join: JoinHandle<()>,
}

/// Audio playback context.
pub struct AudioPlayer {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl AudioPlayer {
    pub fn new(
        config: PlayerConfig,
        engine: Box<dyn PipelineEngine>,
        output: Arc<dyn OutputDevice>,
        amp_line: Box<dyn EnableLine>,
        bus: SharedBus,
    ) -> Self {
        let volume = config.default_volume.min(100);
        Self {
            shared: Arc::new(Shared {
                config,
                amp: Amplifier::new(amp_line),
                bus,
                media: MediaSlot::new(),
                output,
                status: StatusBoard::default(),
                initialized: AtomicBool::new(false),
                volume: AtomicU8::new(volume),
                pipeline: Mutex::new(PipelineController::new(engine)),
                session: Mutex::new(()),
            }),
            dispatcher: Mutex::new(None),
        }
    }

    fn dispatcher(&self) -> MutexGuard<'_, Option<Dispatcher>> {
        self.dispatcher.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configure the amplifier line, open the engine and start the worker.
    ///
    /// Calling `init` on an initialized player does nothing. A worker that
    /// already tore itself down is reaped and the player starts over.
    pub fn init(&self) -> Result<()> {
        let mut dispatcher = self.dispatcher();
        let shared = &self.shared;
        if dispatcher.is_some() {
            if shared.initialized.load(Ordering::SeqCst) {
                return Ok(());
            }
            if let Some(stale) = dispatcher.take() {
                drop(stale.cmd_tx);
                if stale.join.join().is_err() {
                    tracing::error!("player worker panicked");
                }
            }
        }

        shared.amp.configure();

        let io = EngineIo {
            input: MediaReader::new(shared.media.clone(), shared.bus.clone()),
            output: OutputSink::new(shared.output.clone(), shared.bus.clone()),
        };
        let events = Arc::new(PlayerEvents {
            shared: Arc::downgrade(shared),
        });
        if let Err(e) = shared.pipeline().open(io, events) {
            shared.amp.release();
            return Err(PlayerError::Engine(format!("{e:#}")));
        }

        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(shared.config.queue_capacity.max(1));
        let join = match spawn_worker(shared.clone(), cmd_rx) {
            Ok(join) => join,
            Err(e) => {
                shared.pipeline().destroy();
                shared.amp.release();
                return Err(PlayerError::unavailable(format!("spawn worker: {e}")));
            }
        };

        shared.output.set_volume(self.get_volume());
        shared.initialized.store(true, Ordering::SeqCst);
        *dispatcher = Some(Dispatcher { cmd_tx, join });
        tracing::info!(
            queue = shared.config.queue_capacity,
            volume = self.get_volume(),
            "player initialized"
        );
        Ok(())
    }

    /// Tear the player down and wait for the worker to finish.
    ///
    /// A no-op before `init`.
    pub fn deinit(&self) -> Result<()> {
        let Some(Dispatcher { cmd_tx, join }) = self.dispatcher().take() else {
            return Ok(());
        };
        // A disconnected channel means the worker already tore down.
        let _ = cmd_tx.send(Command::Deinit);
        drop(cmd_tx);
        if join.join().is_err() {
            tracing::error!("player worker panicked");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    /// Queue playback of `url` (`file://<path>` or a bare path).
    pub fn play(&self, url: &str) -> Result<()> {
        let url = MediaUrl::new(url, self.shared.config.max_url_len)?;
        self.send(Command::Play(url))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    /// Enqueue `cmd` without waiting; a full queue yields [`PlayerError::QueueFull`].
    pub fn try_send(&self, cmd: Command) -> Result<()> {
        let Some(cmd_tx) = self.sender() else {
            return not_running(&cmd);
        };
        match cmd_tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PlayerError::QueueFull),
            Err(TrySendError::Disconnected(cmd)) => not_running(&cmd),
        }
    }

    fn sender(&self) -> Option<Sender<Command>> {
        self.dispatcher().as_ref().map(|d| d.cmd_tx.clone())
    }

    /// Enqueue `cmd`, blocking (up to `send_timeout` if configured) while the
    /// queue is full. The dispatcher lock is not held while waiting.
    fn send(&self, cmd: Command) -> Result<()> {
        let Some(cmd_tx) = self.sender() else {
            return not_running(&cmd);
        };
        tracing::debug!(cmd = cmd.name(), "enqueue");
        match self.shared.config.send_timeout {
            None => match cmd_tx.send(cmd) {
                Ok(()) => Ok(()),
                Err(SendError(cmd)) => not_running(&cmd),
            },
            Some(timeout) => match cmd_tx.send_timeout(cmd, timeout) {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => Err(PlayerError::QueueFull),
                Err(SendTimeoutError::Disconnected(cmd)) => not_running(&cmd),
            },
        }
    }

    /// Current pipeline state; `Error` when no engine is open.
    pub fn get_state(&self) -> PlaybackState {
        self.shared.pipeline().state()
    }

    /// Set the output volume (0..=100).
    pub fn set_volume(&self, volume: u8) -> Result<()> {
        if volume > 100 {
            return Err(PlayerError::invalid(format!("volume {volume} out of range 0..=100")));
        }
        self.shared.volume.store(volume, Ordering::SeqCst);
        self.shared.output.set_volume(volume);
        tracing::debug!(volume, "volume set");
        Ok(())
    }

    pub fn get_volume(&self) -> u8 {
        self.shared.volume.load(Ordering::SeqCst)
    }

    /// Play an in-memory 16-bit clip synchronously.
    ///
    /// The clip is converted to stereo at the output rate and written in
    /// chunks, followed by silence to flush the device. A running track is
    /// paused for the duration and resumed afterwards. `looping` is accepted
    /// for API compatibility; the clip always plays once.
    pub fn play_pcm(
        &self,
        samples: &[i16],
        source_rate: u32,
        channels: u8,
        looping: bool,
    ) -> Result<()> {
        let shared = &self.shared;
        let job = PcmJob::new(samples, source_rate, channels, shared.config.target_rate)?;
        if !self.is_initialized() {
            return Err(PlayerError::unavailable("player not initialized"));
        }
        if looping {
            tracing::debug!("pcm looping requested; playing once");
        }

        let _session = shared.session();
        // A deinit may have completed while this call waited for the session.
        if !shared.initialized.load(Ordering::SeqCst) {
            return Err(PlayerError::unavailable("player not initialized"));
        }
        let interrupted = {
            let mut pipeline = shared.pipeline();
            let running = pipeline.state() == PlaybackState::Running;
            if running {
                pipeline.pause();
            }
            running
        };

        let played = self.emit_pcm(&job);

        if interrupted {
            let mut pipeline = shared.pipeline();
            pipeline.resume();
            if pipeline.state() == PlaybackState::Running {
                shared.amp.enable();
            }
        }
        played
    }

    fn emit_pcm(&self, job: &PcmJob<'_>) -> Result<()> {
        let shared = &self.shared;
        let _amp = AmpHold::engage(&shared.amp);

        if !shared.config.startup_delay.is_zero() {
            std::thread::sleep(shared.config.startup_delay);
        }
        shared
            .output
            .prepare(shared.config.target_rate, 2)
            .map_err(|e| PlayerError::Output(format!("{e:#}")))?;
        shared.output.set_volume(self.get_volume());

        let chunk_frames = shared.config.pcm_chunk_frames.max(1);
        let mut chunk: Vec<i16> = Vec::new();
        chunk
            .try_reserve_exact(chunk_frames * 2)
            .map_err(|e| PlayerError::unavailable(format!("pcm chunk buffer: {e}")))?;

        let sink = OutputSink::new(shared.output.clone(), shared.bus.clone());
        let total = job.output_frames();
        let mut pos = 0;
        while pos < total {
            let n = job.render_into(pos, &mut chunk, chunk_frames);
            sink.write(&chunk)
                .map_err(|e| PlayerError::Output(format!("{e:#}")))?;
            pos += n;
        }

        chunk.clear();
        chunk.resize(chunk_frames * 2, 0);
        for _ in 0..shared.config.flush_chunks {
            sink.write(&chunk)
                .map_err(|e| PlayerError::Output(format!("{e:#}")))?;
        }

        tracing::debug!(
            frames = total,
            source_rate = job.source_rate(),
            channels = job.channels(),
            "pcm clip played"
        );
        Ok(())
    }

    pub fn status(&self) -> PlayerStatus {
        let shared = &self.shared;
        PlayerStatus {
            state: self.get_state(),
            volume: self.get_volume(),
            amp_enabled: shared.amp.is_enabled(),
            initialized: self.is_initialized(),
            now_playing: shared.status.now_playing(),
            music_info: shared.status.last_music_info(),
        }
    }

    /// Bus handle for display code sharing the storage bus.
    pub fn bus(&self) -> SharedBus {
        self.shared.bus.clone()
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        let _ = self.deinit();
    }
}

/// Result of sending to a player that is not running.
fn not_running(cmd: &Command) -> Result<()> {
    match cmd {
        Command::Play(_) => Err(PlayerError::unavailable("player not initialized")),
        _ => Ok(()),
    }
}
