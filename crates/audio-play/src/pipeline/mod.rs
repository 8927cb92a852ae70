//! Decode/output pipeline: the engine seam and its controller.
//!
//! The engine is opaque to the rest of the player. It receives an input
//! reader (the open media file) and an output sink at `open`, decodes on its
//! own thread after `run`, and reports progress through
//! [`EngineEventHandler`]. [`PipelineController`] wraps an engine and applies
//! the state guards the worker relies on (stop only when active, and so on).

mod convert;
mod decode;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::media::MediaReader;
use crate::output::OutputSink;

pub use decode::DecodeEngine;

/// Lifecycle state of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Running,
    Paused,
    Finished,
    Error,
}

impl PlaybackState {
    /// Running or paused: a stop is needed before the engine is idle.
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackState::Running | PlaybackState::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Running => "running",
            PlaybackState::Paused => "paused",
            PlaybackState::Finished => "finished",
            PlaybackState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Stream format reported by the decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MusicInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
    pub bitrate: u32,
}

/// Events an engine reports while running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    MusicInfo(MusicInfo),
    StateChanged(PlaybackState),
}

/// Receiver for engine events. Called from the engine's own thread.
pub trait EngineEventHandler: Send + Sync {
    fn on_music_info(&self, _info: MusicInfo) {}
    fn on_state_changed(&self, _state: PlaybackState) {}
}

/// Route `event` to the matching handler method.
pub fn dispatch(handler: &dyn EngineEventHandler, event: EngineEvent) {
    match event {
        EngineEvent::MusicInfo(info) => handler.on_music_info(info),
        EngineEvent::StateChanged(state) => handler.on_state_changed(state),
    }
}

/// I/O endpoints handed to an engine at open.
#[derive(Clone)]
pub struct EngineIo {
    pub input: MediaReader,
    pub output: OutputSink,
}

/// A decode/output engine.
pub trait PipelineEngine: Send {
    /// Bind I/O and the event handler. Called once per init.
    fn open(&mut self, io: EngineIo, events: Arc<dyn EngineEventHandler>) -> Result<()>;
    /// Start decoding the already-open input; `url` selects the decoder.
    fn run(&mut self, url: &str) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn state(&self) -> PlaybackState;
    /// Release everything acquired at open. Idempotent.
    fn destroy(&mut self);
}

/// Guarded wrapper around a [`PipelineEngine`].
pub struct PipelineController {
    engine: Box<dyn PipelineEngine>,
    open: bool,
}

impl PipelineController {
    pub fn new(engine: Box<dyn PipelineEngine>) -> Self {
        Self { engine, open: false }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self, io: EngineIo, events: Arc<dyn EngineEventHandler>) -> Result<()> {
        if self.open {
            return Ok(());
        }
        self.engine.open(io, events)?;
        self.open = true;
        Ok(())
    }

    pub fn run(&mut self, url: &str) -> Result<()> {
        if !self.open {
            anyhow::bail!("pipeline not open");
        }
        self.engine.run(url)
    }

    /// Stop a running or paused pipeline; otherwise nothing happens.
    pub fn stop(&mut self) {
        if !self.open || !self.engine.state().is_active() {
            return;
        }
        if let Err(e) = self.engine.stop() {
            tracing::warn!("pipeline stop failed: {e:#}");
        }
    }

    pub fn pause(&mut self) {
        if !self.open || self.engine.state() != PlaybackState::Running {
            return;
        }
        if let Err(e) = self.engine.pause() {
            tracing::warn!("pipeline pause failed: {e:#}");
        }
    }

    pub fn resume(&mut self) {
        if !self.open || self.engine.state() != PlaybackState::Paused {
            return;
        }
        if let Err(e) = self.engine.resume() {
            tracing::warn!("pipeline resume failed: {e:#}");
        }
    }

    /// Current state; `Error` when no engine is open.
    pub fn state(&self) -> PlaybackState {
        if !self.open {
            return PlaybackState::Error;
        }
        self.engine.state()
    }

    pub fn destroy(&mut self) {
        if !self.open {
            return;
        }
        self.stop();
        self.engine.destroy();
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SharedBus;
    use crate::media::MediaSlot;
    use crate::testing::{MockEngine, RecordingOutput};
    use std::sync::Mutex;

    fn io() -> EngineIo {
        let bus = SharedBus::new();
        EngineIo {
            input: MediaReader::new(MediaSlot::new(), bus.clone()),
            output: OutputSink::new(Arc::new(RecordingOutput::default()), bus),
        }
    }

    struct Noop;
    impl EngineEventHandler for Noop {}

    #[derive(Default)]
    struct Collect(Mutex<Vec<EngineEvent>>);
    impl EngineEventHandler for Collect {
        fn on_music_info(&self, info: MusicInfo) {
            self.0.lock().unwrap().push(EngineEvent::MusicInfo(info));
        }
        fn on_state_changed(&self, state: PlaybackState) {
            self.0.lock().unwrap().push(EngineEvent::StateChanged(state));
        }
    }

    #[test]
    fn unopened_controller_ignores_control_calls() {
        let engine = MockEngine::default();
        let calls = engine.calls();
        let mut ctl = PipelineController::new(Box::new(engine));

        ctl.stop();
        ctl.pause();
        ctl.resume();
        ctl.destroy();
        assert!(ctl.run("file:///a.mp3").is_err());
        assert_eq!(ctl.state(), PlaybackState::Error);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn stop_is_forwarded_only_when_active() {
        let engine = MockEngine::default();
        let calls = engine.calls();
        let mut ctl = PipelineController::new(Box::new(engine));
        ctl.open(io(), Arc::new(Noop)).unwrap();

        ctl.stop();
        ctl.resume();
        ctl.run("file:///a.mp3").unwrap();
        ctl.resume();
        ctl.pause();
        ctl.pause();
        ctl.resume();
        ctl.stop();
        ctl.stop();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["open", "run file:///a.mp3", "pause", "resume", "stop"]
        );
        assert_eq!(ctl.state(), PlaybackState::Stopped);
    }

    #[test]
    fn destroy_is_idempotent_and_stops_first() {
        let engine = MockEngine::default();
        let calls = engine.calls();
        let mut ctl = PipelineController::new(Box::new(engine));
        ctl.open(io(), Arc::new(Noop)).unwrap();
        ctl.run("file:///a.mp3").unwrap();

        ctl.destroy();
        ctl.destroy();
        assert!(!ctl.is_open());
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["open", "run file:///a.mp3", "stop", "destroy"]
        );
    }

    #[test]
    fn dispatch_routes_by_variant() {
        let handler = Collect::default();
        let info = MusicInfo {
            sample_rate: 44_100,
            channels: 2,
            bits: 16,
            bitrate: 128_000,
        };
        dispatch(&handler, EngineEvent::MusicInfo(info));
        dispatch(&handler, EngineEvent::StateChanged(PlaybackState::Finished));
        assert_eq!(
            *handler.0.lock().unwrap(),
            vec![
                EngineEvent::MusicInfo(info),
                EngineEvent::StateChanged(PlaybackState::Finished)
            ]
        );
    }

    #[test]
    fn state_display_is_lowercase() {
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
        assert!(PlaybackState::Running.is_active());
        assert!(!PlaybackState::Finished.is_active());
    }
}
